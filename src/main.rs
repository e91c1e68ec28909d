//! seeclaw-replay CLI entry point.

mod args;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use seeclaw_replay::config::{load_config, load_config_from, AppConfig};
use seeclaw_replay::decision::openai::OpenAiDecisionEngine;
use seeclaw_replay::executor::EnigoDriver;
use seeclaw_replay::perception::llm_ocr::LlmVisionOcr;
use seeclaw_replay::perception::screenshot::XcapCapture;
use seeclaw_replay::{PlaybackStatus, Player, Recording, ReplayResult};

use crate::args::{Cli, Commands, PlayArgs, ValidateArgs};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    seeclaw_replay::init_tracing(if cli.verbose { "debug" } else { "info" });

    let outcome = match cli.command {
        Commands::Play(args) => play(args).await,
        Commands::Validate(args) => validate(args),
    };
    match outcome {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "seeclaw-replay failed");
            ExitCode::FAILURE
        }
    }
}

fn resolve_config(args: &PlayArgs) -> ReplayResult<AppConfig> {
    match &args.config {
        Some(path) => load_config_from(path),
        None => match load_config() {
            Ok(cfg) => Ok(cfg),
            Err(e) => {
                tracing::warn!(error = %e, "no usable config; using defaults");
                Ok(AppConfig::default())
            }
        },
    }
}

async fn play(args: PlayArgs) -> ReplayResult<ExitCode> {
    let config = resolve_config(&args)?;
    let recording = Recording::from_json_file(&args.recording)?;

    let driver = Arc::new(EnigoDriver::new(&config.player));
    let mut capture = XcapCapture::new();
    if let Some(window) = args.window {
        capture = capture.with_default_window(window);
    }

    let mut player = Player::new(config.player.clone(), driver).with_capture(Arc::new(capture));
    if let Some(window) = args.window {
        player = player.with_window(window);
    }
    match &config.ocr {
        Some(ocr) => player = player.with_ocr(Arc::new(LlmVisionOcr::from_config(ocr)?)),
        None => tracing::warn!("no [ocr] section configured; text location and text waits are off"),
    }
    if let Some(decision) = &config.decision {
        let engine = OpenAiDecisionEngine::from_config(decision)?;
        player = player.with_decision_engine(Arc::new(engine));
    }

    player.on_step(|_, result| match serde_json::to_string(result) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "failed to serialise step result"),
    });

    player.load(recording)?;
    player.play(args.start).await?;

    tokio::select! {
        _ = player.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupt received, stopping after the current step");
            player.stop();
        }
    }
    let state = player.join().await;

    tracing::info!(
        status = %state.status,
        executed = state.logs.len(),
        total = state.total_steps,
        elapsed_ms = state.elapsed_ms,
        error = ?state.error,
        "playback finished"
    );
    Ok(match state.status {
        PlaybackStatus::Completed => ExitCode::SUCCESS,
        PlaybackStatus::Stopped => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    })
}

fn validate(args: ValidateArgs) -> ReplayResult<ExitCode> {
    let recording = Recording::from_json_file(&args.recording)?;
    let problems = recording.validate();
    let clean = problems.is_empty();
    let report = serde_json::json!({
        "recording": recording.id,
        "steps": recording.steps.len(),
        "problems": problems,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
