pub mod config;
pub mod decision;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod locator;
pub mod perception;
pub mod playback;

#[cfg(test)]
mod test_support;

pub use config::{AppConfig, DecisionConfig, OcrConfig, PlayerConfig};
pub use errors::{ReplayError, ReplayResult};
pub use locator::{Locator, LocatorResult};
pub use playback::{Player, PlaybackState, PlaybackStatus, Recording, Step, StepResult};

/// Install the global `tracing` subscriber. `RUST_LOG` wins; otherwise
/// `default_directive` (e.g. "info") applies. Safe to call more than once.
pub fn init_tracing(default_directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
