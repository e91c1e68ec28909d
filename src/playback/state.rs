use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::playback::types::StepResult;

/// Lifecycle of a playback run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Playing,
    Paused,
    Stopped,
    Completed,
    Error,
}

impl PlaybackStatus {
    /// A worker exists for the run (it may be parked in the pause spin).
    pub fn is_active(self) -> bool {
        matches!(self, PlaybackStatus::Playing | PlaybackStatus::Paused)
    }

    /// Edges of the run state machine.
    pub fn can_transition_to(self, next: PlaybackStatus) -> bool {
        use PlaybackStatus::*;
        match (self, next) {
            (Idle | Stopped | Completed | Error, Playing) => true,
            (Playing, Paused | Stopped | Completed | Error) => true,
            // The step in flight when a pause lands may still end the run.
            (Paused, Playing | Stopped | Completed | Error) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Stopped => "stopped",
            PlaybackStatus::Completed => "completed",
            PlaybackStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Snapshot of a Player's run, owned by the Player and handed out by value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub recording_id: Option<String>,
    pub current_step_index: usize,
    pub total_steps: usize,
    pub elapsed_ms: u64,
    /// Append-only, in step order.
    pub logs: Vec<StepResult>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl PlaybackState {
    /// Prepare for a run beginning at `start_index`. Log entries for steps
    /// before the start index survive so a resumed run keeps its history.
    pub fn begin_run(&mut self, start_index: usize) {
        if start_index == 0 {
            self.logs.clear();
        } else {
            self.logs.retain(|r| r.step_index < start_index);
        }
        self.status = PlaybackStatus::Playing;
        self.current_step_index = start_index;
        self.elapsed_ms = 0;
        self.error = None;
        self.started_at = Some(Utc::now());
    }

    /// Forget the previous run entirely; used when a new sequence is loaded.
    pub fn reset(&mut self, recording_id: Option<String>, total_steps: usize) {
        *self = PlaybackState {
            recording_id,
            total_steps,
            ..PlaybackState::default()
        };
    }

    pub fn touch_elapsed(&mut self) {
        if let Some(started) = self.started_at {
            self.elapsed_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;
        }
    }
}
