pub mod control;
pub mod dispatch;
pub mod event_bus;
pub mod player;
pub mod state;
pub mod types;

pub use event_bus::PlayerEvent;
pub use player::Player;
pub use state::{PlaybackState, PlaybackStatus};
pub use types::{
    ConditionKind, Recording, Step, StepAction, StepMode, StepResult, StepStatus, WaitCondition,
    WaitSpec,
};
