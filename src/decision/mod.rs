pub mod openai;
pub mod prompts;
pub mod types;

pub use types::{AiConfig, Decision, DecisionEngine, DecisionOption};
