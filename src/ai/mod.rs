//! Computer-controlled players driven through the same command layer as humans.

pub mod agent;

pub use agent::{legal_commands, next_actor, AiAgent, AiConfig, AiDecision, AiDifficulty, AiStrategy, Strategy};
