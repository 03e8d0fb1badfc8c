//! Shared types and utilities used across all sarah crates.

pub mod panic;
pub mod retry;
pub mod types;

pub use types::BotType;
