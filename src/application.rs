//! Use-case layer: batch orchestration, search expansion, and the result
//! shapes handed to callers.

pub mod dto;
pub mod orchestrator;
pub mod search;

pub use dto::{BatchReport, HistoryReport, ItemResult};
pub use orchestrator::Orchestrator;
