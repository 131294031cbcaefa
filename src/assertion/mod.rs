//! Assertion results, the scenario log, and the per-step context

mod context;
mod result;

pub use context::{Assertion, AssertionContext, ResponseDocument};
pub use result::{AssertionResult, LogEntry, ScenarioLog};
