//! Common utilities shared across the engine

pub mod error;
pub mod logging;

pub use error::{Error, Result};
