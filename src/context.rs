//! Execution context — explicit dependency injection
//!
//! One `ExecutionContext` value is constructed by the embedding application
//! and passed into every [`crate::Suite`]. Nothing in the engine reads
//! process-wide mutable state.

use std::sync::Arc;
use std::time::Duration;

use crate::adapter::AdapterRegistry;

/// Shared configuration and collaborators for suites built from it
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    registry: Arc<AdapterRegistry>,
    /// Environment label surfaced to reporters ("staging", "prod", ...)
    pub environment: Option<String>,
    /// Default concurrency limit for new suites; `None` = unbounded
    pub default_concurrency_limit: Option<usize>,
    /// Default per-scenario watchdog for new suites
    pub default_scenario_timeout: Option<Duration>,
    /// Default suite-wide watchdog for new suites
    pub default_suite_timeout: Option<Duration>,
}

impl ExecutionContext {
    /// Context with the built-in adapter registry and no limits
    pub fn new() -> Self {
        Self::with_registry(AdapterRegistry::default())
    }

    /// Context around a caller-assembled registry
    pub fn with_registry(registry: AdapterRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            environment: None,
            default_concurrency_limit: None,
            default_scenario_timeout: None,
            default_suite_timeout: None,
        }
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.default_concurrency_limit = if limit == 0 { None } else { Some(limit) };
        self
    }

    pub fn scenario_timeout(mut self, timeout: Duration) -> Self {
        self.default_scenario_timeout = Some(timeout);
        self
    }

    pub fn suite_timeout(mut self, timeout: Duration) -> Self {
        self.default_suite_timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_concurrency_means_unbounded() {
        let ctx = ExecutionContext::new().concurrency_limit(0);
        assert_eq!(ctx.default_concurrency_limit, None);
        let ctx = ctx.concurrency_limit(4);
        assert_eq!(ctx.default_concurrency_limit, Some(4));
    }
}
