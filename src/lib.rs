//! flightcheck - declarative scenario/suite test automation engine
//!
//! Callers define scenarios (one target plus an ordered pipeline of
//! assertion callbacks) grouped into suites; the engine fetches each target
//! through an injected adapter, runs the pipeline strictly sequentially, and
//! aggregates pass/fail outcomes with concurrency gating and watchdog
//! timeouts.
//!
//! ```no_run
//! use flightcheck::{ExecutionContext, ResponseType, Suite};
//!
//! # async fn demo() -> flightcheck::Result<()> {
//! let suite = Suite::new("API smoke", ExecutionContext::new());
//! suite.set_base_url("https://example.com")?;
//!
//! let scenario = suite.scenario("homepage payload", ResponseType::Json)?;
//! scenario.open("/api/status")?;
//! scenario.next("status is healthy", |ctx| async move {
//!     ctx.assert("responds with 200").equals(ctx.status(), 200);
//!     Ok(None)
//! })?;
//!
//! let result = suite.run().await?;
//! assert!(result.passed);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod assertion;
pub mod common;
pub mod context;
pub mod events;
pub mod scenario;
pub mod suite;

pub use adapter::{
    AdapterRegistry, FetchAdapter, FetchRequest, HttpAdapter, MockAdapter, NormalizedResponse,
    RequestOptions, ResponseType, Target,
};
pub use assertion::{Assertion, AssertionContext, AssertionResult, LogEntry, ScenarioLog};
pub use common::{Error, Result};
pub use context::ExecutionContext;
pub use events::{ScenarioEvent, Subscriber, SuiteEvent};
pub use scenario::{Disposition, Scenario, ScenarioState, ScenarioTimestamps, StepOutcome};
pub use suite::{Suite, SuiteResult};
