//! Scenario lifecycle state machine
//!
//! A scenario owns one unit of work: a target, an ordered pipeline of
//! assertion callbacks, its hook lists, and its result log. It moves through
//! `Created → Configured/Queued → Executing → (Completed | Skipped | Aborted)`.
//! Admission is granted by the owning suite's task manager; the scenario
//! itself only announces readiness and reports completion back through the
//! manager's mailbox.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::watch;
use url::Url;

use crate::adapter::{
    FetchAdapter, FetchRequest, MockAdapter, RequestOptions, ResponseType, Target,
};
use crate::assertion::{
    AssertionContext, AssertionResult, LogEntry, ResponseDocument, ScenarioLog,
};
use crate::common::{Error, Result};
use crate::events::{ScenarioEvent, Subscriber, Subscribers};
use crate::suite::{ManagerMsg, SuiteAbort, SuiteCore};

/// Terminal classification of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Ran to completion; `passed` is false iff a non-optional assertion failed
    Completed { passed: bool },
    /// Explicit opt-out before execution; no pass/fail entries
    Skipped,
    /// Transport fault, callback fault, or watchdog timeout
    Aborted,
}

/// Observable lifecycle state, derived from the scenario's flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioState {
    Created,
    Configured,
    Queued,
    Executing,
    Completed,
    Skipped,
    Aborted,
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Configured => write!(f, "configured"),
            Self::Queued => write!(f, "queued"),
            Self::Executing => write!(f, "executing"),
            Self::Completed => write!(f, "completed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Set-at-most-once lifecycle timestamps
#[derive(Debug, Clone, Copy, Default)]
pub struct ScenarioTimestamps {
    pub initialized: Option<Instant>,
    pub executed: Option<Instant>,
    pub request_started: Option<Instant>,
    pub request_loaded: Option<Instant>,
    pub finished: Option<Instant>,
}

/// Outcome of one pipeline step: an optional value exposed to the next step,
/// or a fault that aborts the scenario
pub type StepOutcome = Result<Option<Value>>;

type StepFn = Box<dyn FnOnce(AssertionContext) -> BoxFuture<'static, StepOutcome> + Send>;

type HookFn = Box<dyn FnOnce(Arc<Scenario>) -> BoxFuture<'static, Result<()>> + Send>;

/// Target as configured, before base-URL resolution
#[derive(Debug, Clone)]
enum RawTarget {
    Url(String),
    MockFile(PathBuf),
}

#[derive(Default)]
struct HookLists {
    before: Vec<HookFn>,
    after: Vec<HookFn>,
    success: Vec<HookFn>,
    failure: Vec<HookFn>,
    error: Vec<HookFn>,
    finally_: Vec<HookFn>,
}

struct Inner {
    title: String,
    request: RequestOptions,
    target: Option<RawTarget>,
    pipeline: VecDeque<(Option<String>, StepFn)>,
    hooks: HookLists,
    timestamps: ScenarioTimestamps,
    /// Execution has started; pipeline and hook lists are frozen
    executed: bool,
    /// A terminal sequence (complete or skip) has been claimed; at most one
    /// caller ever runs completion side effects
    completing: bool,
    /// Completion sequence has run; set exactly once
    finished: bool,
    disposition: Option<Disposition>,
    /// Held back until the owning suite's execute() clears the gate
    wait_to_execute: bool,
    /// Readiness already announced to the task manager
    ready_announced: bool,
}

/// One unit of work: target + assertion pipeline + hooks + result log
pub struct Scenario {
    id: usize,
    response_type: ResponseType,
    adapter: Mutex<Arc<dyn FetchAdapter>>,
    suite: Weak<SuiteCore>,
    inner: Mutex<Inner>,
    log: Arc<Mutex<ScenarioLog>>,
    subscribers: Subscribers<ScenarioEvent>,
}

impl Scenario {
    pub(crate) fn new(
        id: usize,
        title: impl Into<String>,
        response_type: ResponseType,
        adapter: Arc<dyn FetchAdapter>,
        suite: Weak<SuiteCore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            response_type,
            adapter: Mutex::new(adapter),
            suite,
            inner: Mutex::new(Inner {
                title: title.into(),
                request: RequestOptions::default(),
                target: None,
                pipeline: VecDeque::new(),
                hooks: HookLists::default(),
                timestamps: ScenarioTimestamps {
                    initialized: Some(Instant::now()),
                    ..Default::default()
                },
                executed: false,
                completing: false,
                finished: false,
                disposition: None,
                wait_to_execute: true,
                ready_announced: false,
            }),
            log: Arc::new(Mutex::new(ScenarioLog::new())),
            subscribers: Subscribers::new(),
        })
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    // === Configuration ===

    pub fn title(&self) -> String {
        self.inner.lock().unwrap().title.clone()
    }

    /// Rename the scenario; only valid before execution starts
    pub fn set_title(&self, title: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.executed {
            return Err(Error::AlreadyExecuting {
                title: inner.title.clone(),
            });
        }
        inner.title = title.into();
        Ok(())
    }

    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }

    /// Replace the request options handed to the adapter
    pub fn set_request_options(&self, options: RequestOptions) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.executed {
            return Err(Error::AlreadyExecuting {
                title: inner.title.clone(),
            });
        }
        inner.request = options;
        Ok(())
    }

    /// Set the target URL. May be relative; resolution against the suite
    /// base URL happens when the fetch is dispatched.
    ///
    /// The target may be assigned exactly once; a second call fails with
    /// [`Error::TargetAlreadySet`] rather than silently overwriting.
    pub fn open(&self, url: impl Into<String>) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.executed {
                return Err(Error::AlreadyExecuting {
                    title: inner.title.clone(),
                });
            }
            if inner.target.is_some() {
                return Err(Error::TargetAlreadySet {
                    title: inner.title.clone(),
                });
            }
            inner.target = Some(RawTarget::Url(url.into()));
        }
        self.check_readiness();
        Ok(())
    }

    /// Set a local file as the target and switch to the mock adapter.
    /// Same one-shot contract as [`Scenario::open`].
    pub fn mock(&self, path: impl Into<PathBuf>) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.executed {
                return Err(Error::AlreadyExecuting {
                    title: inner.title.clone(),
                });
            }
            if inner.target.is_some() {
                return Err(Error::TargetAlreadySet {
                    title: inner.title.clone(),
                });
            }
            inner.target = Some(RawTarget::MockFile(path.into()));
        }
        *self.adapter.lock().unwrap() = Arc::new(MockAdapter::new());
        self.check_readiness();
        Ok(())
    }

    /// Append a step to the assertion pipeline.
    ///
    /// The step receives its own handle to the scenario's assertion context
    /// and is written as `|ctx| async move { ... }`. An empty label
    /// suppresses the log comment otherwise written when the step begins.
    pub fn next<F, Fut>(&self, label: impl Into<String>, step: F) -> Result<()>
    where
        F: FnOnce(AssertionContext) -> Fut + Send + 'static,
        Fut: Future<Output = StepOutcome> + Send + 'static,
    {
        self.push_step(label.into(), step, false)
    }

    /// Prepend a step to the assertion pipeline; it will run before every
    /// step appended with [`Scenario::next`]
    pub fn next_prepend<F, Fut>(&self, label: impl Into<String>, step: F) -> Result<()>
    where
        F: FnOnce(AssertionContext) -> Fut + Send + 'static,
        Fut: Future<Output = StepOutcome> + Send + 'static,
    {
        self.push_step(label.into(), step, true)
    }

    fn push_step<F, Fut>(&self, label: String, step: F, prepend: bool) -> Result<()>
    where
        F: FnOnce(AssertionContext) -> Fut + Send + 'static,
        Fut: Future<Output = StepOutcome> + Send + 'static,
    {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.executed {
                return Err(Error::AlreadyExecuting {
                    title: inner.title.clone(),
                });
            }
            let label = (!label.is_empty()).then_some(label);
            let step: StepFn = Box::new(move |ctx| Box::pin(step(ctx)));
            if prepend {
                inner.pipeline.push_front((label, step));
            } else {
                inner.pipeline.push_back((label, step));
            }
        }
        self.check_readiness();
        Ok(())
    }

    // === Hooks ===

    /// Run before the fetch is dispatched
    pub fn before<F, Fut>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(Arc<Scenario>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push_hook(hook, |h| &mut h.before)
    }

    /// Run first in the completion sequence, on every terminal path
    /// including skip
    pub fn after<F, Fut>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(Arc<Scenario>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push_hook(hook, |h| &mut h.after)
    }

    /// Run when the scenario completes with no non-optional failures
    pub fn success<F, Fut>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(Arc<Scenario>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push_hook(hook, |h| &mut h.success)
    }

    /// Run when the scenario completes with at least one failing assertion
    pub fn failure<F, Fut>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(Arc<Scenario>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push_hook(hook, |h| &mut h.failure)
    }

    /// Run only on the Aborted path (transport fault, callback fault, timeout)
    pub fn error<F, Fut>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(Arc<Scenario>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push_hook(hook, |h| &mut h.error)
    }

    /// Run exactly once on every terminal path
    pub fn finally<F, Fut>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(Arc<Scenario>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push_hook(hook, |h| &mut h.finally_)
    }

    fn push_hook<F, Fut>(
        &self,
        hook: F,
        select: impl FnOnce(&mut HookLists) -> &mut Vec<HookFn>,
    ) -> Result<()>
    where
        F: FnOnce(Arc<Scenario>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        if inner.executed {
            return Err(Error::AlreadyExecuting {
                title: inner.title.clone(),
            });
        }
        select(&mut inner.hooks).push(Box::new(move |s| Box::pin(hook(s))));
        Ok(())
    }

    // === Observation ===

    /// Register a fire-and-forget status subscriber
    pub fn subscribe(&self, subscriber: Subscriber<ScenarioEvent>) {
        self.subscribers.subscribe(subscriber);
    }

    pub fn has_executed(&self) -> bool {
        self.inner.lock().unwrap().executed
    }

    pub fn has_finished(&self) -> bool {
        self.inner.lock().unwrap().finished
    }

    /// Any non-optional failing assertion logged so far
    pub fn has_failed(&self) -> bool {
        self.log.lock().unwrap().has_failure()
    }

    pub fn has_passed(&self) -> bool {
        self.has_finished()
            && matches!(
                self.disposition(),
                Some(Disposition::Completed { passed: true })
            )
    }

    pub fn disposition(&self) -> Option<Disposition> {
        self.inner.lock().unwrap().disposition
    }

    /// Current lifecycle state, derived from the scenario's flags
    pub fn state(&self) -> ScenarioState {
        let inner = self.inner.lock().unwrap();
        match inner.disposition {
            Some(Disposition::Completed { .. }) => ScenarioState::Completed,
            Some(Disposition::Skipped) => ScenarioState::Skipped,
            Some(Disposition::Aborted) => ScenarioState::Aborted,
            None if inner.executed => ScenarioState::Executing,
            None if inner.target.is_some() && !inner.pipeline.is_empty() => ScenarioState::Queued,
            None if inner.target.is_some() || !inner.pipeline.is_empty() => {
                ScenarioState::Configured
            }
            None => ScenarioState::Created,
        }
    }

    pub fn timestamps(&self) -> ScenarioTimestamps {
        self.inner.lock().unwrap().timestamps
    }

    /// Wall time from execution start to completion
    pub fn execution_duration(&self) -> Option<Duration> {
        let ts = self.timestamps();
        Some(ts.finished? - ts.executed?)
    }

    /// Snapshot of the result log, in append order
    pub fn get_log(&self) -> Vec<LogEntry> {
        self.log.lock().unwrap().entries().to_vec()
    }

    /// Record an assertion outcome produced by an external assertion layer
    pub fn log_result(&self, result: AssertionResult) {
        self.log.lock().unwrap().log_result(result);
    }

    /// Append a comment to the result log
    pub fn comment(&self, text: impl Into<String>) {
        self.log.lock().unwrap().comment(text);
    }

    // === Skip ===

    /// Opt out of execution. Runs `before` hooks, logs a single skip
    /// comment, runs `after` and `finally` hooks, and reports a `Skipped`
    /// disposition to the suite with zero pass/fail entries.
    pub async fn skip(self: &Arc<Self>, reason: Option<&str>) -> Result<()> {
        let (before, title) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.executed {
                return Err(Error::AlreadyExecuting {
                    title: inner.title.clone(),
                });
            }
            inner.executed = true;
            inner.completing = true;
            inner.timestamps.executed = Some(Instant::now());
            (std::mem::take(&mut inner.hooks.before), inner.title.clone())
        };
        tracing::info!(scenario = %title, reason, "Scenario skipped");

        self.run_hooks_lenient(before, "before").await;

        self.log.lock().unwrap().comment(match reason {
            Some(reason) => format!("Skipped: {}", reason),
            None => "Skipped".to_string(),
        });

        let (after, finally_) = {
            let mut inner = self.inner.lock().unwrap();
            (
                std::mem::take(&mut inner.hooks.after),
                std::mem::take(&mut inner.hooks.finally_),
            )
        };
        self.run_hooks_lenient(after, "after").await;
        self.run_hooks_lenient(finally_, "finally").await;

        {
            let mut inner = self.inner.lock().unwrap();
            inner.finished = true;
            inner.timestamps.finished = Some(Instant::now());
            inner.disposition = Some(Disposition::Skipped);
        }
        self.subscribers.emit(ScenarioEvent::Skipped, &title);
        self.subscribers.emit(ScenarioEvent::Finished, &title);
        self.notify_completed(Disposition::Skipped);
        Ok(())
    }

    // === Execution (driven by the task manager) ===

    /// Announce readiness to the task manager when this scenario has a
    /// target, at least one pipeline step, and is no longer held back.
    /// Announcement goes through the manager mailbox, so it is deferred
    /// past any further synchronous configuration calls.
    pub(crate) fn check_readiness(&self) {
        let ready = {
            let mut inner = self.inner.lock().unwrap();
            let ready = inner.target.is_some()
                && !inner.pipeline.is_empty()
                && !inner.executed
                && !inner.wait_to_execute
                && !inner.ready_announced;
            if ready {
                inner.ready_announced = true;
            }
            ready
        };
        if ready {
            if let Some(core) = self.suite.upgrade() {
                let _ = core.tx.send(ManagerMsg::Ready(self.id));
            }
        }
    }

    /// Clear the suite hold-back gate and re-run the readiness check
    pub(crate) fn release_hold(&self) {
        self.inner.lock().unwrap().wait_to_execute = false;
        self.check_readiness();
    }

    /// Drive this scenario to a terminal disposition. Called once by the
    /// task manager after admission; the per-scenario watchdog and the
    /// suite-wide cancellation signal both force the Aborted path, but the
    /// completion sequence below always runs to the end.
    #[tracing::instrument(skip_all, fields(scenario = %self.title()))]
    pub(crate) async fn run(
        self: Arc<Self>,
        max_duration: Option<Duration>,
        suite_cancel: watch::Receiver<Option<SuiteAbort>>,
    ) -> Disposition {
        let title = {
            let mut inner = self.inner.lock().unwrap();
            if inner.executed {
                // Raced with skip(); the terminal path already ran.
                return inner.disposition.unwrap_or(Disposition::Skipped);
            }
            inner.executed = true;
            inner.timestamps.executed = Some(Instant::now());
            inner.title.clone()
        };
        self.subscribers.emit(ScenarioEvent::Executing, &title);
        tracing::debug!("Scenario executing");

        let outcome = tokio::select! {
            outcome = self.run_core() => outcome,
            _ = watchdog(max_duration) => Err(Error::ScenarioTimeout {
                title: title.clone(),
                after_ms: max_duration.map(|d| d.as_millis() as u64).unwrap_or(0),
            }),
            abort = suite_cancelled(suite_cancel) => Err(Error::SuiteTimeout {
                title: abort.suite_title,
                after_ms: abort.after_ms,
            }),
        };

        self.complete(outcome).await
    }

    /// Before hooks, fetch, response wrap, sequential pipeline. Every `?`
    /// here lands on the Aborted path in [`Scenario::complete`].
    async fn run_core(self: &Arc<Self>) -> Result<()> {
        let core = self.suite.upgrade();

        // Suite before_each hooks run ahead of the scenario's own.
        if let Some(core) = &core {
            core.subscribers
                .emit(crate::events::SuiteEvent::BeforeEachExecute, &core.title);
            for hook in core.before_each_hooks() {
                hook(self.clone()).await?;
            }
        }

        let before = std::mem::take(&mut self.inner.lock().unwrap().hooks.before);
        for hook in before {
            hook(self.clone()).await?;
        }

        let request = self.build_request(core.as_deref())?;
        let adapter = self.adapter.lock().unwrap().clone();
        let title = self.title();

        self.inner.lock().unwrap().timestamps.request_started = Some(Instant::now());
        self.subscribers.emit(ScenarioEvent::RequestStarted, &title);
        tracing::debug!(target = %request.target, "Dispatching fetch");

        let response = adapter.fetch(&request).await?;

        self.inner.lock().unwrap().timestamps.request_loaded = Some(Instant::now());
        self.subscribers.emit(ScenarioEvent::RequestLoaded, &title);
        tracing::debug!(status = response.status, "Fetch loaded");

        let document = ResponseDocument::wrap(self.response_type, &response)?;
        let ctx = AssertionContext::new(title, response, document, self.log.clone());

        // Strictly sequential: each step is awaited to completion before the
        // next begins, and its return value is exposed via ctx.result().
        let pipeline = std::mem::take(&mut self.inner.lock().unwrap().pipeline);
        for (label, step) in pipeline {
            if let Some(label) = label {
                ctx.comment(label);
            }
            let value = step(ctx.clone()).await?;
            ctx.set_result(value);
        }

        Ok(())
    }

    /// Resolve the configured target against the suite base URL
    fn build_request(&self, core: Option<&SuiteCore>) -> Result<FetchRequest> {
        let inner = self.inner.lock().unwrap();
        let raw = match inner.target.clone() {
            Some(raw) => raw,
            None => {
                return Err(Error::invalid_url(
                    "",
                    "scenario was dispatched without a target",
                ))
            }
        };

        let target = match raw {
            RawTarget::MockFile(path) => Target::MockFile(path),
            RawTarget::Url(raw_url) => {
                let base = core.and_then(|c| c.base_url.lock().unwrap().clone());
                let url = match Url::parse(&raw_url) {
                    Ok(url) => url,
                    Err(url::ParseError::RelativeUrlWithoutBase) => match base {
                        Some(base) => base
                            .join(&raw_url)
                            .map_err(|e| Error::invalid_url(&raw_url, e))?,
                        None => {
                            return Err(Error::invalid_url(
                                &raw_url,
                                "relative target but the suite has no base URL",
                            ))
                        }
                    },
                    Err(e) => return Err(Error::invalid_url(&raw_url, e)),
                };
                Target::Url(url)
            }
        };

        Ok(FetchRequest {
            target,
            options: inner.request.clone(),
            response_type: self.response_type,
        })
    }

    /// Idempotent completion sequence: after hooks, suite after_each,
    /// exactly one of success/failure (or the error hooks on the Aborted
    /// path), then finally hooks, suite notification, and the finished flag.
    async fn complete(self: &Arc<Self>, outcome: Result<()>) -> Disposition {
        {
            // Claim the terminal sequence before the first await; a second
            // caller racing in here must never re-run the side effects.
            let mut inner = self.inner.lock().unwrap();
            if inner.finished || inner.completing {
                return inner.disposition.unwrap_or(Disposition::Aborted);
            }
            inner.completing = true;
        }
        let title = self.title();

        let after = std::mem::take(&mut self.inner.lock().unwrap().hooks.after);
        self.run_hooks_lenient(after, "after").await;

        if let Some(core) = self.suite.upgrade() {
            core.subscribers
                .emit(crate::events::SuiteEvent::AfterEachExecute, &core.title);
            for hook in core.after_each_hooks() {
                if let Err(e) = hook(self.clone()).await {
                    tracing::warn!(scenario = %title, error = %e, "after_each hook failed");
                }
            }
        }

        let disposition = match outcome {
            Err(e) => {
                // A genuine fault, not an assertion failure: log a synthetic
                // failing result carrying the error detail.
                tracing::warn!(scenario = %title, error = %e, "Scenario aborted");
                self.log
                    .lock()
                    .unwrap()
                    .log_result(AssertionResult::fail(format!("Aborted: {}", e)));
                let error_hooks = std::mem::take(&mut self.inner.lock().unwrap().hooks.error);
                self.run_hooks_lenient(error_hooks, "error").await;
                Disposition::Aborted
            }
            Ok(()) => {
                let passed = !self.log.lock().unwrap().has_failure();
                let hooks = {
                    let mut inner = self.inner.lock().unwrap();
                    if passed {
                        std::mem::take(&mut inner.hooks.success)
                    } else {
                        std::mem::take(&mut inner.hooks.failure)
                    }
                };
                self.run_hooks_lenient(hooks, if passed { "success" } else { "failure" })
                    .await;
                Disposition::Completed { passed }
            }
        };

        let finally_ = std::mem::take(&mut self.inner.lock().unwrap().hooks.finally_);
        self.run_hooks_lenient(finally_, "finally").await;

        {
            let mut inner = self.inner.lock().unwrap();
            inner.finished = true;
            inner.timestamps.finished = Some(Instant::now());
            inner.disposition = Some(disposition);
        }
        self.subscribers.emit(ScenarioEvent::Finished, &title);
        tracing::debug!(?disposition, "Scenario finished");
        self.notify_completed(disposition);
        disposition
    }

    /// Force the Aborted path for a scenario that was never admitted
    /// (used by the suite watchdog)
    pub(crate) async fn force_abort(self: &Arc<Self>, error: Error) -> Disposition {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.finished {
                return inner.disposition.unwrap_or(Disposition::Aborted);
            }
            if !inner.executed {
                inner.executed = true;
                inner.timestamps.executed = Some(Instant::now());
            }
        }
        self.complete(Err(error)).await
    }

    /// Completion-phase hooks must not unwind the terminal sequence;
    /// a failing hook is logged and the sequence continues.
    async fn run_hooks_lenient(self: &Arc<Self>, hooks: Vec<HookFn>, phase: &str) {
        for hook in hooks {
            if let Err(e) = hook(self.clone()).await {
                tracing::warn!(phase, error = %e, "Scenario hook failed");
            }
        }
    }

    fn notify_completed(&self, disposition: Disposition) {
        if let Some(core) = self.suite.upgrade() {
            let _ = core.tx.send(ManagerMsg::Completed {
                id: self.id,
                disposition,
            });
        }
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("id", &self.id)
            .field("title", &self.title())
            .field("state", &self.state())
            .finish()
    }
}

/// Pending forever when no duration is configured
async fn watchdog(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// Resolves when the suite-wide watchdog fires
async fn suite_cancelled(mut cancel: watch::Receiver<Option<SuiteAbort>>) -> SuiteAbort {
    loop {
        let current = cancel.borrow().clone();
        if let Some(abort) = current {
            return abort;
        }
        if cancel.changed().await.is_err() {
            // Sender dropped; the suite can no longer cancel us.
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orphan_scenario(title: &str) -> Arc<Scenario> {
        Scenario::new(
            0,
            title,
            ResponseType::Json,
            Arc::new(MockAdapter::new()),
            Weak::new(),
        )
    }

    #[tokio::test]
    async fn concurrent_aborts_complete_exactly_once() {
        let scenario = orphan_scenario("racy");
        let finally_runs = Arc::new(AtomicUsize::new(0));
        {
            let finally_runs = finally_runs.clone();
            scenario
                .finally(move |_s| async move {
                    finally_runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }
        // An after hook that suspends keeps the first completion sequence
        // in flight while the second caller races past the entry guard.
        scenario
            .after(|_s| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            })
            .unwrap();

        let first = tokio::spawn({
            let scenario = scenario.clone();
            async move { scenario.force_abort(Error::transport("first")).await }
        });
        let second = tokio::spawn({
            let scenario = scenario.clone();
            async move { scenario.force_abort(Error::transport("second")).await }
        });
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(scenario.disposition(), Some(Disposition::Aborted));
        assert_eq!(finally_runs.load(Ordering::SeqCst), 1);
        // Exactly one synthetic abort entry made it into the log.
        let log = scenario.get_log();
        assert_eq!(log.len(), 1, "log: {:?}", log);
        assert!(log[0].result().unwrap().counts_as_failure());
    }

    #[tokio::test]
    async fn abort_racing_a_skip_leaves_the_skip_outcome() {
        let scenario = orphan_scenario("skipped first");
        scenario.skip(Some("not today")).await.unwrap();

        let disposition = scenario.force_abort(Error::transport("late")).await;
        assert_eq!(disposition, Disposition::Skipped);
        assert_eq!(scenario.disposition(), Some(Disposition::Skipped));
        assert_eq!(scenario.get_log().len(), 1);
    }
}
