//! Suite: an ordered collection of scenarios plus suite-level hooks and
//! concurrency/timeout policy
//!
//! The suite itself is a thin registration surface. All aggregate state is
//! owned and mutated by the [`task_manager`] task; scenarios and callers
//! reach it only through its mailbox.

mod task_manager;

pub(crate) use task_manager::{ManagerMsg, SuiteAbort};

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use url::Url;

use crate::adapter::ResponseType;
use crate::common::{Error, Result};
use crate::context::ExecutionContext;
use crate::events::{Subscriber, Subscribers, SuiteEvent};
use crate::scenario::{Disposition, Scenario};

use task_manager::SuiteTaskManager;

/// Hook run once per scenario (suite `before_each`/`after_each`)
pub(crate) type EachHook =
    Arc<dyn Fn(Arc<Scenario>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Hook run once per suite (`before_all`, `after_all`, `success`, `failure`,
/// `finally`); receives an aggregate snapshot
pub(crate) type OnceHook = Box<dyn FnOnce(SuiteResult) -> BoxFuture<'static, Result<()>> + Send>;

#[derive(Default)]
pub(crate) struct OnceHooks {
    pub before_all: Vec<OnceHook>,
    pub after_all: Vec<OnceHook>,
    pub success: Vec<OnceHook>,
    pub failure: Vec<OnceHook>,
    pub finally_: Vec<OnceHook>,
}

#[derive(Default)]
pub(crate) struct EachHooks {
    pub before_each: Vec<EachHook>,
    pub after_each: Vec<EachHook>,
}

/// Scheduling policy, read by the manager when execution starts
#[derive(Debug, Clone, Copy)]
pub(crate) struct SuiteLimits {
    /// `None` = unbounded
    pub concurrency: Option<usize>,
    pub max_scenario_duration: Option<Duration>,
    pub max_suite_duration: Option<Duration>,
}

/// State shared between the suite handle, its scenarios (weakly), and the
/// task manager
pub(crate) struct SuiteCore {
    pub(crate) title: String,
    pub(crate) base_url: Mutex<Option<Url>>,
    /// Mailbox into the task manager; the single entry point for all
    /// cross-component state changes
    pub(crate) tx: mpsc::UnboundedSender<ManagerMsg>,
    pub(crate) scenarios: Mutex<Vec<Arc<Scenario>>>,
    pub(crate) each_hooks: Mutex<EachHooks>,
    pub(crate) once_hooks: Mutex<OnceHooks>,
    pub(crate) subscribers: Subscribers<SuiteEvent>,
    pub(crate) execute_called: AtomicBool,
    pub(crate) limits: Mutex<SuiteLimits>,
    pub(crate) started_at: Mutex<Option<Instant>>,
    pub(crate) finished_at: Mutex<Option<Instant>>,
}

impl SuiteCore {
    pub(crate) fn before_each_hooks(&self) -> Vec<EachHook> {
        self.each_hooks.lock().unwrap().before_each.clone()
    }

    pub(crate) fn after_each_hooks(&self) -> Vec<EachHook> {
        self.each_hooks.lock().unwrap().after_each.clone()
    }

    /// Aggregate snapshot. Skipped scenarios are excluded from pass/fail:
    /// the suite passes iff no non-skipped scenario failed or aborted.
    pub(crate) fn snapshot(&self) -> SuiteResult {
        let scenarios = self.scenarios.lock().unwrap();
        let mut pass_count = 0;
        let mut fail_count = 0;
        let mut skip_count = 0;
        for scenario in scenarios.iter() {
            match scenario.disposition() {
                Some(Disposition::Completed { passed: true }) => pass_count += 1,
                Some(Disposition::Completed { passed: false }) | Some(Disposition::Aborted) => {
                    fail_count += 1
                }
                Some(Disposition::Skipped) => skip_count += 1,
                None => {}
            }
        }
        let duration = match (
            *self.started_at.lock().unwrap(),
            *self.finished_at.lock().unwrap(),
        ) {
            (Some(started), Some(finished)) => Some(finished - started),
            _ => None,
        };
        SuiteResult {
            title: self.title.clone(),
            passed: fail_count == 0,
            pass_count,
            fail_count,
            skip_count,
            duration,
        }
    }
}

/// Aggregate outcome snapshot handed to suite-level hooks and returned by
/// [`Suite::finished`]
#[derive(Debug, Clone)]
pub struct SuiteResult {
    pub title: String,
    /// True iff no non-skipped scenario failed or aborted
    pub passed: bool,
    pub pass_count: usize,
    pub fail_count: usize,
    pub skip_count: usize,
    /// Wall time from first admission to suite completion
    pub duration: Option<Duration>,
}

/// An ordered collection of scenarios executed under one policy
pub struct Suite {
    core: Arc<SuiteCore>,
    context: ExecutionContext,
    next_id: AtomicUsize,
    finished_rx: watch::Receiver<bool>,
}

impl Suite {
    /// Create a suite. Limits default from the execution context and may be
    /// tightened per suite before `execute()`.
    pub fn new(title: impl Into<String>, context: ExecutionContext) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = watch::channel(false);

        let core = Arc::new(SuiteCore {
            title: title.into(),
            base_url: Mutex::new(None),
            tx,
            scenarios: Mutex::new(Vec::new()),
            each_hooks: Mutex::new(EachHooks::default()),
            once_hooks: Mutex::new(OnceHooks::default()),
            subscribers: Subscribers::new(),
            execute_called: AtomicBool::new(false),
            limits: Mutex::new(SuiteLimits {
                concurrency: context.default_concurrency_limit,
                max_scenario_duration: context.default_scenario_timeout,
                max_suite_duration: context.default_suite_timeout,
            }),
            started_at: Mutex::new(None),
            finished_at: Mutex::new(None),
        });

        SuiteTaskManager::spawn(core.clone(), rx, finished_tx);

        Self {
            core,
            context,
            next_id: AtomicUsize::new(0),
            finished_rx,
        }
    }

    pub fn title(&self) -> &str {
        &self.core.title
    }

    // === Configuration ===

    /// Base URL that relative scenario targets are joined against
    pub fn set_base_url(&self, url: &str) -> Result<()> {
        let parsed = Url::parse(url).map_err(|e| Error::invalid_url(url, e))?;
        *self.core.base_url.lock().unwrap() = Some(parsed);
        Ok(())
    }

    pub fn base_url(&self) -> Option<Url> {
        self.core.base_url.lock().unwrap().clone()
    }

    /// Maximum number of scenarios in the Executing state at once;
    /// 0 means unbounded
    pub fn set_concurrency_limit(&self, limit: usize) -> Result<()> {
        self.guard_not_executed()?;
        self.core.limits.lock().unwrap().concurrency = (limit > 0).then_some(limit);
        Ok(())
    }

    /// Per-scenario watchdog, started at admission
    pub fn set_max_scenario_duration(&self, duration: Duration) -> Result<()> {
        self.guard_not_executed()?;
        self.core.limits.lock().unwrap().max_scenario_duration = Some(duration);
        Ok(())
    }

    /// Suite-wide watchdog, started at first admission
    pub fn set_max_suite_duration(&self, duration: Duration) -> Result<()> {
        self.guard_not_executed()?;
        self.core.limits.lock().unwrap().max_suite_duration = Some(duration);
        Ok(())
    }

    // === Scenario registration ===

    /// Create and register a scenario. Scenarios are owned by this suite and
    /// held back from auto-execution until [`Suite::execute`] is called.
    ///
    /// Registration stays open while the suite is executing, but fails once
    /// the suite has finished: the scheduler has shut down at that point and
    /// a late scenario could never run.
    pub fn scenario(
        &self,
        title: impl Into<String>,
        response_type: ResponseType,
    ) -> Result<Arc<Scenario>> {
        if self.has_finished() {
            return Err(Error::SuiteAlreadyExecuted {
                title: self.core.title.clone(),
            });
        }
        let adapter = self.context.registry().resolve(response_type)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let scenario = Scenario::new(
            id,
            title,
            response_type,
            adapter,
            Arc::downgrade(&self.core),
        );

        self.core.scenarios.lock().unwrap().push(scenario.clone());
        let _ = self.core.tx.send(ManagerMsg::Register(scenario.clone()));

        // Scenarios registered after execute() are not held back.
        if self.core.execute_called.load(Ordering::SeqCst) {
            scenario.release_hold();
        }
        Ok(scenario)
    }

    /// Registered scenarios, in insertion order
    pub fn scenarios(&self) -> Vec<Arc<Scenario>> {
        self.core.scenarios.lock().unwrap().clone()
    }

    // === Hooks ===

    /// Run once before the first scenario is admitted
    pub fn before_all<F, Fut>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(SuiteResult) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push_once_hook(hook, |h| &mut h.before_all)
    }

    /// Run once after every scenario reaches a terminal state
    pub fn after_all<F, Fut>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(SuiteResult) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push_once_hook(hook, |h| &mut h.after_all)
    }

    /// Run once iff the suite aggregate passed
    pub fn success<F, Fut>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(SuiteResult) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push_once_hook(hook, |h| &mut h.success)
    }

    /// Run once iff the suite aggregate failed
    pub fn failure<F, Fut>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(SuiteResult) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push_once_hook(hook, |h| &mut h.failure)
    }

    /// Run once after success/failure, on every path
    pub fn finally<F, Fut>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(SuiteResult) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.push_once_hook(hook, |h| &mut h.finally_)
    }

    /// Run before each scenario's own `before` hooks
    pub fn before_each<F, Fut>(&self, hook: F) -> Result<()>
    where
        F: Fn(Arc<Scenario>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.guard_not_executed()?;
        self.core
            .each_hooks
            .lock()
            .unwrap()
            .before_each
            .push(Arc::new(move |s| Box::pin(hook(s))));
        Ok(())
    }

    /// Run after each scenario's own `after` hooks, before its
    /// success/failure hooks
    pub fn after_each<F, Fut>(&self, hook: F) -> Result<()>
    where
        F: Fn(Arc<Scenario>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.guard_not_executed()?;
        self.core
            .each_hooks
            .lock()
            .unwrap()
            .after_each
            .push(Arc::new(move |s| Box::pin(hook(s))));
        Ok(())
    }

    fn push_once_hook<F, Fut>(
        &self,
        hook: F,
        select: impl FnOnce(&mut OnceHooks) -> &mut Vec<OnceHook>,
    ) -> Result<()>
    where
        F: FnOnce(SuiteResult) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.guard_not_executed()?;
        select(&mut self.core.once_hooks.lock().unwrap())
            .push(Box::new(move |r| Box::pin(hook(r))));
        Ok(())
    }

    fn guard_not_executed(&self) -> Result<()> {
        if self.core.execute_called.load(Ordering::SeqCst) {
            return Err(Error::SuiteAlreadyExecuted {
                title: self.core.title.clone(),
            });
        }
        Ok(())
    }

    // === Observation ===

    /// Register a fire-and-forget status subscriber
    pub fn subscribe(&self, subscriber: Subscriber<SuiteEvent>) {
        self.core.subscribers.subscribe(subscriber);
    }

    // === Execution ===

    /// Release every registered scenario for admission. One-time operation:
    /// a second call fails with [`Error::SuiteAlreadyExecuted`] and has no
    /// scheduling effect.
    pub fn execute(&self) -> Result<()> {
        if self.core.execute_called.swap(true, Ordering::SeqCst) {
            return Err(Error::SuiteAlreadyExecuted {
                title: self.core.title.clone(),
            });
        }
        tracing::info!(suite = %self.core.title, "Suite execution released");
        for scenario in self.scenarios() {
            scenario.release_hold();
        }
        let _ = self.core.tx.send(ManagerMsg::Execute);
        Ok(())
    }

    /// Resolves once every registered scenario reached a terminal
    /// disposition and the suite's own hook sequence finished
    pub async fn finished(&self) -> SuiteResult {
        let mut rx = self.finished_rx.clone();
        // Closed sender means the manager is gone; the snapshot below still
        // reflects whatever terminal state was reached.
        let _ = rx.wait_for(|finished| *finished).await;
        self.core.snapshot()
    }

    /// Convenience: `execute()` then await `finished()`
    pub async fn run(&self) -> Result<SuiteResult> {
        self.execute()?;
        Ok(self.finished().await)
    }

    pub fn has_finished(&self) -> bool {
        *self.finished_rx.borrow()
    }

    pub fn has_passed(&self) -> bool {
        self.has_finished() && self.core.snapshot().passed
    }

    pub fn pass_count(&self) -> usize {
        self.core.snapshot().pass_count
    }

    pub fn fail_count(&self) -> usize {
        self.core.snapshot().fail_count
    }

    pub fn skip_count(&self) -> usize {
        self.core.snapshot().skip_count
    }

    /// Wall time from first admission to completion
    pub fn execution_duration(&self) -> Option<Duration> {
        self.core.snapshot().duration
    }
}

impl std::fmt::Debug for Suite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suite")
            .field("title", &self.core.title)
            .field("scenarios", &self.core.scenarios.lock().unwrap().len())
            .field("finished", &self.has_finished())
            .finish()
    }
}
