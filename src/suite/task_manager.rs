//! Suite task manager — admission control, watchdogs, aggregation
//!
//! The manager is a single spawned task owning a mailbox. It is the only
//! component that mutates suite aggregate state: scenarios announce
//! readiness and report completion as messages, and every admission
//! decision, watchdog, and suite-level hook fires from this loop.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::common::Error;
use crate::events::SuiteEvent;
use crate::scenario::{Disposition, Scenario};

use super::{OnceHook, SuiteCore, SuiteLimits, SuiteResult};

/// Reason broadcast to executing scenarios when the suite watchdog fires
#[derive(Debug, Clone)]
pub(crate) struct SuiteAbort {
    pub suite_title: String,
    pub after_ms: u64,
}

/// Mailbox protocol; the single entry point for cross-component state changes
pub(crate) enum ManagerMsg {
    /// A scenario was registered with the owning suite
    Register(Arc<Scenario>),
    /// A scenario has a target, a pipeline, and a cleared hold-back gate
    Ready(usize),
    /// The suite's one-time execute() gate was cleared
    Execute,
    /// A scenario reached a terminal disposition
    Completed { id: usize, disposition: Disposition },
    /// The suite-wide watchdog fired
    SuiteTimeout,
}

pub(crate) struct SuiteTaskManager {
    core: Weak<SuiteCore>,
    rx: mpsc::UnboundedReceiver<ManagerMsg>,
    finished_tx: watch::Sender<bool>,
    cancel_tx: watch::Sender<Option<SuiteAbort>>,
    /// Registry in insertion order of arrival
    scenarios: HashMap<usize, Arc<Scenario>>,
    /// FIFO of ready scenarios waiting for an execution slot
    queue: VecDeque<usize>,
    queued: HashSet<usize>,
    /// Scenarios currently holding an execution slot
    admitted: HashSet<usize>,
    terminal: HashMap<usize, Disposition>,
    executing: usize,
    execute_called: bool,
    before_all_done: bool,
    suite_timer: Option<JoinHandle<()>>,
    finalized: bool,
}

impl SuiteTaskManager {
    /// Spawn the manager task for one suite
    pub(crate) fn spawn(
        core: Arc<SuiteCore>,
        rx: mpsc::UnboundedReceiver<ManagerMsg>,
        finished_tx: watch::Sender<bool>,
    ) -> JoinHandle<()> {
        let (cancel_tx, _) = watch::channel(None);
        let manager = Self {
            core: Arc::downgrade(&core),
            rx,
            finished_tx,
            cancel_tx,
            scenarios: HashMap::new(),
            queue: VecDeque::new(),
            queued: HashSet::new(),
            admitted: HashSet::new(),
            terminal: HashMap::new(),
            executing: 0,
            execute_called: false,
            before_all_done: false,
            suite_timer: None,
            finalized: false,
        };
        tokio::spawn(manager.run())
    }

    async fn run(mut self) {
        // The mailbox closes when the suite handle is dropped; the loop also
        // ends once the suite's completion sequence has run.
        while let Some(msg) = self.rx.recv().await {
            match msg {
                ManagerMsg::Register(scenario) => {
                    tracing::debug!(scenario = %scenario.title(), "Scenario registered");
                    self.scenarios.insert(scenario.id(), scenario);
                }
                ManagerMsg::Ready(id) => self.on_ready(id).await,
                ManagerMsg::Execute => {
                    self.execute_called = true;
                    self.maybe_finalize().await;
                }
                ManagerMsg::Completed { id, disposition } => {
                    self.on_completed(id, disposition).await
                }
                ManagerMsg::SuiteTimeout => self.on_suite_timeout().await,
            }
            if self.finalized {
                break;
            }
        }
        tracing::debug!("Suite task manager stopped");
    }

    /// Admit immediately if a slot is free, otherwise enqueue FIFO
    async fn on_ready(&mut self, id: usize) {
        if self.finalized
            || self.terminal.contains_key(&id)
            || self.admitted.contains(&id)
            || self.queued.contains(&id)
        {
            return;
        }
        let Some(core) = self.core.upgrade() else { return };
        let limits = *core.limits.lock().unwrap();

        let at_capacity = limits
            .concurrency
            .is_some_and(|limit| self.executing >= limit);
        if at_capacity {
            tracing::debug!(scenario_id = id, "Scenario queued, at concurrency limit");
            self.queue.push_back(id);
            self.queued.insert(id);
        } else {
            self.admit(id, &core, limits).await;
        }
    }

    async fn admit(&mut self, id: usize, core: &Arc<SuiteCore>, limits: SuiteLimits) {
        let Some(scenario) = self.scenarios.get(&id).cloned() else {
            return;
        };

        if !self.before_all_done {
            self.before_all_done = true;
            *core.started_at.lock().unwrap() = Some(Instant::now());
            core.subscribers
                .emit(SuiteEvent::BeforeAllExecute, &core.title);
            let hooks = std::mem::take(&mut core.once_hooks.lock().unwrap().before_all);
            run_once_hooks(hooks, core.snapshot(), "before_all").await;

            if let Some(duration) = limits.max_suite_duration {
                let tx = core.tx.clone();
                self.suite_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    let _ = tx.send(ManagerMsg::SuiteTimeout);
                }));
            }
        }

        self.executing += 1;
        self.admitted.insert(id);
        tracing::debug!(
            suite = %core.title,
            scenario = %scenario.title(),
            executing = self.executing,
            "Scenario admitted"
        );

        let cancel = self.cancel_tx.subscribe();
        tokio::spawn(scenario.run(limits.max_scenario_duration, cancel));
    }

    /// Record the terminal disposition, free the slot, and pull the next
    /// queued scenario before any finalization
    async fn on_completed(&mut self, id: usize, disposition: Disposition) {
        self.terminal.entry(id).or_insert(disposition);
        if self.admitted.remove(&id) {
            self.executing -= 1;
        }
        self.queued.remove(&id);
        self.admit_next().await;
        self.maybe_finalize().await;
    }

    async fn admit_next(&mut self) {
        let Some(core) = self.core.upgrade() else { return };
        let limits = *core.limits.lock().unwrap();
        while !self.finalized {
            let at_capacity = limits
                .concurrency
                .is_some_and(|limit| self.executing >= limit);
            if at_capacity {
                break;
            }
            let Some(id) = self.queue.pop_front() else { break };
            self.queued.remove(&id);
            if self.terminal.contains_key(&id) || self.admitted.contains(&id) {
                continue;
            }
            self.admit(id, &core, limits).await;
        }
    }

    /// Force every still-pending scenario onto the Aborted path. Executing
    /// scenarios receive the broadcast cancel signal and complete from their
    /// own driver; never-admitted ones are completed here so their hooks and
    /// logs still run.
    async fn on_suite_timeout(&mut self) {
        if self.finalized {
            return;
        }
        let Some(core) = self.core.upgrade() else { return };
        let after_ms = core
            .limits
            .lock()
            .unwrap()
            .max_suite_duration
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        tracing::warn!(suite = %core.title, after_ms, "Suite watchdog fired");

        let _ = self.cancel_tx.send(Some(SuiteAbort {
            suite_title: core.title.clone(),
            after_ms,
        }));
        self.queue.clear();
        self.queued.clear();

        for (id, scenario) in &self.scenarios {
            if self.terminal.contains_key(id) || self.admitted.contains(id) {
                continue;
            }
            let scenario = scenario.clone();
            let title = core.title.clone();
            tokio::spawn(async move {
                scenario
                    .force_abort(Error::SuiteTimeout { title, after_ms })
                    .await;
            });
        }
    }

    /// Exactly-once completion sequence: after_all, one of success/failure,
    /// finally, then the `finished` signal
    async fn maybe_finalize(&mut self) {
        if self.finalized || !self.execute_called {
            return;
        }
        if self.terminal.len() < self.scenarios.len() {
            return;
        }
        let Some(core) = self.core.upgrade() else { return };

        self.finalized = true;
        if let Some(timer) = self.suite_timer.take() {
            timer.abort();
        }
        *core.finished_at.lock().unwrap() = Some(Instant::now());

        core.subscribers
            .emit(SuiteEvent::AfterAllExecute, &core.title);
        let (after_all, success, failure, finally_) = {
            let mut hooks = core.once_hooks.lock().unwrap();
            (
                std::mem::take(&mut hooks.after_all),
                std::mem::take(&mut hooks.success),
                std::mem::take(&mut hooks.failure),
                std::mem::take(&mut hooks.finally_),
            )
        };
        run_once_hooks(after_all, core.snapshot(), "after_all").await;

        let snapshot = core.snapshot();
        if snapshot.passed {
            run_once_hooks(success, snapshot.clone(), "success").await;
        } else {
            run_once_hooks(failure, snapshot.clone(), "failure").await;
        }
        run_once_hooks(finally_, core.snapshot(), "finally").await;

        core.subscribers.emit(SuiteEvent::Finished, &core.title);
        let _ = self.finished_tx.send(true);
        tracing::info!(
            suite = %core.title,
            passed = snapshot.passed,
            pass = snapshot.pass_count,
            fail = snapshot.fail_count,
            skip = snapshot.skip_count,
            "Suite finished"
        );
    }
}

/// Suite-level hooks must not unwind the manager loop; failures are logged
async fn run_once_hooks(hooks: Vec<OnceHook>, snapshot: SuiteResult, phase: &str) {
    for hook in hooks {
        if let Err(e) = hook(snapshot.clone()).await {
            tracing::warn!(phase, error = %e, "Suite hook failed");
        }
    }
}
