//! End-to-end tests for the scenario engine
//!
//! Every test drives a real `Suite` through its task manager with a fake
//! in-process adapter, so scheduling, watchdogs, hooks, and aggregation are
//! exercised exactly as an embedding application would see them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use flightcheck::{
    AdapterRegistry, Disposition, Error, ExecutionContext, FetchAdapter, FetchRequest, LogEntry,
    NormalizedResponse, ResponseType, Result, Suite,
};

/// In-process adapter with configurable behavior and concurrency probes
#[derive(Default)]
struct FakeAdapter {
    status: u16,
    body: String,
    delay: Option<Duration>,
    hang: bool,
    fail: Option<String>,
    executing: AtomicUsize,
    max_executing: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl FakeAdapter {
    fn respond(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            status,
            body: body.to_string(),
            ..Default::default()
        })
    }

    fn slow(status: u16, body: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            status,
            body: body.to_string(),
            delay: Some(delay),
            ..Default::default()
        })
    }

    fn hanging() -> Arc<Self> {
        Arc::new(Self {
            hang: true,
            ..Default::default()
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            fail: Some(message.to_string()),
            ..Default::default()
        })
    }

    /// Highest number of fetches observed in flight at once
    fn max_seen(&self) -> usize {
        self.max_executing.load(Ordering::SeqCst)
    }

    /// Targets fetched, in dispatch order
    fn targets(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl FetchAdapter for FakeAdapter {
    async fn fetch(&self, request: &FetchRequest) -> Result<NormalizedResponse> {
        self.fetched
            .lock()
            .unwrap()
            .push(request.target.to_string());
        if let Some(message) = &self.fail {
            return Err(Error::transport(message));
        }

        let now = self.executing.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_executing.fetch_max(now, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.executing.fetch_sub(1, Ordering::SeqCst);

        Ok(NormalizedResponse {
            status: self.status,
            headers: vec![("content-type".into(), "application/json".into())],
            body: self.body.clone().into_bytes(),
            final_url: Some(request.target.to_string()),
            duration: Duration::from_millis(1),
        })
    }
}

/// Suite whose JSON scenarios all fetch through `adapter`
fn suite_with(title: &str, adapter: Arc<FakeAdapter>) -> Suite {
    let mut registry = AdapterRegistry::empty();
    registry.register(ResponseType::Json, adapter);
    Suite::new(title, ExecutionContext::with_registry(registry))
}

#[tokio::test]
async fn passing_suite_aggregates_pass() {
    let adapter = FakeAdapter::respond(200, r#"{"status":"ok"}"#);
    let suite = suite_with("smoke", adapter);
    suite.set_base_url("https://api.example.test").unwrap();

    let scenario = suite.scenario("health endpoint", ResponseType::Json).unwrap();
    scenario.open("/health").unwrap();
    scenario
        .next("status and payload", |ctx| async move {
            ctx.assert("responds with 200").equals(ctx.status(), 200);
            ctx.assert("reports ok")
                .equals(ctx.json().unwrap()["status"].as_str(), Some("ok"));
            Ok(None)
        })
        .unwrap();

    let result = suite.run().await.unwrap();
    assert!(result.passed);
    assert_eq!(result.pass_count, 1);
    assert_eq!(result.fail_count, 0);
    assert!(suite.has_passed());
    assert!(scenario.has_passed());
}

#[tokio::test]
async fn failing_assertion_fails_suite_without_aborting() {
    let adapter = FakeAdapter::respond(404, "{}");
    let suite = suite_with("smoke", adapter);
    suite.set_base_url("https://api.example.test").unwrap();

    let scenario = suite.scenario("missing endpoint", ResponseType::Json).unwrap();
    scenario.open("/gone").unwrap();
    scenario
        .next("status", |ctx| async move {
            ctx.assert("responds with 200").equals(ctx.status(), 200);
            Ok(None)
        })
        .unwrap();

    let result = suite.run().await.unwrap();
    assert!(!result.passed);
    assert_eq!(result.fail_count, 1);
    // A failing assertion completes the scenario; it does not abort it.
    assert_eq!(
        scenario.disposition(),
        Some(Disposition::Completed { passed: false })
    );
}

#[tokio::test]
async fn concurrency_limit_bounds_parallel_fetches() {
    let adapter = FakeAdapter::slow(200, "{}", Duration::from_millis(100));
    let suite = suite_with("load", adapter.clone());
    suite.set_base_url("https://api.example.test").unwrap();
    suite.set_concurrency_limit(2).unwrap();

    for n in 0..3 {
        let scenario = suite
            .scenario(format!("probe {}", n), ResponseType::Json)
            .unwrap();
        scenario.open(format!("/probe/{}", n)).unwrap();
        scenario
            .next("", |ctx| async move {
                ctx.assert("responds with 200").equals(ctx.status(), 200);
                Ok(None)
            })
            .unwrap();
    }

    let result = suite.run().await.unwrap();
    assert!(result.passed);
    assert_eq!(result.pass_count, 3);
    assert_eq!(adapter.max_seen(), 2);
}

#[tokio::test]
async fn serial_suite_runs_one_scenario_at_a_time() {
    let adapter = FakeAdapter::slow(200, "{}", Duration::from_millis(50));
    let suite = suite_with("serial", adapter.clone());
    suite.set_base_url("https://api.example.test").unwrap();
    suite.set_concurrency_limit(1).unwrap();

    for n in 0..3 {
        let scenario = suite
            .scenario(format!("step {}", n), ResponseType::Json)
            .unwrap();
        scenario.open(format!("/step/{}", n)).unwrap();
        scenario
            .next("", |ctx| async move {
                ctx.assert("responds with 200").equals(ctx.status(), 200);
                Ok(None)
            })
            .unwrap();
    }

    let result = suite.run().await.unwrap();
    assert_eq!(result.pass_count, 3);
    assert_eq!(adapter.max_seen(), 1);
}

#[tokio::test]
async fn relative_targets_resolve_against_base_url() {
    let adapter = FakeAdapter::respond(200, "{}");
    let suite = suite_with("urls", adapter.clone());
    suite.set_base_url("https://example.test/v2/").unwrap();

    let scenario = suite.scenario("relative", ResponseType::Json).unwrap();
    scenario.open("health").unwrap();
    scenario
        .next("", |_ctx| async move { Ok(None) })
        .unwrap();

    suite.run().await.unwrap();
    assert_eq!(adapter.targets(), vec!["https://example.test/v2/health"]);
}

#[tokio::test]
async fn relative_target_without_base_url_aborts() {
    let adapter = FakeAdapter::respond(200, "{}");
    let suite = suite_with("urls", adapter.clone());

    let scenario = suite.scenario("orphan", ResponseType::Json).unwrap();
    scenario.open("/health").unwrap();
    scenario
        .next("", |_ctx| async move { Ok(None) })
        .unwrap();

    let result = suite.run().await.unwrap();
    assert!(!result.passed);
    assert_eq!(scenario.disposition(), Some(Disposition::Aborted));
    // The fetch was never dispatched.
    assert!(adapter.targets().is_empty());
}

#[tokio::test]
async fn step_results_carry_forward() {
    let adapter = FakeAdapter::respond(200, r#"{"token":"abc123"}"#);
    let suite = suite_with("chain", adapter);
    suite.set_base_url("https://example.test").unwrap();

    let scenario = suite.scenario("token flow", ResponseType::Json).unwrap();
    scenario.open("/login").unwrap();
    scenario
        .next("extract token", |ctx| async move {
            let token = ctx.json().unwrap()["token"].clone();
            Ok(Some(json!({ "token": token })))
        })
        .unwrap();
    scenario
        .next("use token", |ctx| async move {
            let carried = ctx.result().unwrap();
            ctx.assert("token was carried over")
                .equals(carried["token"].as_str(), Some("abc123"));
            Ok(None)
        })
        .unwrap();

    let result = suite.run().await.unwrap();
    assert!(result.passed, "log: {:?}", scenario.get_log());
}

#[tokio::test]
async fn prepended_steps_run_before_appended_ones() {
    let adapter = FakeAdapter::respond(200, "{}");
    let suite = suite_with("order", adapter);
    suite.set_base_url("https://example.test").unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let scenario = suite.scenario("ordering", ResponseType::Json).unwrap();
    scenario.open("/").unwrap();
    {
        let order = order.clone();
        scenario
            .next("appended", move |_ctx| async move {
                order.lock().unwrap().push("appended");
                Ok(None)
            })
            .unwrap();
    }
    {
        let order = order.clone();
        scenario
            .next_prepend("prepended", move |_ctx| async move {
                order.lock().unwrap().push("prepended");
                Ok(None)
            })
            .unwrap();
    }

    suite.run().await.unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["prepended", "appended"]);
}

#[tokio::test]
async fn skipped_scenario_is_excluded_from_aggregate() {
    let adapter = FakeAdapter::respond(200, "{}");
    let suite = suite_with("mixed", adapter);
    suite.set_base_url("https://example.test").unwrap();

    let kept = suite.scenario("kept", ResponseType::Json).unwrap();
    kept.open("/a").unwrap();
    kept.next("", |ctx| async move {
        ctx.assert("responds with 200").equals(ctx.status(), 200);
        Ok(None)
    })
    .unwrap();

    let skipped = suite.scenario("flaky upstream", ResponseType::Json).unwrap();
    skipped.open("/b").unwrap();
    skipped
        .next("", |_ctx| async move {
            panic!("skipped scenario must not execute its pipeline");
        })
        .unwrap();

    let finally_ran = Arc::new(AtomicUsize::new(0));
    {
        let finally_ran = finally_ran.clone();
        skipped
            .finally(move |_s| async move {
                finally_ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
    }

    skipped.skip(Some("upstream is down")).await.unwrap();

    let result = suite.run().await.unwrap();
    assert!(result.passed);
    assert_eq!(result.pass_count, 1);
    assert_eq!(result.fail_count, 0);
    assert_eq!(result.skip_count, 1);
    assert_eq!(skipped.disposition(), Some(Disposition::Skipped));
    assert_eq!(finally_ran.load(Ordering::SeqCst), 1);

    // The skip leaves a single comment and no pass/fail entries.
    let log = skipped.get_log();
    assert_eq!(log.len(), 1);
    assert_eq!(
        log[0],
        LogEntry::Comment("Skipped: upstream is down".into())
    );
}

#[tokio::test]
async fn scenario_watchdog_aborts_hung_fetch() {
    let mut registry = AdapterRegistry::empty();
    registry.register(ResponseType::Json, FakeAdapter::hanging());
    registry.register(ResponseType::Html, FakeAdapter::respond(200, "<html>"));
    let suite = Suite::new("watchdog", ExecutionContext::with_registry(registry));
    suite.set_base_url("https://example.test").unwrap();
    suite
        .set_max_scenario_duration(Duration::from_millis(100))
        .unwrap();

    let hung = suite.scenario("hangs forever", ResponseType::Json).unwrap();
    hung.open("/hang").unwrap();
    hung.next("", |_ctx| async move { Ok(None) }).unwrap();
    let finally_runs = Arc::new(AtomicUsize::new(0));
    {
        let finally_runs = finally_runs.clone();
        hung.finally(move |_s| async move {
            finally_runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    }

    let healthy = suite.scenario("healthy", ResponseType::Html).unwrap();
    healthy.open("/fast").unwrap();
    healthy
        .next("", |ctx| async move {
            ctx.assert("responds with 200").equals(ctx.status(), 200);
            Ok(None)
        })
        .unwrap();

    let result = suite.run().await.unwrap();
    assert!(!result.passed);
    assert_eq!(result.pass_count, 1);
    assert_eq!(result.fail_count, 1);
    assert_eq!(hung.disposition(), Some(Disposition::Aborted));

    let log = hung.get_log();
    let aborted = log
        .iter()
        .filter_map(LogEntry::result)
        .find(|r| r.counts_as_failure())
        .unwrap();
    assert!(
        aborted.message().contains("timed out"),
        "unexpected abort message: {}",
        aborted.message()
    );
    // finally fires exactly once on the forced-timeout path too.
    assert_eq!(finally_runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn registering_after_the_suite_finished_is_rejected() {
    let suite = suite_with("done", FakeAdapter::respond(200, "{}"));
    suite.set_base_url("https://example.test").unwrap();

    let scenario = suite.scenario("on time", ResponseType::Json).unwrap();
    scenario.open("/").unwrap();
    scenario.next("", |_ctx| async move { Ok(None) }).unwrap();
    suite.run().await.unwrap();

    let err = suite.scenario("too late", ResponseType::Json).unwrap_err();
    assert!(matches!(err, Error::SuiteAlreadyExecuted { .. }));
}

#[tokio::test]
async fn suite_watchdog_aborts_executing_and_queued_scenarios() {
    let adapter = FakeAdapter::hanging();
    let suite = suite_with("stuck", adapter);
    suite.set_base_url("https://example.test").unwrap();
    suite.set_concurrency_limit(1).unwrap();
    suite
        .set_max_suite_duration(Duration::from_millis(100))
        .unwrap();

    let executing = suite.scenario("executing", ResponseType::Json).unwrap();
    executing.open("/a").unwrap();
    executing.next("", |_ctx| async move { Ok(None) }).unwrap();

    let queued = suite.scenario("queued", ResponseType::Json).unwrap();
    queued.open("/b").unwrap();
    queued.next("", |_ctx| async move { Ok(None) }).unwrap();

    let result = suite.run().await.unwrap();
    assert!(!result.passed);
    assert_eq!(result.fail_count, 2);
    assert_eq!(executing.disposition(), Some(Disposition::Aborted));
    assert_eq!(queued.disposition(), Some(Disposition::Aborted));
}

#[tokio::test]
async fn execute_is_one_shot() {
    let suite = suite_with("once", FakeAdapter::respond(200, "{}"));
    suite.execute().unwrap();
    assert!(matches!(
        suite.execute(),
        Err(Error::SuiteAlreadyExecuted { .. })
    ));
    suite.finished().await;
}

#[tokio::test]
async fn pipeline_is_frozen_once_execution_starts() {
    let adapter = FakeAdapter::respond(200, "{}");
    let suite = suite_with("frozen", adapter);
    suite.set_base_url("https://example.test").unwrap();

    let scenario = suite.scenario("frozen", ResponseType::Json).unwrap();
    scenario.open("/").unwrap();
    scenario.next("", |_ctx| async move { Ok(None) }).unwrap();

    suite.run().await.unwrap();

    let err = scenario
        .next("late", |_ctx| async move { Ok(None) })
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExecuting { .. }));
    let err = scenario.before(|_s| async move { Ok(()) }).unwrap_err();
    assert!(matches!(err, Error::AlreadyExecuting { .. }));
}

#[tokio::test]
async fn target_assignment_is_one_shot() {
    let suite = suite_with("targets", FakeAdapter::respond(200, "{}"));
    let scenario = suite.scenario("double open", ResponseType::Json).unwrap();
    scenario.open("https://example.test/first").unwrap();

    let err = scenario.open("https://example.test/second").unwrap_err();
    assert!(matches!(err, Error::TargetAlreadySet { .. }));
    let err = scenario.mock("/tmp/fixture.json").unwrap_err();
    assert!(matches!(err, Error::TargetAlreadySet { .. }));
}

#[tokio::test]
async fn transport_fault_aborts_scenario_and_runs_error_hook() {
    let adapter = FakeAdapter::failing("connection refused");
    let suite = suite_with("faulty", adapter);
    suite.set_base_url("https://example.test").unwrap();

    let scenario = suite.scenario("unreachable", ResponseType::Json).unwrap();
    scenario.open("/down").unwrap();
    scenario
        .next("", |_ctx| async move {
            panic!("pipeline must not run after a transport fault");
        })
        .unwrap();

    let phases = Arc::new(Mutex::new(Vec::<&'static str>::new()));
    {
        let phases = phases.clone();
        scenario
            .error(move |_s| async move {
                phases.lock().unwrap().push("error");
                Ok(())
            })
            .unwrap();
    }
    {
        let phases = phases.clone();
        scenario
            .success(move |_s| async move {
                phases.lock().unwrap().push("success");
                Ok(())
            })
            .unwrap();
    }
    {
        let phases = phases.clone();
        scenario
            .finally(move |_s| async move {
                phases.lock().unwrap().push("finally");
                Ok(())
            })
            .unwrap();
    }

    let result = suite.run().await.unwrap();
    assert!(!result.passed);
    assert_eq!(scenario.disposition(), Some(Disposition::Aborted));
    assert_eq!(*phases.lock().unwrap(), vec!["error", "finally"]);

    let log = scenario.get_log();
    let aborted = log[0].result().unwrap();
    assert!(aborted.message().contains("connection refused"));
}

#[tokio::test]
async fn hooks_fire_in_documented_order() {
    let adapter = FakeAdapter::respond(200, "{}");
    let suite = suite_with("ordering", adapter);
    suite.set_base_url("https://example.test").unwrap();

    let seen = Arc::new(Mutex::new(Vec::<&'static str>::new()));
    let mark = |label: &'static str, seen: &Arc<Mutex<Vec<&'static str>>>| {
        let seen = seen.clone();
        move || seen.lock().unwrap().push(label)
    };

    {
        let m = mark("suite before_all", &seen);
        suite
            .before_all(move |_r| async move {
                m();
                Ok(())
            })
            .unwrap();
    }
    {
        let m = mark("suite after_all", &seen);
        suite
            .after_all(move |_r| async move {
                m();
                Ok(())
            })
            .unwrap();
    }
    {
        let m = mark("suite success", &seen);
        suite
            .success(move |_r| async move {
                m();
                Ok(())
            })
            .unwrap();
    }
    {
        let m = mark("suite finally", &seen);
        suite
            .finally(move |_r| async move {
                m();
                Ok(())
            })
            .unwrap();
    }
    {
        let seen = seen.clone();
        suite
            .before_each(move |_s| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push("suite before_each");
                    Ok(())
                }
            })
            .unwrap();
    }
    {
        let seen = seen.clone();
        suite
            .after_each(move |_s| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push("suite after_each");
                    Ok(())
                }
            })
            .unwrap();
    }

    let scenario = suite.scenario("only", ResponseType::Json).unwrap();
    scenario.open("/").unwrap();
    {
        let m = mark("step", &seen);
        scenario
            .next("", move |_ctx| async move {
                m();
                Ok(None)
            })
            .unwrap();
    }
    for (label, kind) in [
        ("scenario before", "before"),
        ("scenario after", "after"),
        ("scenario success", "success"),
        ("scenario finally", "finally"),
    ] {
        let m = mark(label, &seen);
        let hook = move |_s: Arc<flightcheck::Scenario>| async move {
            m();
            Ok(())
        };
        match kind {
            "before" => scenario.before(hook).unwrap(),
            "after" => scenario.after(hook).unwrap(),
            "success" => scenario.success(hook).unwrap(),
            _ => scenario.finally(hook).unwrap(),
        }
    }

    suite.run().await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "suite before_all",
            "suite before_each",
            "scenario before",
            "step",
            "scenario after",
            "suite after_each",
            "scenario success",
            "scenario finally",
            "suite after_all",
            "suite success",
            "suite finally",
        ]
    );
}

#[tokio::test]
async fn empty_suite_still_runs_completion_hooks() {
    let suite = suite_with("empty", FakeAdapter::respond(200, "{}"));

    let seen = Arc::new(Mutex::new(Vec::<&'static str>::new()));
    {
        let seen = seen.clone();
        suite
            .before_all(move |_r| async move {
                seen.lock().unwrap().push("before_all");
                Ok(())
            })
            .unwrap();
    }
    {
        let seen = seen.clone();
        suite
            .after_all(move |_r| async move {
                seen.lock().unwrap().push("after_all");
                Ok(())
            })
            .unwrap();
    }
    {
        let seen = seen.clone();
        suite
            .finally(move |_r| async move {
                seen.lock().unwrap().push("finally");
                Ok(())
            })
            .unwrap();
    }

    let result = suite.run().await.unwrap();
    assert!(result.passed);
    assert_eq!(result.pass_count, 0);
    // before_all is tied to first admission, so it never fires for an
    // empty suite; the completion-phase hooks still do.
    assert_eq!(*seen.lock().unwrap(), vec!["after_all", "finally"]);
}

#[tokio::test]
async fn mock_target_serves_a_local_file() {
    use std::io::Write;

    let mut fixture = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .unwrap();
    fixture.write_all(br#"{"mocked":true}"#).unwrap();

    let suite = Suite::new("mocked", ExecutionContext::new());
    let scenario = suite.scenario("local fixture", ResponseType::Json).unwrap();
    scenario.mock(fixture.path()).unwrap();
    scenario
        .next("fixture payload", |ctx| async move {
            ctx.assert("fixture flag is set")
                .equals(ctx.json().unwrap()["mocked"].as_bool(), Some(true));
            ctx.assert("mock fetches report 200").equals(ctx.status(), 200);
            Ok(None)
        })
        .unwrap();

    let result = suite.run().await.unwrap();
    assert!(result.passed, "log: {:?}", scenario.get_log());
}

#[tokio::test]
async fn step_fault_takes_the_aborted_path() {
    let adapter = FakeAdapter::respond(200, "{}");
    let suite = suite_with("faulting step", adapter);
    suite.set_base_url("https://example.test").unwrap();

    let scenario = suite.scenario("bad callback", ResponseType::Json).unwrap();
    scenario.open("/").unwrap();
    scenario
        .next("explodes", |_ctx| async move {
            Err(Error::Callback("fixture data missing".into()))
        })
        .unwrap();
    scenario
        .next("never reached", |ctx| async move {
            ctx.assert("must not run").that(false);
            Ok(None)
        })
        .unwrap();

    let result = suite.run().await.unwrap();
    assert!(!result.passed);
    assert_eq!(scenario.disposition(), Some(Disposition::Aborted));
    // Only the first step's label and the synthetic abort entry are logged.
    let log = scenario.get_log();
    assert_eq!(log[0], LogEntry::Comment("explodes".into()));
    assert!(log[1].result().unwrap().message().contains("fixture data missing"));
    assert_eq!(log.len(), 2);
}
