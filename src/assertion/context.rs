//! Assertion context handed to each pipeline step
//!
//! The context wraps the normalized fetch result in a type-specific document
//! view, exposes the previous step's return value, and forwards every
//! assertion outcome into the owning scenario's log as it occurs.
//!
//! The context is a cheap handle over shared state, so each pipeline step
//! receives its own clone and can move it into an async block.

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::adapter::{NormalizedResponse, ResponseType};
use crate::common::{Error, Result};

use super::result::{AssertionResult, ScenarioLog};

/// Type-specific view of a response body, produced once per scenario
#[derive(Debug)]
pub enum ResponseDocument {
    /// Raw bytes, no decoding
    Raw,
    /// Text document (HTML, XML)
    Text(String),
    /// Parsed JSON
    Json(Value),
    /// Image metadata; pixel data stays in the raw body
    Image { content_type: String, byte_len: usize },
}

impl ResponseDocument {
    /// Wrap a normalized response according to the scenario's response type.
    ///
    /// A body that cannot be parsed as the declared type is a fault, not an
    /// assertion failure: the scenario takes the Aborted path.
    pub(crate) fn wrap(
        response_type: ResponseType,
        response: &NormalizedResponse,
    ) -> Result<Self> {
        match response_type {
            ResponseType::Resource => Ok(Self::Raw),
            ResponseType::Html | ResponseType::Xml => {
                Ok(Self::Text(response.body_text().into_owned()))
            }
            ResponseType::Json => serde_json::from_slice(&response.body)
                .map(Self::Json)
                .map_err(|e| Error::response_parse("json", e)),
            ResponseType::Image => Ok(Self::Image {
                content_type: response
                    .header("content-type")
                    .unwrap_or_default()
                    .to_string(),
                byte_len: response.body.len(),
            }),
        }
    }
}

struct ContextShared {
    scenario_title: String,
    response: NormalizedResponse,
    document: ResponseDocument,
    log: Arc<Mutex<ScenarioLog>>,
    /// Return value of the previous step, if any
    result: Mutex<Option<Value>>,
}

/// Per-scenario context passed to every pipeline step
#[derive(Clone)]
pub struct AssertionContext {
    shared: Arc<ContextShared>,
}

impl AssertionContext {
    pub(crate) fn new(
        scenario_title: String,
        response: NormalizedResponse,
        document: ResponseDocument,
        log: Arc<Mutex<ScenarioLog>>,
    ) -> Self {
        Self {
            shared: Arc::new(ContextShared {
                scenario_title,
                response,
                document,
                log,
                result: Mutex::new(None),
            }),
        }
    }

    pub fn scenario_title(&self) -> &str {
        &self.shared.scenario_title
    }

    pub fn response(&self) -> &NormalizedResponse {
        &self.shared.response
    }

    pub fn status(&self) -> u16 {
        self.shared.response.status
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        self.shared.response.body_text()
    }

    /// Parsed JSON document, when the scenario's response type is JSON
    pub fn json(&self) -> Option<&Value> {
        match &self.shared.document {
            ResponseDocument::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn document(&self) -> &ResponseDocument {
        &self.shared.document
    }

    /// Return value of the previous pipeline step (accumulator pattern)
    pub fn result(&self) -> Option<Value> {
        self.shared.result.lock().unwrap().clone()
    }

    pub(crate) fn set_result(&self, value: Option<Value>) {
        *self.shared.result.lock().unwrap() = value;
    }

    /// Append a free-form comment to the scenario log
    pub fn comment(&self, text: impl Into<String>) {
        self.shared.log.lock().unwrap().comment(text);
    }

    /// Record an assertion outcome in the scenario log
    pub fn log_result(&self, result: AssertionResult) {
        self.shared.log.lock().unwrap().log_result(result);
    }

    /// Start a fluent assertion
    pub fn assert(&self, message: impl Into<String>) -> Assertion<'_> {
        Assertion {
            ctx: self,
            message: message.into(),
            optional: false,
        }
    }
}

impl fmt::Debug for AssertionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssertionContext")
            .field("scenario", &self.shared.scenario_title)
            .field("status", &self.shared.response.status)
            .finish()
    }
}

/// Fluent assertion builder; each terminal method logs exactly one result
/// and returns whether it passed
#[must_use = "an assertion does nothing until a terminal method is called"]
pub struct Assertion<'c> {
    ctx: &'c AssertionContext,
    message: String,
    optional: bool,
}

impl<'c> Assertion<'c> {
    /// Mark the outcome informational: a failure is logged but excluded
    /// from pass/fail determination
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn record(self, passed: bool, details: Option<String>) -> bool {
        let mut result = if passed {
            AssertionResult::pass(self.message)
        } else if self.optional {
            AssertionResult::fail_optional(self.message)
        } else {
            AssertionResult::fail(self.message)
        };
        if let Some(details) = details {
            result = result.with_details(details);
        }
        self.ctx.log_result(result);
        passed
    }

    /// Assert an arbitrary condition
    pub fn that(self, condition: bool) -> bool {
        self.record(condition, None)
    }

    /// Assert equality, logging expected/actual detail on failure
    pub fn equals<T: PartialEq + fmt::Debug>(self, actual: T, expected: T) -> bool {
        let passed = actual == expected;
        let details =
            (!passed).then(|| format!("expected {:?}, got {:?}", expected, actual));
        self.record(passed, details)
    }

    /// Assert that `haystack` contains `needle`
    pub fn contains(self, haystack: &str, needle: &str) -> bool {
        let passed = haystack.contains(needle);
        let details = (!passed).then(|| format!("'{}' not found", needle));
        self.record(passed, details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn context_with(body: &str, response_type: ResponseType) -> AssertionContext {
        let response = NormalizedResponse {
            status: 200,
            headers: vec![("content-type".into(), "application/json".into())],
            body: body.as_bytes().to_vec(),
            final_url: None,
            duration: Duration::from_millis(5),
        };
        let document = ResponseDocument::wrap(response_type, &response).unwrap();
        AssertionContext::new(
            "test".into(),
            response,
            document,
            Arc::new(Mutex::new(ScenarioLog::new())),
        )
    }

    #[test]
    fn fluent_terminals_log_one_result_each() {
        let ctx = context_with("hello world", ResponseType::Html);
        assert!(ctx.assert("status ok").equals(ctx.status(), 200));
        assert!(!ctx.assert("greets mars").contains("hello world", "mars"));
        assert!(!ctx.assert("nonblocking check").optional().that(false));

        let log = ctx.shared.log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log.pass_count(), 1);
        // The optional failure is excluded from the failure count.
        assert_eq!(log.fail_count(), 1);
    }

    #[test]
    fn json_document_is_parsed_once() {
        let ctx = context_with(r#"{"count": 3}"#, ResponseType::Json);
        assert_eq!(ctx.json().unwrap()["count"], 3);
    }

    #[test]
    fn result_carry_over_is_shared_across_clones() {
        let ctx = context_with("{}", ResponseType::Json);
        let clone = ctx.clone();
        ctx.set_result(Some(serde_json::json!(41)));
        assert_eq!(clone.result(), Some(serde_json::json!(41)));
    }

    #[test]
    fn invalid_json_is_a_parse_fault() {
        let response = NormalizedResponse {
            status: 200,
            headers: Vec::new(),
            body: b"not json".to_vec(),
            final_url: None,
            duration: Duration::ZERO,
        };
        let err = ResponseDocument::wrap(ResponseType::Json, &response).unwrap_err();
        assert!(matches!(err, Error::ResponseParse { .. }));
    }

    #[test]
    fn equality_failure_carries_detail() {
        let ctx = context_with("", ResponseType::Resource);
        ctx.assert("status equals 200").equals(404u16, 200u16);
        let log = ctx.shared.log.lock().unwrap();
        let result = log.entries()[0].result().unwrap();
        assert_eq!(result.details(), Some("expected 200, got 404"));
    }
}
