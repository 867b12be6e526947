// Scripted backend — replays queued replies instead of calling a model
//
// Used by the test suites. Replies are consumed in order, one queue per call
// kind; every request is recorded for inspection.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::{
    strip_markdown_fences, BackendError, GenerativeBackend, ImageData, ReasonOutput,
    ReasonRequest, RenderRequest,
};

/// One queued reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Json(serde_json::Value),
    Image(ImageData),
    Fail(BackendError),
    /// Sleep for the given duration, then fail as unavailable
    Stall(Duration),
}

#[derive(Default)]
pub struct ScriptedBackend {
    reason_queue: Mutex<VecDeque<ScriptedReply>>,
    render_queue: Mutex<VecDeque<ScriptedReply>>,
    reason_log: Mutex<Vec<ReasonRequest>>,
    render_log: Mutex<Vec<RenderRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next `reason` call.
    pub fn push_reason(&self, reply: ScriptedReply) -> &Self {
        lock(&self.reason_queue).push_back(reply);
        self
    }

    /// Queue a reply for the next `render` call.
    pub fn push_render(&self, reply: ScriptedReply) -> &Self {
        lock(&self.render_queue).push_back(reply);
        self
    }

    /// Requests received by `reason`, oldest first.
    pub fn reason_requests(&self) -> Vec<ReasonRequest> {
        lock(&self.reason_log).clone()
    }

    /// Requests received by `render`, oldest first.
    pub fn render_requests(&self) -> Vec<RenderRequest> {
        lock(&self.render_log).clone()
    }

    pub fn pending_reason(&self) -> usize {
        lock(&self.reason_queue).len()
    }

    pub fn pending_render(&self) -> usize {
        lock(&self.render_queue).len()
    }
}

// A poisoned lock only means another test thread panicked mid-push; the
// queue contents are still usable.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn reason(&self, request: &ReasonRequest) -> Result<ReasonOutput, BackendError> {
        lock(&self.reason_log).push(request.clone());
        let reply = lock(&self.reason_queue).pop_front();

        match reply {
            Some(ScriptedReply::Json(value)) => {
                if request.expects_structured() {
                    Ok(ReasonOutput::Structured(value))
                } else {
                    Ok(ReasonOutput::Text(value.to_string()))
                }
            }
            Some(ScriptedReply::Text(text)) => {
                if request.expects_structured() {
                    serde_json::from_str(strip_markdown_fences(&text))
                        .map(ReasonOutput::Structured)
                        .map_err(|e| BackendError::SchemaMismatch(e.to_string()))
                } else {
                    Ok(ReasonOutput::Text(text))
                }
            }
            Some(ScriptedReply::Image(_)) => Err(BackendError::rejected(
                "scripted image reply queued for a reason call",
            )),
            Some(ScriptedReply::Fail(e)) => Err(e),
            Some(ScriptedReply::Stall(d)) => {
                tokio::time::sleep(d).await;
                Err(BackendError::unavailable("scripted stall elapsed"))
            }
            None => Err(BackendError::rejected("no scripted reason reply left")),
        }
    }

    async fn render(&self, request: &RenderRequest) -> Result<ImageData, BackendError> {
        lock(&self.render_log).push(request.clone());
        let reply = lock(&self.render_queue).pop_front();

        match reply {
            Some(ScriptedReply::Image(image)) => Ok(image),
            Some(ScriptedReply::Fail(e)) => Err(e),
            Some(ScriptedReply::Stall(d)) => {
                tokio::time::sleep(d).await;
                Err(BackendError::unavailable("scripted stall elapsed"))
            }
            Some(_) => Err(BackendError::rejected(
                "scripted text reply queued for a render call",
            )),
            None => Err(BackendError::rejected("no scripted render reply left")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_and_records_requests() {
        let backend = ScriptedBackend::new();
        backend
            .push_reason(ScriptedReply::Text("first".into()))
            .push_reason(ScriptedReply::Text("second".into()));

        let a = backend.reason(&ReasonRequest::new("a")).await.unwrap();
        let b = backend.reason(&ReasonRequest::new("b")).await.unwrap();
        assert_eq!(a, ReasonOutput::Text("first".into()));
        assert_eq!(b, ReasonOutput::Text("second".into()));
        assert_eq!(backend.reason_requests().len(), 2);
        assert_eq!(backend.reason_requests()[1].text_inputs[0], "b");
    }

    #[tokio::test]
    async fn test_structured_request_parses_fenced_text() {
        let backend = ScriptedBackend::new();
        backend.push_reason(ScriptedReply::Text("```json\n{\"k\": 1}\n```".into()));
        let request = ReasonRequest::new("q").with_schema(serde_json::json!({}));
        let out = backend.reason(&request).await.unwrap();
        assert_eq!(out, ReasonOutput::Structured(serde_json::json!({"k": 1})));
    }

    #[tokio::test]
    async fn test_structured_request_rejects_prose() {
        let backend = ScriptedBackend::new();
        backend.push_reason(ScriptedReply::Text("sure, here you go".into()));
        let request = ReasonRequest::new("q").with_schema(serde_json::json!({}));
        let err = backend.reason(&request).await.unwrap_err();
        assert!(matches!(err, BackendError::SchemaMismatch(_)));
    }

    #[tokio::test]
    async fn test_exhausted_script_is_not_transient() {
        let backend = ScriptedBackend::new();
        let err = backend
            .render(&RenderRequest::new("x", Default::default()))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
