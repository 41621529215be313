//! Mock implementations for testing.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::domain::{Endpoint, RpcError, RpcRequest, RpcTransport};
use crate::infra::blockchain::rpc::classify_protocol;

/// Scripted answer for one mocked RPC call.
#[derive(Debug, Clone)]
pub enum MockReply {
    Ok(serde_json::Value),
    Transport { transient: bool },
    Protocol { code: i64, message: String },
}

impl MockReply {
    #[must_use]
    pub fn ok(value: serde_json::Value) -> Self {
        Self::Ok(value)
    }

    #[must_use]
    pub fn transport(transient: bool) -> Self {
        Self::Transport { transient }
    }

    #[must_use]
    pub fn protocol(code: i64, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    fn resolve(&self, endpoint: &Endpoint) -> Result<serde_json::Value, RpcError> {
        match self {
            Self::Ok(value) => Ok(value.clone()),
            Self::Transport { transient } => Err(RpcError::Transport {
                endpoint: endpoint.label(),
                message: "connection refused".to_string(),
                transient: *transient,
            }),
            Self::Protocol { code, message } => {
                Err(classify_protocol(endpoint, Some(*code), message.clone()))
            }
        }
    }
}

/// One call as seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: String,
    pub method: String,
    pub params: serde_json::Value,
    pub id: u64,
}

#[derive(Debug)]
struct Rule {
    endpoint: String,
    method: String,
    param: Option<String>,
    reply: MockReply,
    once: bool,
    spent: bool,
}

impl Rule {
    fn matches(&self, endpoint: &str, request: &RpcRequest) -> bool {
        !self.spent
            && self.endpoint == endpoint
            && self.method == request.method
            && self
                .param
                .as_ref()
                .is_none_or(|needle| request.params.to_string().contains(needle.as_str()))
    }
}

/// Scripted [`RpcTransport`]. Rules are matched in insertion order; a call
/// with no matching rule fails with a permanent transport error.
#[derive(Debug, Default)]
pub struct MockTransport {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `method` call at `url` with `reply`.
    #[must_use]
    pub fn reply(self, url: &str, method: &str, reply: MockReply) -> Self {
        self.push(url, method, None, reply, false)
    }

    /// Answer only calls whose serialized params contain `param`.
    #[must_use]
    pub fn reply_matching(self, url: &str, method: &str, param: &str, reply: MockReply) -> Self {
        self.push(url, method, Some(param.to_string()), reply, false)
    }

    /// Answer the next matching call only; later calls fall through to other rules.
    #[must_use]
    pub fn reply_once(self, url: &str, method: &str, reply: MockReply) -> Self {
        self.push(url, method, None, reply, true)
    }

    fn push(
        self,
        url: &str,
        method: &str,
        param: Option<String>,
        reply: MockReply,
        once: bool,
    ) -> Self {
        self.rules.lock().unwrap().push(Rule {
            endpoint: normalize(url),
            method: method.to_string(),
            param,
            reply,
            once,
            spent: false,
        });
        self
    }

    /// All calls received, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls of a single method, in order.
    pub fn calls_for(&self, method: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Endpoint labels in call order.
    pub fn endpoints_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.endpoint).collect()
    }
}

fn normalize(url: &str) -> String {
    Endpoint::parse(0, url)
        .map(|endpoint| endpoint.label())
        .unwrap_or_else(|_| url.to_string())
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn call(
        &self,
        endpoint: &Endpoint,
        request: &RpcRequest,
    ) -> Result<serde_json::Value, RpcError> {
        let label = endpoint.label();
        self.calls.lock().unwrap().push(RecordedCall {
            endpoint: label.clone(),
            method: request.method.clone(),
            params: request.params.clone(),
            id: request.id,
        });

        let mut rules = self.rules.lock().unwrap();
        match rules.iter_mut().find(|rule| rule.matches(&label, request)) {
            Some(rule) => {
                if rule.once {
                    rule.spent = true;
                }
                rule.reply.resolve(endpoint)
            }
            None => Err(RpcError::Transport {
                endpoint: label,
                message: format!("no mock reply for {}", request.method),
                transient: false,
            }),
        }
    }
}
