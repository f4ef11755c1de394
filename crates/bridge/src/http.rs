//! JSON-RPC over streamable HTTP.
//!
//! Each request is a POST; the provider answers either with a JSON body or
//! with a short `text/event-stream` whose `data:` lines carry the response.
//! A session id handed out during `initialize` is echoed on later requests.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::error::BridgeError;
use crate::jsonrpc::{self, Incoming, Notification, Request};
use crate::spec::{BridgeSpec, TransportSpec};
use crate::transport::{ProviderTransport, RemoteTool, parse_tools_page};

const SESSION_HEADER: &str = "Mcp-Session-Id";

pub struct HttpTransport {
    service: String,
    endpoint: String,
    client: reqwest::Client,
    session_id: Option<String>,
    timeout: Duration,
    next_id: u64,
}

impl HttpTransport {
    pub async fn connect(spec: &BridgeSpec) -> Result<Self, BridgeError> {
        let TransportSpec::Http { url, headers } = &spec.transport else {
            return Err(BridgeError::protocol("http transport needs a url"));
        };
        let connect_err = |reason: String| BridgeError::Connect {
            service: spec.name.clone(),
            reason,
        };

        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| connect_err(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| connect_err(format!("invalid value for header '{name}': {e}")))?;
            default_headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(spec.timeout)
            .build()
            .map_err(|e| connect_err(format!("failed to build HTTP client: {e}")))?;

        let mut transport = Self {
            service: spec.name.clone(),
            endpoint: url.clone(),
            client,
            session_id: None,
            timeout: spec.timeout,
            next_id: 0,
        };

        transport
            .request("initialize", Some(jsonrpc::initialize_params()))
            .await
            .map_err(|e| connect_err(format!("initialize failed: {e}")))?;
        let initialized = serde_json::to_value(Notification::new("notifications/initialized"))
            .map_err(|e| connect_err(e.to_string()))?;
        transport
            .post(&initialized)
            .await
            .map_err(|e| connect_err(e.to_string()))?;

        debug!(service = %transport.service, session = ?transport.session_id, "Tool provider initialized");
        Ok(transport)
    }

    async fn post(&mut self, body: &Value) -> Result<reqwest::Response, BridgeError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = &self.session_id {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::timeout(&self.service, self.timeout)
            } else {
                BridgeError::Io(e.to_string())
            }
        })?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(session.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::protocol(format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
        self.next_id += 1;
        let id = self.next_id;
        let body = serde_json::to_value(Request::new(id, method, params))
            .map_err(|e| BridgeError::protocol(e.to_string()))?;

        let response = self.post(&body).await?;
        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let text = response
            .text()
            .await
            .map_err(|e| BridgeError::Io(e.to_string()))?;

        decode_body(&text, is_sse, id)
    }
}

/// Find the response to `id` in a JSON or event-stream body.
fn decode_body(text: &str, is_sse: bool, id: u64) -> Result<Value, BridgeError> {
    if !is_sse {
        let incoming: Incoming = serde_json::from_str(text)
            .map_err(|e| BridgeError::protocol(format!("malformed response: {e}")))?;
        return incoming.into_result();
    }

    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<Incoming>(data.trim()).ok())
        .find(|incoming| incoming.answers(id))
        .ok_or_else(|| BridgeError::protocol("event stream ended without a response"))?
        .into_result()
}

#[async_trait]
impl ProviderTransport for HttpTransport {
    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>, BridgeError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let (page, next) = parse_tools_page(self.request("tools/list", params).await?)?;
            tools.extend(page);
            match next {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value, BridgeError> {
        self.request(
            "tools/call",
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        let Some(session) = self.session_id.take() else {
            return Ok(());
        };
        self.client
            .delete(&self.endpoint)
            .header(SESSION_HEADER, session)
            .send()
            .await
            .map_err(|e| BridgeError::Io(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body() {
        let value = decode_body(r#"{"jsonrpc":"2.0","id":2,"result":{"ok":true}}"#, false, 2).unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn event_stream_body_skips_notifications() {
        let body = "event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n\
                    event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":5,\"result\":{\"tools\":[]}}\n\n";
        let value = decode_body(body, true, 5).unwrap();
        assert!(value["tools"].as_array().unwrap().is_empty());
    }

    #[test]
    fn event_stream_without_answer() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n";
        assert!(matches!(decode_body(body, true, 9), Err(BridgeError::Protocol(_))));
    }

    #[test]
    fn garbage_json_body() {
        assert!(decode_body("<html>", false, 1).is_err());
    }
}
