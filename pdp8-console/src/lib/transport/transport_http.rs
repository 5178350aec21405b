use log::{debug, trace};
use std::time::Duration;
use ureq::{Agent, AgentBuilder};

use super::transport_interface::*;
use crate::error::{ConsoleError, ConsoleResult};

/// A transport that talks plain HTTP to the simulator service.
pub struct HttpTransport {
    agent: Agent,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the service at `base_url`. Every request is
    /// abandoned after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = AgentBuilder::new().timeout(timeout).build();
        HttpTransport {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> ConsoleResult<String> {
        let url = format!("{}{}", self.base_url, request.path);
        trace!("{} {}", request.method.as_str(), url);
        let builder = self.agent.request(request.method.as_str(), &url);
        let result = match &request.body {
            Body::Empty => builder.call(),
            Body::Json(value) => builder
                .set("Content-Type", "application/json")
                .send_string(&value.to_string()),
            Body::Text(text) => builder
                .set("Content-Type", "text/plain")
                .send_string(text),
            Body::Bytes(bytes) => builder
                .set("Content-Type", "text/plain")
                .send_bytes(bytes),
        };

        match result {
            Ok(response) => response
                .into_string()
                .map_err(|e| ConsoleError::Transport(e.to_string())),
            Err(ureq::Error::Status(code, response)) => {
                let status_text = response.status_text().to_string();
                let body = response.into_string().unwrap_or_default();
                debug!("{} rejected with {}: {}", request, code, body.trim());
                if body.trim().is_empty() {
                    Err(ConsoleError::ServerRejected(
                        format!("{} {}", code, status_text)))
                } else {
                    Err(ConsoleError::ServerRejected(body))
                }
            }
            Err(ureq::Error::Transport(e)) => Err(ConsoleError::Transport(e.to_string())),
        }
    }
}
