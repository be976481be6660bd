use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::EngineError;
use crate::transport::{HttpReply, HttpRequest, Method, Transport, TransportFailure};

/// Per-call timeout classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Upload intents, parameter checks, polls.
    pub metadata: Duration,
    pub submission: Duration,
    /// Byte transfers: upload writes and result downloads.
    pub transfer: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            metadata: Duration::from_secs(30),
            submission: Duration::from_secs(300),
            transfer: Duration::from_secs(300),
        }
    }
}

/// Authenticated JSON client for the imaging service.
#[derive(Clone)]
pub struct ServiceClient {
    api_base: String,
    api_token: String,
    transport: Arc<dyn Transport>,
    timeouts: Timeouts,
}

impl ServiceClient {
    pub fn new(
        api_base: &str,
        api_token: impl Into<String>,
        transport: Arc<dyn Transport>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            transport,
            timeouts,
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        timeout: Duration,
        context: &str,
    ) -> Result<HttpReply, EngineError> {
        let payload = serde_json::to_vec(body).map_err(|err| EngineError::Transport {
            context: context.to_string(),
            status: None,
            message: format!("request body could not be encoded: {err}"),
        })?;
        let request = self
            .authorized(HttpRequest::new(Method::Post, self.endpoint(path), timeout))
            .body(payload);
        self.send(request, context)
    }

    pub fn get_json(
        &self,
        path: &str,
        timeout: Duration,
        context: &str,
    ) -> Result<HttpReply, EngineError> {
        let request = self.authorized(HttpRequest::new(Method::Get, self.endpoint(path), timeout));
        self.send(request, context)
    }

    /// Writes raw bytes to a pre-signed URL. No service credentials are attached.
    pub fn put_bytes(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        bytes: Vec<u8>,
        context: &str,
    ) -> Result<HttpReply, EngineError> {
        let mut request = HttpRequest::new(Method::Put, url, self.timeouts.transfer);
        request.headers = headers;
        self.send(request.body(bytes), context)
    }

    /// Fetches a result image by its public URL.
    pub fn download(&self, url: &str, context: &str) -> Result<Vec<u8>, EngineError> {
        let request = HttpRequest::new(Method::Get, url, self.timeouts.transfer);
        let reply = self.send(request, context)?;
        if !reply.is_success() {
            return Err(status_error(context, &reply));
        }
        Ok(reply.body)
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        request
            .header("Authorization", format!("Bearer {}", self.api_token))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
    }

    fn send(&self, request: HttpRequest, context: &str) -> Result<HttpReply, EngineError> {
        debug!(
            method = request.method.as_str(),
            url = %request.url,
            timeout_s = request.timeout.as_secs(),
            "{context}"
        );
        self.transport
            .execute(request)
            .map_err(|failure: TransportFailure| EngineError::Transport {
                context: context.to_string(),
                status: None,
                message: failure.message,
            })
    }
}

pub(crate) fn parse_json<T: DeserializeOwned>(
    reply: &HttpReply,
    context: &str,
) -> Result<T, EngineError> {
    serde_json::from_slice(&reply.body).map_err(|err| EngineError::Transport {
        context: context.to_string(),
        status: Some(reply.status),
        message: format!(
            "invalid JSON payload ({err}): {}",
            truncate_text(&reply.text(), 512)
        ),
    })
}

pub(crate) fn status_error(context: &str, reply: &HttpReply) -> EngineError {
    EngineError::Transport {
        context: context.to_string(),
        status: Some(reply.status),
        message: format!(
            "request failed ({}): {}",
            reply.status,
            truncate_text(&reply.text(), 512)
        ),
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
