//! Client for OpenAI-compatible completion APIs.

use std::time::{Duration, Instant};

use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};

use crate::error::{Error, Result};
use crate::observability;
use crate::sse::{self, ChunkStream};
use crate::stats::{Pricing, RequestStats, StatsHandle};
use crate::types::{ChatCompletion, ChatRequest, Message};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Capability interface over chat-completion backends.
///
/// The interaction controller talks to a `Box<dyn Provider>`, so alternate
/// backends can be added without touching it.
#[async_trait::async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Sends the full conversation and returns the complete reply with its
    /// request stats.
    async fn chat(&self, messages: &[Message]) -> Result<(String, RequestStats)>;

    /// Sends the full conversation and returns a lazy chunk sequence plus a
    /// stats handle.  The stats record is safe to read once the terminal
    /// chunk has been observed.
    async fn start_stream(&self, messages: &[Message]) -> Result<(ChunkStream, StatsHandle)>;

    /// Returns the current model.
    fn model(&self) -> &str;

    /// Sets the model.
    fn set_model(&mut self, model: String);

    /// Returns the current sampling temperature.
    fn temperature(&self) -> f64;

    /// Sets the sampling temperature.
    fn set_temperature(&mut self, temperature: f64);
}

/// Client for an OpenAI-compatible completion endpoint.
#[derive(Debug, Clone)]
pub struct OpenAi {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    pricing: Option<Pricing>,
    client: ReqwestClient,
    timeout: Duration,
}

impl OpenAi {
    /// Creates a new client.
    ///
    /// A trailing slash on `base_url` is stripped so request paths can be
    /// appended uniformly.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<Self> {
        let timeout = DEFAULT_TIMEOUT;
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(format!("Failed to build HTTP client: {e}"), Some(Box::new(e)))
            })?;

        let base_url = base_url.into();
        url::Url::parse(&base_url)?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            temperature,
            max_tokens: max_tokens.max(1),
            pricing: None,
            client,
            timeout,
        })
    }

    /// Sets the pricing used to derive per-request cost estimates.
    pub fn with_pricing(mut self, pricing: Option<Pricing>) -> Self {
        self.pricing = pricing;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let bearer = format!("Bearer {}", self.api_key);
        let authorization = HeaderValue::from_str(&bearer)
            .map_err(|_| Error::authentication("API key contains invalid header characters"))?;
        headers.insert(header::AUTHORIZATION, authorization);
        Ok(headers)
    }

    fn request_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::timeout(
                format!("Request timed out: {err}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if err.is_connect() {
            Error::connection(format!("Connection error: {err}"), Some(Box::new(err)))
        } else {
            Error::http_client(format!("Request failed: {err}"), Some(Box::new(err)))
        }
    }

    /// Converts a non-2xx response into an API error carrying the body.
    async fn process_error_response(response: Response) -> Error {
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => format!("(failed to read error body: {e})"),
        };
        Error::api(status, body)
    }

    async fn dispatch(&self, messages: &[Message], stream: bool) -> Result<Response> {
        observability::CLIENT_REQUESTS.click();
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        };

        let mut headers = self.default_headers()?;
        if stream {
            headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        } else {
            headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        }

        let response = self
            .client
            .post(self.completions_url())
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                observability::CLIENT_REQUEST_ERRORS.click();
                self.request_error(e)
            })?;

        if !response.status().is_success() {
            observability::CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Provider for OpenAi {
    async fn chat(&self, messages: &[Message]) -> Result<(String, RequestStats)> {
        let mut stats = RequestStats::new(&self.model);
        let response = self.dispatch(messages, false).await?;
        stats.record_status(response.status().as_u16());

        let completion: ChatCompletion = response.json().await.map_err(|e| {
            Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
        })?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::unknown("no choices in response"))?;

        stats.record_usage(completion.usage);
        stats.finalize(Instant::now(), self.pricing);
        Ok((choice.message.content, stats))
    }

    async fn start_stream(&self, messages: &[Message]) -> Result<(ChunkStream, StatsHandle)> {
        let stats = StatsHandle::new(RequestStats::new(&self.model));
        let response = self.dispatch(messages, true).await?;
        let status = response.status().as_u16();
        stats.update(|stats| stats.record_status(status));

        let byte_stream = response.bytes_stream().map(|result| {
            result.map_err(|e| {
                Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
            })
        });

        let chunks = sse::spawn_stream(byte_stream, stats.clone(), self.pricing);
        Ok((chunks, stats))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: String) {
        self.model = model;
    }

    fn temperature(&self) -> f64 {
        self.temperature
    }

    fn set_temperature(&mut self, temperature: f64) {
        self.temperature = temperature;
    }
}
