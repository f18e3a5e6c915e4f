use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, STREAM_CHUNKS};
use crate::sse::process_sse;
use crate::types::{ChatCompletionChunk, ChatCompletionRequest, Credential};

const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/";
const CHAT_COMPLETIONS_PATH: &str = "chat/completions";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variable holding the default credential.
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

/// A boxed stream of decoded chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// The remote capability the completion reducer talks to.
///
/// [`Groq`] is the production implementation; tests substitute scripted
/// backends.
#[async_trait::async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Open a streaming chat completion.
    ///
    /// Resolves once the server has accepted the request; the returned stream
    /// then yields chunks until the completion ends.
    async fn stream(
        &self,
        credential: &Credential,
        request: ChatCompletionRequest,
    ) -> Result<ChunkStream>;
}

/// Client for the Groq chat-completions API.
#[derive(Clone)]
pub struct Groq {
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl Groq {
    /// Create a new client against the public endpoint.
    pub fn new() -> Result<Self> {
        Self::with_options(None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(base_url: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)?;

        Ok(Self {
            client,
            base_url,
            timeout,
            logger: None,
        })
    }

    /// Attach a logger that sees every request and streamed chunk.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Create the headers for a streaming request.
    fn default_headers(&self, credential: &Credential) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
            .map_err(|_| {
                Error::authentication("API key contains characters not allowed in a header")
            })?;
        bearer.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status = response.status();
        let status_code = status.as_u16();

        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|val| val.to_str().ok())
            .map(String::from);

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        error_from_status(status_code, &error_body, request_id, retry_after)
    }

    fn log_error(&self, error: &Error) {
        CLIENT_REQUEST_ERRORS.click();
        if let Some(logger) = &self.logger {
            logger.log_stream_error(error);
        }
    }
}

/// Map an HTTP status and body to the matching error.
///
/// The body is parsed as an OpenAI-style `{"error": {...}}` object when
/// possible and used verbatim otherwise.
fn error_from_status(
    status_code: u16,
    error_body: &str,
    request_id: Option<String>,
    retry_after: Option<u64>,
) -> Error {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
        param: Option<String>,
    }

    let detail = serde_json::from_str::<ErrorResponse>(error_body)
        .ok()
        .and_then(|e| e.error);
    let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
    let error_message = detail
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| error_body.to_string());
    let error_param = detail.as_ref().and_then(|e| e.param.clone());

    match status_code {
        400 | 422 => Error::bad_request(error_message, error_param),
        401 => Error::authentication(error_message),
        403 => Error::permission(error_message),
        404 => Error::not_found(error_message),
        408 => Error::timeout(error_message, None),
        429 => Error::rate_limit(error_message, retry_after),
        500 => Error::internal_server(error_message, request_id),
        502..=504 => Error::service_unavailable(error_message, retry_after),
        _ => Error::api(status_code, error_type, error_message, request_id),
    }
}

/// Counts and logs every chunk as it passes, logging the folded text once the
/// stream ends cleanly.
fn observe_chunks(chunks: ChunkStream, logger: Option<Arc<dyn ClientLogger>>) -> ChunkStream {
    let stream = futures::stream::unfold(
        Some((chunks, String::new())),
        move |state| {
            let logger = logger.clone();
            async move {
                let (mut chunks, mut text) = state?;
                match chunks.next().await {
                    Some(Ok(chunk)) => {
                        STREAM_CHUNKS.click();
                        if let Some(fragment) = chunk.fragment() {
                            text.push_str(fragment);
                        }
                        if let Some(logger) = &logger {
                            logger.log_stream_chunk(&chunk);
                        }
                        Some((Ok(chunk), Some((chunks, text))))
                    }
                    Some(Err(err)) => {
                        CLIENT_REQUEST_ERRORS.click();
                        if let Some(logger) = &logger {
                            logger.log_stream_error(&err);
                        }
                        Some((Err(err), None))
                    }
                    None => {
                        if let Some(logger) = &logger {
                            logger.log_stream_complete(&text);
                        }
                        None
                    }
                }
            }
        },
    );
    Box::pin(stream)
}

#[async_trait::async_trait]
impl CompletionBackend for Groq {
    async fn stream(
        &self,
        credential: &Credential,
        mut request: ChatCompletionRequest,
    ) -> Result<ChunkStream> {
        request.stream = true;
        if credential.is_empty() {
            return Err(Error::MissingCredential);
        }

        let url = self.base_url.join(CHAT_COMPLETIONS_PATH)?;
        let headers = self.default_headers(credential)?;

        if let Some(logger) = &self.logger {
            logger.log_request(&request);
        }
        CLIENT_REQUESTS.click();

        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {e}"),
                        Some(self.timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            });
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                self.log_error(&err);
                return Err(err);
            }
        };

        if !response.status().is_success() {
            let err = Self::process_error_response(response).await;
            self.log_error(&err);
            return Err(err);
        }

        let chunks = observe_chunks(
            Box::pin(process_sse(response.bytes_stream())),
            self.logger.clone(),
        );
        Ok(chunks)
    }
}
