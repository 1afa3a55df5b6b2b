//! Instrumentation of outbound HTTP calls.
//!
//! [`InstrumentedClient`] wraps a `reqwest::Client` and runs the
//! [`HttpInterceptor`] hooks around every call, so API latency and outcome
//! are recorded without changes at the call sites. Timing travels with the
//! call in a [`RequestContext`] rather than being stored on the request.

use std::time::Instant;

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{
    Client, IntoUrl, Method, Request, RequestBuilder, Response, ResponseBuilderExt, StatusCode,
};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::http_error;
use crate::logger::Logger;
use crate::record::{LogKind, LogLevel};

/// Status recorded when a call failed without any response from the server.
pub const NO_RESPONSE_STATUS: u16 = 500;

/// Largest non-2xx body buffered to build the error summary.
pub const MAX_ERROR_BODY_BYTES: u64 = 64 * 1024;

/// Per-call state created when a request is dispatched.
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: Uuid,
    url: String,
    method: String,
    start_time: DateTime<Utc>,
    started: Instant,
}

impl RequestContext {
    fn new(request: &Request) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: request.url().to_string(),
            method: request.method().to_string(),
            start_time: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Correlation id of the call.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }
}

/// Request/response hooks that turn HTTP calls into log records.
#[derive(Clone)]
pub struct HttpInterceptor {
    logger: Logger,
}

impl HttpInterceptor {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Hook run before a request is dispatched.
    ///
    /// Returns `None` for calls to the collection endpoint, which are never
    /// instrumented. Otherwise records an `ApiCallStart` and returns the
    /// context the completion hooks need.
    pub fn on_request(&self, request: &Request) -> Option<RequestContext> {
        if self.logger.targets_collector(request.url().as_str()) {
            trace!(url = %request.url(), "Skipping instrumentation of collector call");
            return None;
        }

        let ctx = RequestContext::new(request);
        self.logger.info(LogKind::ApiCallStart {
            url: ctx.url.clone(),
            method: ctx.method.clone(),
            start_time: ctx.start_time,
        });
        Some(ctx)
    }

    /// Hook run when a response arrived.
    ///
    /// `error` carries the failure summary for non-2xx responses.
    pub fn on_response(
        &self,
        ctx: Option<RequestContext>,
        status: StatusCode,
        error: Option<String>,
    ) {
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        self.complete(ctx, status.as_u16(), status_text, error);
    }

    /// Hook run when the call failed.
    ///
    /// Errors without a server response get [`NO_RESPONSE_STATUS`] and use
    /// the error text as status text.
    pub fn on_error(&self, ctx: Option<RequestContext>, error: &reqwest::Error) {
        let message = error.to_string();
        match error.status() {
            Some(status) => self.on_response(ctx, status, Some(message)),
            None => {
                let summary = http_error::summarize(None, &message);
                self.complete(ctx, NO_RESPONSE_STATUS, message, Some(summary));
            }
        }
    }

    fn complete(
        &self,
        ctx: Option<RequestContext>,
        status: u16,
        status_text: String,
        error: Option<String>,
    ) {
        let Some(ctx) = ctx else {
            debug!(status, "Completed call has no request context, not recorded");
            return;
        };

        let duration_millis = u64::try_from(ctx.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let failed = error.is_some() || !(200..300).contains(&status);
        let kind = LogKind::ApiCallEnd {
            url: ctx.url,
            method: ctx.method,
            start_time: ctx.start_time,
            end_time: Utc::now(),
            duration_millis,
            status,
            status_text,
            error,
        };

        if failed {
            self.logger.error(kind);
        } else {
            self.logger.info(kind);
        }
    }
}

/// A `reqwest::Client` whose calls are recorded by a [`Logger`].
///
/// Responses outside the 2xx range are returned to the caller as usual.
/// When their declared length is at most [`MAX_ERROR_BODY_BYTES`], the body
/// is read once to build the error summary and then handed back inside an
/// equivalent response. Larger or unsized bodies are passed through untouched
/// and summarized by status alone.
#[derive(Clone)]
pub struct InstrumentedClient {
    client: Client,
    interceptor: HttpInterceptor,
}

impl InstrumentedClient {
    pub fn new(client: Client, logger: Logger) -> Self {
        Self {
            client,
            interceptor: HttpInterceptor::new(logger),
        }
    }

    /// The wrapped client. Calls made directly on it are not recorded.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn interceptor(&self) -> &HttpInterceptor {
        &self.interceptor
    }

    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.client.post(url)
    }

    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Build and execute a request created by this client's builders.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, reqwest::Error> {
        match builder.build() {
            Ok(request) => self.execute(request).await,
            Err(err) => {
                // Failed before dispatch, so there is no context to complete.
                self.interceptor.on_error(None, &err);
                Err(err)
            }
        }
    }

    /// Execute a request, running the hooks around it.
    pub async fn execute(&self, request: Request) -> Result<Response, reqwest::Error> {
        let ctx = self.interceptor.on_request(&request);

        match self.client.execute(request).await {
            Ok(response) if ctx.is_none() => Ok(response),
            Ok(response) if response.status().is_success() => {
                self.interceptor.on_response(ctx, response.status(), None);
                Ok(response)
            }
            Ok(response) => {
                let status = response.status();
                let (response, summary) = summarize_error_response(response).await;
                self.interceptor.on_response(ctx, status, Some(summary));
                Ok(response)
            }
            Err(err) => {
                self.interceptor.on_error(ctx, &err);
                Err(err)
            }
        }
    }
}

/// Summarize a non-2xx response, handing back an equivalent one.
///
/// Never fails: if the body cannot be read, the caller gets the response
/// with an empty body and the summary falls back to the status.
async fn summarize_error_response(response: Response) -> (Response, String) {
    let status = response.status();
    let fallback = http_error::status_message(status.as_u16());

    match response.content_length() {
        Some(len) if len <= MAX_ERROR_BODY_BYTES => {}
        _ => return (response, fallback),
    }

    let version = response.version();
    let url = response.url().clone();
    let mut headers = response.headers().clone();

    let (body, summary) = match response.bytes().await {
        Ok(body) => {
            let summary = http_error::summarize(Some(&body), &fallback);
            (body.to_vec(), summary)
        }
        Err(e) => {
            debug!(error = %e, status = status.as_u16(), "Failed to read error response body");
            headers.remove(CONTENT_LENGTH);
            (Vec::new(), fallback)
        }
    };

    let mut builder = http::Response::builder()
        .status(status)
        .version(version)
        .url(url);
    if let Some(builder_headers) = builder.headers_mut() {
        *builder_headers = headers;
    }
    let rebuilt = match builder.body(()) {
        Ok(rebuilt) => rebuilt.map(|()| body),
        Err(_) => http::Response::new(body),
    };

    (Response::from(rebuilt), summary)
}
