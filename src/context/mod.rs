//! Per-request context and the handler chain that runs against it.
//!
//! A [`Context`] is created by the dispatcher for every request. It carries the
//! pending response (status, headers, body), a [`Values`] bag for handlers to
//! pass data to each other, and the ordered handler sequence:
//!
//! ```text
//! preprocessors..., service-or-error handler, postprocessors...
//! ```
//!
//! The sequence runs synchronously. A handler may call [`Context::next`] to run
//! everything after it before doing more work, or simply return and let the
//! driver move on. [`Context::interrupt`] stops the chain before the next
//! handler. The response reaches the [`ResponseSink`] exactly once, through
//! [`Context::write`].

use std::sync::Arc;

use thiserror::Error;

use crate::http::{Headers, Request, StatusCode};

pub mod sink;
pub mod values;

pub use sink::ResponseSink;
pub use values::Values;

/// What a handler returns; an `Err` aborts the request at the dispatcher.
pub type HandlerResult = Result<(), HandlerError>;

/// A type-erased, shareable request handler.
///
/// Service handlers, error handlers, pre-processors and post-processors all
/// share this one shape: they receive the request's [`Context`] and return
/// nothing but success or failure. Build one from a closure with [`handler`].
pub type Handler = Arc<dyn Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static>;

/// Wraps a closure or function into a [`Handler`].
///
/// # Examples
///
/// ```
/// use waygate::context::{Context, handler};
///
/// let hello = handler(|ctx: &mut Context<'_>| {
///     ctx.set_body("hello, world");
///     Ok(())
/// });
/// # let _ = hello;
/// ```
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Failures a handler can report.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// A failure described by a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Wraps any error type.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(err))
    }
}

/// State of one request as it moves through the handler chain.
pub struct Context<'a> {
    request: &'a Request,
    sink: &'a mut dyn ResponseSink,
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    values: Values,
    service_name: String,
    chain: Vec<Handler>,
    // Index of the next handler to run.
    cursor: usize,
    interrupted: bool,
    written: bool,
}

impl<'a> Context<'a> {
    /// Creates a context with status `200`, no headers, an empty body, and the
    /// given handler sequence queued.
    pub fn new(request: &'a Request, sink: &'a mut dyn ResponseSink, chain: Vec<Handler>) -> Self {
        Self {
            request,
            sink,
            status: StatusCode::Ok,
            headers: Headers::new(),
            body: Vec::new(),
            values: Values::new(),
            service_name: String::new(),
            chain,
            cursor: 0,
            interrupted: false,
            written: false,
        }
    }

    pub fn request(&self) -> &Request {
        self.request
    }

    /// Name of the registered service serving this request.
    ///
    /// This is the matched name, which may be an ancestor of (or the wildcard
    /// for) the name the endpoint asked for. It is empty on a routing miss.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub(crate) fn set_service_name(&mut self, name: impl Into<String>) {
        self.service_name = name.into();
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Replaces the pending response body.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Values {
        &mut self.values
    }

    /// Decodes the request body as JSON.
    pub fn json<T>(&self) -> Result<T, HandlerError>
    where
        T: serde::de::DeserializeOwned,
    {
        Ok(serde_json::from_slice(self.request.body())?)
    }

    /// Encodes `value` as the response body and sets `Content-Type: application/json`.
    pub fn set_json<T>(&mut self, value: &T) -> HandlerResult
    where
        T: serde::Serialize + ?Sized,
    {
        self.body = serde_json::to_vec(value)?;
        self.headers.set("Content-Type", "application/json");
        Ok(())
    }

    /// Stops every handler after the current one from running.
    ///
    /// The calling handler runs to completion. Calling this more than once has no
    /// further effect.
    pub fn interrupt(&mut self) {
        self.interrupted = true;
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Runs the rest of the handler sequence, then returns to the caller.
    ///
    /// Called from inside a handler, this lets the handler wrap everything that
    /// follows it. When it returns the sequence is exhausted (or interrupted), so
    /// the outer driver has nothing left to run. The first error stops the chain
    /// and is passed back up unchanged.
    pub fn next(&mut self) -> HandlerResult {
        while self.cursor < self.chain.len() {
            if self.interrupted {
                break;
            }
            let handler = Arc::clone(&self.chain[self.cursor]);
            self.cursor += 1;
            handler(&mut *self)?;
        }
        Ok(())
    }

    /// Copies the pending response onto the sink.
    ///
    /// Headers replace any same-named headers the sink already carries; then the
    /// status and the body are written. Only the first call does anything.
    pub fn write(&mut self) {
        if self.written {
            return;
        }
        self.written = true;

        self.sink.headers_mut().replace_from(&self.headers);
        self.sink.write_status(self.status);
        self.sink.write_body(&self.body);
    }

    pub fn is_written(&self) -> bool {
        self.written
    }
}
