//! Pre- and post-processors — handlers that run around every service handler.
//!
//! The dispatcher runs, in order:
//!
//! ```text
//! preprocessors..., service-or-error handler, postprocessors...
//! ```
//!
//! Each entry is an ordinary [`Handler`]. A processor can:
//!
//! - **Pass through** — do its work and return; the next handler runs after it.
//! - **Wrap** — call [`Context::next`] to run everything after it, then inspect
//!   the result (see [`LoggerMiddleware`]).
//! - **Stop** — call [`Context::interrupt`]; nothing after it runs, including the
//!   post-processors. The response is still written.
//!
//! ## Core types
//!
//! - [`Chain`] — an ordered list of processors.
//! - [`Middleware`] — trait for processors that carry their own configuration.
//! - [`from_middleware`] — converts a [`Middleware`] into a [`Handler`].

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::context::{Context, Handler, HandlerResult};

/// A processor with state of its own.
///
/// Closures cover most processors; implement this trait when the processor is a
/// configurable struct.
///
/// ```rust
/// use waygate::context::{Context, HandlerResult};
/// use waygate::middleware::{Chain, Middleware};
///
/// struct ServerHeader(&'static str);
///
/// impl Middleware for ServerHeader {
///     fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
///         ctx.headers_mut().set("Server", self.0);
///         Ok(())
///     }
/// }
///
/// let mut pre = Chain::new();
/// pre.use_middleware(ServerHeader("waygate"));
/// assert_eq!(pre.len(), 1);
/// ```
pub trait Middleware: Send + Sync {
    /// Handle the request; call [`Context::next`] to wrap the rest of the chain.
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult;
}

/// Converts a [`Middleware`] implementation into a [`Handler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> Handler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: &mut Context<'_>| middleware.handle(ctx))
}

/// An ordered list of processors.
///
/// # Examples
///
/// ```rust
/// use waygate::context::Context;
/// use waygate::middleware::{Chain, LoggerMiddleware};
///
/// let mut pre = Chain::new();
/// pre.use_middleware(LoggerMiddleware)
///     .push(|ctx: &mut Context<'_>| {
///         ctx.values_mut().set("seen", true);
///         Ok(())
///     });
/// assert_eq!(pre.len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct Chain {
    handlers: Vec<Handler>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a closure or function.
    pub fn push<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.push_handler(crate::context::handler(handler))
    }

    /// Appends an already type-erased handler.
    pub fn push_handler(&mut self, handler: Handler) -> &mut Self {
        self.handlers.push(handler);
        self
    }

    /// Appends a [`Middleware`] implementation.
    pub fn use_middleware<M>(&mut self, middleware: M) -> &mut Self
    where
        M: Middleware + 'static,
    {
        self.push_handler(from_middleware(Arc::new(middleware)))
    }

    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.handlers.len())
            .finish()
    }
}

/// Built-in processor that logs each request and its response.
///
/// Emits one `tracing::info!` record when it starts, runs the rest of the chain
/// through [`Context::next`], then emits a second record with the status, body
/// length and elapsed time. That second record is a `warn!` for 4xx and 5xx.
/// Register it first among the pre-processors so that it wraps everything else.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        let start = Instant::now();
        info!(
            path = ctx.request().path(),
            method = %ctx.request().method(),
            service = ctx.service_name(),
            "request"
        );

        ctx.next()?;

        let status = ctx.status();
        if status.is_error() {
            warn!(
                status = status.as_u16(),
                response_length = ctx.body().len(),
                elapsed = ?start.elapsed(),
                "response"
            );
        } else {
            info!(
                status = status.as_u16(),
                response_length = ctx.body().len(),
                elapsed = ?start.elapsed(),
                "response"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::context::sink::RecordingSink;
    use crate::http::{Method, Request, StatusCode};

    struct Tag(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl Middleware for Tag {
        fn handle(&self, _ctx: &mut Context<'_>) -> HandlerResult {
            self.1.lock().unwrap().push(self.0);
            Ok(())
        }
    }

    #[test]
    fn chain_preserves_registration_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut chain = Chain::new();
        chain
            .use_middleware(Tag("one", Arc::clone(&trace)))
            .use_middleware(Tag("two", Arc::clone(&trace)));
        {
            let trace = Arc::clone(&trace);
            chain.push(move |_ctx: &mut Context<'_>| {
                trace.lock().unwrap().push("three");
                Ok(())
            });
        }

        let req = Request::new(Method::Get, "/");
        let mut sink = RecordingSink::default();
        let mut ctx = Context::new(&req, &mut sink, chain.handlers().to_vec());
        ctx.next().unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[test]
    fn logger_runs_the_rest_of_the_chain() {
        let mut chain = Chain::new();
        chain
            .use_middleware(LoggerMiddleware)
            .push(|ctx: &mut Context<'_>| {
                ctx.set_status(StatusCode::Created);
                ctx.set_body("made");
                Ok(())
            });

        let req = Request::new(Method::Post, "/things");
        let mut sink = RecordingSink::default();
        let mut ctx = Context::new(&req, &mut sink, chain.handlers().to_vec());
        ctx.next().unwrap();

        assert_eq!(ctx.status(), StatusCode::Created);
        assert_eq!(ctx.body(), b"made");
    }

    #[test]
    fn logger_leaves_error_statuses_untouched() {
        let mut chain = Chain::new();
        chain
            .use_middleware(LoggerMiddleware)
            .push(|ctx: &mut Context<'_>| {
                ctx.set_status(StatusCode::NotFound);
                Ok(())
            });

        let req = Request::new(Method::Get, "/missing");
        let mut sink = RecordingSink::default();
        let mut ctx = Context::new(&req, &mut sink, chain.handlers().to_vec());
        ctx.next().unwrap();

        assert_eq!(ctx.status(), StatusCode::NotFound);
        assert!(ctx.body().is_empty());
    }
}
