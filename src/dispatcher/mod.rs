//! Dispatcher — builds the immutable routing snapshot and serves requests.
//!
//! [`DispatcherBuilder::build`] takes ownership of the [`Config`], the
//! [`ServiceRegistry`] and the [`ErrorConfig`], resolves every binding to a
//! concrete handler, and returns a [`Dispatcher`] with no mutation API. Any
//! configuration problem is reported there, before a single request is served.
//!
//! [`Dispatcher::serve`] then handles one request:
//!
//! 1. look the path and method up in the endpoint table;
//! 2. queue `preprocessors..., handler, postprocessors...`, where `handler` is the
//!    matched service or, on a miss, the error handler for 404/405 (if any);
//! 3. run the chain, then write the response once.
//!
//! A handler that returns an error or panics is caught here. The failure is
//! logged and the request ends without a further write.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, field, info, info_span, warn};

use crate::config::{Config, ConfigError, ErrorConfig};
use crate::context::{Context, Handler, HandlerResult, ResponseSink};
use crate::http::{Request, Response, StatusCode};
use crate::middleware::Chain;
use crate::router::{EndpointTable, Route};
use crate::service::ServiceRegistry;

/// How a served request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every queued handler ran and the response was written.
    Completed,
    /// A handler interrupted the chain; the response was written.
    Interrupted,
    /// A handler failed; nothing was written beyond what handlers wrote themselves.
    Faulted,
}

/// Collects everything a [`Dispatcher`] is built from.
///
/// # Examples
///
/// ```
/// use waygate::config::{Config, ErrorConfig};
/// use waygate::context::Context;
/// use waygate::dispatcher::DispatcherBuilder;
/// use waygate::http::{Method, Request, StatusCode};
/// use waygate::middleware::LoggerMiddleware;
/// use waygate::service::ServiceRegistry;
///
/// let mut config = Config::new();
/// config.add("/hello", Method::Get, "api.gateway.hello")?;
///
/// let mut services = ServiceRegistry::new();
/// services.register("api.gateway", |ctx: &mut Context<'_>| {
///     ctx.set_body("hello, world");
///     Ok(())
/// })?;
///
/// let dispatcher = DispatcherBuilder::new(config, services)
///     .errors(ErrorConfig::new())
///     .preprocess_with(LoggerMiddleware)
///     .build()?;
///
/// let response = dispatcher.handle(&Request::new(Method::Get, "/hello"));
/// assert_eq!(response.status(), StatusCode::Ok);
/// assert_eq!(response.body_bytes(), b"hello, world");
/// # Ok::<(), waygate::ConfigError>(())
/// ```
#[derive(Debug)]
pub struct DispatcherBuilder {
    config: Config,
    services: ServiceRegistry,
    errors: ErrorConfig,
    preprocessors: Chain,
    postprocessors: Chain,
}

impl DispatcherBuilder {
    pub fn new(config: Config, services: ServiceRegistry) -> Self {
        Self {
            config,
            services,
            errors: ErrorConfig::new(),
            preprocessors: Chain::new(),
            postprocessors: Chain::new(),
        }
    }

    #[must_use]
    pub fn errors(mut self, errors: ErrorConfig) -> Self {
        self.errors = errors;
        self
    }

    /// Replaces the pre-processor chain.
    #[must_use]
    pub fn preprocessors(mut self, chain: Chain) -> Self {
        self.preprocessors = chain;
        self
    }

    /// Replaces the post-processor chain.
    #[must_use]
    pub fn postprocessors(mut self, chain: Chain) -> Self {
        self.postprocessors = chain;
        self
    }

    /// Appends one pre-processor.
    #[must_use]
    pub fn preprocess<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.preprocessors.push(handler);
        self
    }

    /// Appends one [`Middleware`](crate::middleware::Middleware) as a pre-processor.
    #[must_use]
    pub fn preprocess_with<M>(mut self, middleware: M) -> Self
    where
        M: crate::middleware::Middleware + 'static,
    {
        self.preprocessors.use_middleware(middleware);
        self
    }

    /// Appends one post-processor.
    #[must_use]
    pub fn postprocess<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.postprocessors.push(handler);
        self
    }

    /// Resolves every binding and freezes the result.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnresolvedService`] — a binding names a service with no
    ///   registered ancestor and no `*` registration.
    /// - [`ConfigError::DuplicateBinding`] — two bindings share a path and method.
    /// - [`ConfigError::InvalidPath`] / [`ConfigError::UnsupportedMethod`] — a
    ///   binding slipped past [`Config::add`] validation.
    pub fn build(self) -> Result<Dispatcher, ConfigError> {
        let mut table = EndpointTable::new();

        for binding in &self.config {
            let resolved = self.services.resolve(&binding.service).ok_or_else(|| {
                ConfigError::UnresolvedService {
                    path: binding.path.clone(),
                    method: binding.method.clone(),
                    service: binding.service.clone(),
                }
            })?;

            info!(
                endpoint = %binding.path,
                method = %binding.method,
                requested = %binding.service,
                service = %resolved.name,
                distance = resolved.distance,
                "service matched"
            );

            table.bind(
                &binding.path,
                binding.method.clone(),
                Route::new(resolved.name, resolved.handler),
            )?;
        }

        Ok(Dispatcher {
            table,
            errors: self.errors,
            preprocessors: self.preprocessors.handlers().to_vec(),
            postprocessors: self.postprocessors.handlers().to_vec(),
        })
    }
}

/// An immutable routing snapshot, shareable across threads.
pub struct Dispatcher {
    table: EndpointTable,
    errors: ErrorConfig,
    preprocessors: Vec<Handler>,
    postprocessors: Vec<Handler>,
}

impl Dispatcher {
    pub fn builder(config: Config, services: ServiceRegistry) -> DispatcherBuilder {
        DispatcherBuilder::new(config, services)
    }

    /// Builds a dispatcher with no pre- or post-processors.
    ///
    /// # Errors
    ///
    /// See [`DispatcherBuilder::build`].
    pub fn build(
        config: Config,
        services: ServiceRegistry,
        errors: ErrorConfig,
    ) -> Result<Self, ConfigError> {
        DispatcherBuilder::new(config, services).errors(errors).build()
    }

    pub fn table(&self) -> &EndpointTable {
        &self.table
    }

    /// Routes `request`, runs its handler chain, and writes the result to `sink`.
    pub fn serve(&self, request: &Request, sink: &mut dyn ResponseSink) -> Outcome {
        let span = info_span!(
            "request",
            method = %request.method(),
            path = request.path(),
            service = field::Empty,
        );
        let _enter = span.enter();

        let mut chain =
            Vec::with_capacity(self.preprocessors.len() + 1 + self.postprocessors.len());
        chain.extend(self.preprocessors.iter().cloned());

        let (service, miss_status) = match self.table.lookup(request.path(), request.method()) {
            Ok(route) => {
                chain.push(route.handler().clone());
                (Some(route.service()), None)
            }
            Err(miss) => {
                let status = miss.status();
                warn!(status = status.as_u16(), "{miss}");
                if let Some(handler) = self.errors.get(status) {
                    chain.push(handler.clone());
                }
                (None, Some(status))
            }
        };

        chain.extend(self.postprocessors.iter().cloned());

        let mut ctx = Context::new(request, sink, chain);
        if let Some(status) = miss_status {
            ctx.set_status(status);
        }
        if let Some(service) = service {
            span.record("service", service);
            ctx.set_service_name(service);
            debug!("handle http service");
        }

        match panic::catch_unwind(AssertUnwindSafe(|| ctx.next())) {
            Ok(Ok(())) => {
                let interrupted = ctx.is_interrupted();
                ctx.write();
                if interrupted {
                    Outcome::Interrupted
                } else {
                    Outcome::Completed
                }
            }
            Ok(Err(err)) => {
                error!(error = %err, "handler failed");
                Outcome::Faulted
            }
            Err(payload) => {
                error!(panic = panic_message(payload.as_ref()), "handler panicked");
                Outcome::Faulted
            }
        }
    }

    /// Serves `request` into a fresh [`Response`].
    ///
    /// The response starts out as a bare `500 Internal Server Error`, which is
    /// what a client sees if a handler fails before anything is written.
    pub fn handle(&self, request: &Request) -> Response {
        let mut response = Response::new(StatusCode::InternalServerError);
        self.serve(request, &mut response);
        response
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("table", &self.table)
            .field("errors", &self.errors)
            .field("preprocessors", &self.preprocessors.len())
            .field("postprocessors", &self.postprocessors.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
