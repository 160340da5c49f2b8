//! # waygate
//!
//! An HTTP gateway that routes endpoints to hierarchically named services.
//!
//! Endpoints (`/api/users`, or a whole subtree like `/static/*`) are bound per
//! method to a service name such as `api.users.list`. Services are registered by
//! name; a binding resolves to the closest registered ancestor, so registering
//! `api` serves every `api.*` name that has no handler of its own, and `*` is
//! the catch-all. Each request then runs through a pipeline of pre-processors,
//! the service handler, and post-processors sharing one [`Context`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use waygate::{Config, Context, Dispatcher, ErrorConfig, Method, ServiceRegistry};
//! use waygate::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::new();
//!     config
//!         .add("/api/users", Method::Get, "api.users.list")?
//!         .add("/static/*", Method::Get, "static")?;
//!
//!     let mut services = ServiceRegistry::new();
//!     services
//!         .register("api", |ctx: &mut Context<'_>| {
//!             let service = ctx.service_name().to_owned();
//!             ctx.set_body(format!("served by {service}"));
//!             Ok(())
//!         })?
//!         .register("static", |ctx: &mut Context<'_>| {
//!             ctx.set_body("a file");
//!             Ok(())
//!         })?;
//!
//!     let dispatcher = Dispatcher::build(config, services, ErrorConfig::new())?;
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(dispatcher).await?;
//!     Ok(())
//! }
//! ```
//!
//! Without a socket, [`Dispatcher::handle`] turns a [`Request`] straight into a
//! [`Response`]:
//!
//! ```rust
//! use waygate::{Config, Context, Dispatcher, ErrorConfig, Method, Request, ServiceRegistry, StatusCode};
//!
//! let mut config = Config::new();
//! config.add("/ping", Method::Get, "ping")?;
//! let mut services = ServiceRegistry::new();
//! services.register("ping", |ctx: &mut Context<'_>| {
//!     ctx.set_body("pong");
//!     Ok(())
//! })?;
//! let dispatcher = Dispatcher::build(config, services, ErrorConfig::new())?;
//!
//! let response = dispatcher.handle(&Request::new(Method::Get, "/ping"));
//! assert_eq!(response.status(), StatusCode::Ok);
//! assert_eq!(response.body_bytes(), b"pong");
//!
//! let missing = dispatcher.handle(&Request::new(Method::Get, "/nope"));
//! assert_eq!(missing.status(), StatusCode::NotFound);
//! # Ok::<(), waygate::ConfigError>(())
//! ```

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod grammar;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;
pub mod service;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::{Config, ConfigError, ErrorConfig};
pub use context::{Context, Handler, HandlerError, HandlerResult};
pub use dispatcher::{Dispatcher, DispatcherBuilder, Outcome};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
pub use service::ServiceRegistry;
