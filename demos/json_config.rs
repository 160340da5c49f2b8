//! Loads endpoint bindings from JSON and serves them.
//!
//! Pass a file path to load it instead of the built-in document:
//!
//! ```text
//! cargo run --example json_config -- gateway.json
//! ```

use std::time::Duration;

use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use waygate::server::{Server, shutdown_signal};
use waygate::{Config, Context, Dispatcher, ErrorConfig, ServiceRegistry, StatusCode};

const DEFAULT_CONFIG: &str = r#"{
    "data": [
        { "endpoint": "/api/users",   "method": "GET",  "service": "api.users.list" },
        { "endpoint": "/api/users",   "method": "POST", "service": "api.users.create" },
        { "endpoint": "/api/health",  "method": "GET",  "service": "api.health" },
        { "endpoint": "/assets/*",    "method": "GET",  "service": "assets" }
    ]
}"#;

#[derive(Serialize)]
struct Served<'a> {
    service: &'a str,
    path: &'a str,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_json_file(path)?,
        None => Config::from_json(DEFAULT_CONFIG)?,
    };
    info!(bindings = config.len(), "config loaded");

    let mut services = ServiceRegistry::new();
    services
        .register("api", |ctx: &mut Context<'_>| {
            let service = ctx.service_name().to_owned();
            let path = ctx.request().path().to_owned();
            ctx.set_json(&Served {
                service: &service,
                path: &path,
            })?;
            Ok(())
        })?
        .register("api.health", |ctx: &mut Context<'_>| {
            ctx.set_body("ok");
            Ok(())
        })?
        .register("*", |ctx: &mut Context<'_>| {
            let path = ctx.request().path().to_owned();
            ctx.set_body(format!("fallback for {path}"));
            Ok(())
        })?;

    let mut errors = ErrorConfig::new();
    errors
        .add(StatusCode::NotFound, |ctx: &mut Context<'_>| {
            ctx.set_body("no such endpoint");
            Ok(())
        })
        .add(StatusCode::MethodNotAllowed, |ctx: &mut Context<'_>| {
            ctx.set_body("method not allowed here");
            Ok(())
        });

    let dispatcher = Dispatcher::build(config, services, errors)?;
    info!(table = ?dispatcher.table(), "routes ready");

    let server = Server::bind("127.0.0.1:8080").await?;
    server
        .run_with_shutdown(dispatcher, shutdown_signal(), Duration::from_secs(5))
        .await?;
    Ok(())
}
