//! Shows the order pre-processors, the service handler and post-processors run in.
//!
//! `curl localhost:8080/hello` logs:
//!
//! ```text
//! request → middleware 1 → middleware 2 start → middleware 3 → body
//!         → middleware 2 end → response
//! ```
//!
//! Send `X-Stop: 1` and middleware 2 interrupts instead of calling `next`; the
//! chain stops at "middleware 2 end" and the client gets an empty 200.
//!
//! Run with `RUST_LOG=debug cargo run --example middleware` for more detail.

use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;
use waygate::middleware::LoggerMiddleware;
use waygate::server::{Server, shutdown_signal};
use waygate::{Config, Context, Dispatcher, Method, ServiceRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = Config::new();
    config.add("/hello", Method::Get, "api.gateway.hello")?;

    let mut services = ServiceRegistry::new();
    services.register("api.gateway.hello", |ctx: &mut Context<'_>| {
        info!("body start");
        ctx.set_body("hello, world");
        info!("body end");
        Ok(())
    })?;

    let dispatcher = Dispatcher::builder(config, services)
        .preprocess_with(LoggerMiddleware)
        .preprocess(|_ctx: &mut Context<'_>| {
            info!("middleware 1");
            Ok(())
        })
        .preprocess(|ctx: &mut Context<'_>| {
            info!("middleware 2 start");
            if ctx.request().headers().contains("x-stop") {
                ctx.interrupt();
            } else {
                ctx.next()?;
            }
            info!("middleware 2 end");
            Ok(())
        })
        .preprocess(|_ctx: &mut Context<'_>| {
            info!("middleware 3");
            Ok(())
        })
        .build()?;

    let server = Server::bind("127.0.0.1:8080").await?;
    info!("try: curl http://{}/hello", server.local_addr());
    server
        .run_with_shutdown(dispatcher, shutdown_signal(), Duration::from_secs(5))
        .await?;
    Ok(())
}
