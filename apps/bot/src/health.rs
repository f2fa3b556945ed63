use std::net::SocketAddr;

use axum::{Router, routing::get};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{debug, error, info};

pub const ALIVE: &str = "I'm alive";

pub fn router() -> Router {
    Router::new().route("/", get(alive))
}

async fn alive() -> &'static str {
    debug!("GET / - liveness probe");
    ALIVE
}

pub async fn serve(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "liveness endpoint listening");
    axum::serve(listener, router()).await
}

/// Runs the liveness endpoint on its own task. Failure is logged, never fatal to the bot.
pub fn spawn(port: u16) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = serve(port).await {
            error!(port, error = %e, "liveness endpoint stopped");
        }
    })
}
