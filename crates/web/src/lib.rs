pub use crate::common::RouteResult;

use axum::{routing::on, Router};
use locator::{client::Client, database::Database};
use tokio::net::TcpListener;

use crate::common::{route_not_found, METHOD_FILTER_ALL};

pub mod api;
pub mod common;

#[derive(Clone)]
pub struct WebState<D> {
    pub client: Client<D>,
}

pub fn router<D: Database>(state: WebState<D>) -> Router {
    Router::new()
        .nest_service("/api", api::routes(state))
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}

/// Serves until Ctrl-C, letting in-flight requests finish.
pub async fn start_web_server<D: Database>(state: WebState<D>, port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    log::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("web server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(why) = tokio::signal::ctrl_c().await {
        log::warn!("can not listen for shutdown signal: {}", why);
        std::future::pending::<()>().await;
    }
}
