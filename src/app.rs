use std::net::SocketAddr;
use std::time::Duration;

use axum::{body::Body, http::Request, response::Response, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Span;

use crate::state::AppState;
use crate::users;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(users::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(log_response),
        )
}

fn request_span(req: &Request<Body>) -> Span {
    tracing::info_span!(
        "api",
        method = %req.method(),
        path = req.uri().path(),
        status = tracing::field::Empty,
    )
}

fn log_response(res: &Response, latency: Duration, span: &Span) {
    let status = res.status();
    span.record("status", status.as_u16());
    let ms = latency.as_millis() as u64;
    if status.is_server_error() {
        tracing::error!(%status, ms, "request failed");
    } else {
        tracing::debug!(%status, ms, "request done");
    }
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod app_tests {
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn health_is_mounted_under_api() {
        let (state, _, _) = AppState::fake().await;
        let res = build_app(state)
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
