//! HTTP handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};

use crate::ApiState;

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, lagwatch_metrics::CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use lagwatch_metrics::ExporterMetrics;

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let state = ApiState {
            metrics: Arc::new(ExporterMetrics::new().unwrap()),
        };
        let resp = prometheus_metrics(State(state)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert_eq!(content_type, "text/plain; version=0.0.4; charset=utf-8");
    }
}
