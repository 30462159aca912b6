//! lagwatch-api — the scrape endpoint.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition of the Kafka gauges |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use lagwatch_metrics::ExporterMetrics;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub metrics: Arc<ExporterMetrics>,
}

/// Build the scrape router.
pub fn build_router(metrics: Arc<ExporterMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(ApiState { metrics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn serves_current_gauges() {
        let metrics = Arc::new(ExporterMetrics::new().unwrap());
        metrics.broker.set_count(3);
        metrics.group.set_lag("billing", "orders", 0, 42);
        let router = build_router(metrics.clone());

        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("kafka_brokers 3"));
        assert!(text.contains("kafka_consumergroup_lag{"));

        // Later writes show up on the next scrape.
        metrics.broker.set_count(4);
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("kafka_brokers 4"));
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let router = build_router(Arc::new(ExporterMetrics::new().unwrap()));
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_rejects_post() {
        let router = build_router(Arc::new(ExporterMetrics::new().unwrap()));
        let req = Request::builder()
            .method("POST")
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
