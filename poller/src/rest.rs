use crate::poll::Collector;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
struct AppState {
    collector: Arc<Collector>,
}

pub fn create_router(collector: Arc<Collector>) -> Router {
    let state = AppState { collector };

    Router::new()
        .route("/data", get(get_data))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// One on-demand fetch attempt. Nothing is persisted.
async fn get_data(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let records = state.collector.fetch_now().await?;

    if records.is_empty() {
        return Ok(Json(json!({ "message": "No data found." })));
    }

    Ok(Json(Value::Array(records)))
}

/// Errors leave the facade as `{"error": "..."}` with a 200 status, the same
/// shape callers of `/data` already parse.
struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {}", self.0);
        (
            StatusCode::OK,
            Json(json!({ "error": format!("Failed to fetch data: {}", self.0) })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FetchError;
    use crate::notifier::SentAlerts;
    use crate::poll::FETCH_CATEGORY;
    use crate::retry::RetryPolicy;
    use crate::test_support::{
        collector_for, collector_with_alerts, collector_with_fetcher, fetcher_for_policy,
        mock_token, property, MemoryStore, RecordingMailer,
    };
    use std::time::Duration;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_get_data_returns_records() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("GET", "/iot/v2/things/t-1/properties")
            .with_status(200)
            .with_body(json!([property("p-1", json!(2.0))]).to_string())
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        let collector = Arc::new(collector_for(&server, store.clone(), mailer));
        let base = serve(create_router(collector)).await;

        let body: Value = reqwest::get(format!("{}/data", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["id"], "p-1");
        assert!(store.readings().is_empty());
    }

    #[tokio::test]
    async fn test_get_data_upstream_503() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("GET", "/iot/v2/things/t-1/properties")
            .with_status(503)
            .with_body("Service Unavailable")
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        let alerts = SentAlerts::new();
        let collector = Arc::new(collector_with_alerts(
            &server,
            store.clone(),
            mailer.clone(),
            alerts.clone(),
        ));
        let base = serve(create_router(collector)).await;

        let body: Value = reqwest::get(format!("{}/data", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let message = body["error"].as_str().expect("error field present");
        assert!(message.contains("503"));
        assert!(store.readings().is_empty());

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("503"));
        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status_code, Some(503));
        assert!(alerts.contains(FETCH_CATEGORY));
    }

    #[tokio::test]
    async fn test_get_data_does_not_wait_for_retries() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        let props = server
            .mock("GET", "/iot/v2/things/t-1/properties")
            .with_status(503)
            .with_body("down")
            .expect(1)
            .create_async()
            .await;

        let slow_retry = RetryPolicy::fixed(5, Duration::from_secs(120), FetchError::is_retryable);
        let collector = Arc::new(collector_with_fetcher(
            fetcher_for_policy(&server, slow_retry),
            Arc::new(MemoryStore::default()),
            Arc::new(RecordingMailer::default()),
            SentAlerts::new(),
        ));
        let base = serve(create_router(collector)).await;

        let response = tokio::time::timeout(
            Duration::from_secs(10),
            reqwest::get(format!("{}/data", base)),
        )
        .await
        .expect("/data answered before any retry wait")
        .unwrap();
        let body: Value = response.json().await.unwrap();

        assert!(body["error"].as_str().unwrap().contains("503"));
        props.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_data_empty() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("GET", "/iot/v2/things/t-1/properties")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let collector = Arc::new(collector_for(
            &server,
            Arc::new(MemoryStore::default()),
            Arc::new(RecordingMailer::default()),
        ));
        let base = serve(create_router(collector)).await;

        let body: Value = reqwest::get(format!("{}/data", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body, json!({ "message": "No data found." }));
    }
}
