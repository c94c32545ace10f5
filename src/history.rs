use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{NotifyError, Result};
use crate::metrics;
use crate::models::{NotificationEvent, NotificationId};

// The history endpoint answers with either a bare array or a wrapped object,
// depending on backend version.
#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryResponse {
    List(Vec<NotificationEvent>),
    Wrapped { notifications: Vec<NotificationEvent> },
}

impl HistoryResponse {
    fn into_events(self) -> Vec<NotificationEvent> {
        match self {
            HistoryResponse::List(events) => events,
            HistoryResponse::Wrapped { notifications } => notifications,
        }
    }
}

/// The REST operations a notification view depends on.
#[trait_variant::make(HistoryApi: Send)]
pub trait LocalHistoryApi {
    async fn fetch_history(&self) -> Result<Vec<NotificationEvent>>;
    async fn mark_read(&self, id: &NotificationId) -> Result<()>;
    async fn mark_all_read(&self) -> Result<()>;
}

/// Bearer-authenticated client for the notification history resource.
#[derive(Clone)]
pub struct HistoryClient {
    http_client: HttpClient,
    base_url: String,
    credential: String,
}

impl HistoryClient {
    pub fn new(base_url: &str, credential: &str, timeout: Duration) -> Result<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credential: credential.to_string(),
        })
    }

    pub async fn fetch_history(&self) -> Result<Vec<NotificationEvent>> {
        let timer = Instant::now();
        let url = format!("{}/notifications", self.base_url);

        let result = self.fetch_from(&url).await;
        metrics::HISTORY_FETCH_TIME.observe(timer.elapsed().as_secs_f64());

        match result {
            Ok(events) => {
                info!(count = events.len(), "Fetched notification history");
                Ok(events)
            }
            Err(e) => {
                metrics::HISTORY_FETCH_FAILURES.inc();
                warn!(error = %e, "Notification history fetch failed");
                Err(e)
            }
        }
    }

    async fn fetch_from(&self, url: &str) -> Result<Vec<NotificationEvent>> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.credential)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Fetch(format!("history endpoint returned {}", status)));
        }

        let body: HistoryResponse = response.json().await?;
        Ok(body.into_events())
    }

    pub async fn mark_read(&self, id: &NotificationId) -> Result<()> {
        let url = format!("{}/notifications/{}/read", self.base_url, id);
        self.send_mark(&url).await?;
        debug!(id = %id, "Marked notification read");
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        let url = format!("{}/notifications/read-all", self.base_url);
        self.send_mark(&url).await?;
        info!("Marked all notifications read");
        Ok(())
    }

    async fn send_mark(&self, url: &str) -> Result<()> {
        let response = self
            .http_client
            .patch(url)
            .bearer_auth(&self.credential)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            // Already read or already gone on the server side.
            StatusCode::NOT_FOUND | StatusCode::CONFLICT => Ok(()),
            status => Err(NotifyError::Fetch(format!("mark read returned {}", status))),
        }
    }
}

impl HistoryApi for HistoryClient {
    async fn fetch_history(&self) -> Result<Vec<NotificationEvent>> {
        HistoryClient::fetch_history(self).await
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<()> {
        HistoryClient::mark_read(self, id).await
    }

    async fn mark_all_read(&self) -> Result<()> {
        HistoryClient::mark_all_read(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::{get, patch},
        Json, Router,
    };
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Backend {
        marked: Mutex<Vec<String>>,
        wrapped: bool,
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer good-token")
    }

    async fn list(
        State(backend): State<Arc<Backend>>,
        headers: HeaderMap,
    ) -> std::result::Result<Json<serde_json::Value>, AxumStatus> {
        if !authorized(&headers) {
            return Err(AxumStatus::UNAUTHORIZED);
        }
        let items = serde_json::json!([
            {"id": 1, "createdAt": "2024-01-01T00:00:00Z", "isRead": false, "repair": {"id": 3}},
            {"id": 2, "created_at": "2024-01-02T00:00:00Z", "is_read": true, "promotion_id": 8}
        ]);
        if backend.wrapped {
            Ok(Json(serde_json::json!({ "notifications": items })))
        } else {
            Ok(Json(items))
        }
    }

    async fn mark_one(
        State(backend): State<Arc<Backend>>,
        Path(id): Path<String>,
    ) -> AxumStatus {
        let mut marked = backend.marked.lock().unwrap();
        if marked.contains(&id) {
            return AxumStatus::CONFLICT;
        }
        marked.push(id);
        AxumStatus::NO_CONTENT
    }

    async fn mark_all(State(backend): State<Arc<Backend>>) -> AxumStatus {
        backend.marked.lock().unwrap().push("*".to_string());
        AxumStatus::OK
    }

    async fn spawn_backend(backend: Arc<Backend>) -> String {
        let app = Router::new()
            .route("/api/notifications", get(list))
            .route("/api/notifications/read-all", patch(mark_all))
            .route("/api/notifications/:id/read", patch(mark_one))
            .with_state(backend);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/", addr)
    }

    #[tokio::test]
    async fn test_fetch_history_decodes_both_shapes() {
        for wrapped in [false, true] {
            let base = spawn_backend(Arc::new(Backend {
                wrapped,
                ..Default::default()
            }))
            .await;
            let client = HistoryClient::new(&base, "good-token", Duration::from_secs(5)).unwrap();

            let events = client.fetch_history().await.unwrap();
            assert_eq!(events.len(), 2);
            assert_eq!(events[0].repair_id, Some(3));
            assert!(events[1].is_read);
            assert_eq!(events[1].category, crate::models::Category::Promotion);
        }
    }

    #[tokio::test]
    async fn test_fetch_history_reports_http_errors() {
        let base = spawn_backend(Arc::new(Backend::default())).await;
        let client = HistoryClient::new(&base, "stale-token", Duration::from_secs(5)).unwrap();

        match client.fetch_history().await {
            Err(NotifyError::Fetch(reason)) => assert!(reason.contains("401")),
            other => panic!("expected fetch error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent() {
        let backend = Arc::new(Backend::default());
        let base = spawn_backend(backend.clone()).await;
        let client = HistoryClient::new(&base, "good-token", Duration::from_secs(5)).unwrap();

        client.mark_read(&NotificationId::from(5)).await.unwrap();
        client.mark_read(&NotificationId::from(5)).await.unwrap();
        client.mark_all_read().await.unwrap();

        assert_eq!(*backend.marked.lock().unwrap(), vec!["5".to_string(), "*".to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_fetch_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HistoryClient::new(
            &format!("http://{}", addr),
            "good-token",
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(matches!(
            client.fetch_history().await,
            Err(NotifyError::Fetch(_))
        ));
    }
}
