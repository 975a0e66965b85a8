//! HTTP-FLV push ingest
//!
//! `POST` or `PUT /<prefix>/<accountId>?t=<token>` with an FLV body. The
//! response is sent when the session ends: immediately for rejections,
//! after the last tag otherwise.

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use crate::account::AccountGateway;
use crate::error::Error;
use crate::registry::RegistryError;
use crate::session::{FlvSource, PublishEnd, PublishSession};

use super::ServerState;

/// Ingest router
pub fn router<G: AccountGateway>(state: ServerState<G>) -> Router {
    Router::new()
        .route("/{*path}", post(publish::<G>).put(publish::<G>))
        .with_state(state)
}

/// Status code for a rejected publisher
pub fn rejection_status(error: &Error) -> StatusCode {
    match error {
        Error::MalformedIdentifier(_) => StatusCode::BAD_REQUEST,
        Error::AuthenticationFailed => StatusCode::UNAUTHORIZED,
        Error::Registry(RegistryError::Conflict(_)) => StatusCode::CONFLICT,
        Error::AccountStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn publish<G: AccountGateway>(
    State(state): State<ServerState<G>>,
    uri: Uri,
    body: Body,
) -> Response {
    let permit = match state.acquire_publisher_slot() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!(path = uri.path(), "Publisher rejected: limit reached");
            return (StatusCode::SERVICE_UNAVAILABLE, "publisher limit reached").into_response();
        }
    };

    let session_id = state.next_session_id();
    tracing::debug!(session_id, path = uri.path(), "New publisher");

    let reader = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
    let mut session = PublishSession::new(
        session_id,
        Arc::clone(&state.registry),
        Arc::clone(&state.gateway),
    )
    .with_idle_timeout(state.config.idle_timeout);

    let path = uri.path().to_owned();
    let query = uri.query().map(str::to_owned);

    // Run detached so a dropped request still goes through teardown
    let task = tokio::spawn(async move {
        let _permit = permit;
        session
            .run(&path, query.as_deref(), FlvSource::new(reader))
            .await
    });

    match task.await {
        Ok(Ok(report)) => {
            tracing::debug!(
                session_id,
                stream = %report.key,
                packets = report.packets,
                "Publisher connection closed"
            );
            let body = match report.end {
                PublishEnd::Finished => format!("stream ended after {} packets\n", report.packets),
                PublishEnd::Failed(reason) => format!("stream failed: {reason}\n"),
            };
            (StatusCode::OK, body).into_response()
        }
        Ok(Err(e)) => {
            if !e.is_rejection() {
                tracing::error!(session_id, error = %e, "Publisher could not be admitted");
            }
            (rejection_status(&e), e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!(session_id, error = %e, "Publish task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::account::{AccountId, MemoryAccountStore, StreamRecord};
    use crate::media::{FlvHeader, FlvMuxer, FlvTag};
    use crate::registry::StreamKey;
    use crate::server::ServerConfig;

    const ACCOUNT: &str = "507f1f77bcf86cd799439011";
    const PATH: &str = "/live/507f1f77bcf86cd799439011";

    fn account() -> AccountId {
        AccountId::parse(ACCOUNT).unwrap()
    }

    fn state(config: ServerConfig) -> (ServerState<MemoryAccountStore>, Arc<MemoryAccountStore>) {
        let store = Arc::new(MemoryAccountStore::new());
        store.insert(StreamRecord::new(account(), "secret"));
        (ServerState::new(config, Arc::clone(&store)), store)
    }

    fn flv_body() -> Vec<u8> {
        let mut out = FlvMuxer::header(FlvHeader {
            has_audio: false,
            has_video: true,
        })
        .to_vec();
        out.extend_from_slice(&FlvMuxer::tag(&FlvTag::video(
            0,
            Bytes::from_static(&[0x17, 0x00, 0, 0, 0, 0x01]),
        )));
        for i in 0..3u32 {
            let first = if i == 0 { 0x17 } else { 0x27 };
            out.extend_from_slice(&FlvMuxer::tag(&FlvTag::video(
                i * 40,
                Bytes::from(vec![first, 0x01, 0, 0, 0]),
            )));
        }
        out
    }

    fn push(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_push_full_stream() {
        let (state, store) = state(ServerConfig::default());
        let registry = Arc::clone(&state.registry);

        let response = router(state)
            .oneshot(push(&format!("{PATH}?t=secret"), flv_body()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"stream ended after 3 packets\n");

        assert_eq!(registry.channel_count(), 0);
        assert!(!store.get(&account()).unwrap().is_live);
    }

    #[tokio::test]
    async fn test_put_is_accepted() {
        let (state, _store) = state(ServerConfig::default());
        let request = Request::builder()
            .method("PUT")
            .uri(format!("{PATH}?t=secret"))
            .body(Body::from(flv_body()))
            .unwrap();

        let response = router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rejections() {
        let (state, _store) = state(ServerConfig::default());
        let app = router(state);

        let cases = [
            ("/live/not-an-id?t=secret", StatusCode::BAD_REQUEST),
            ("/live/507f1f77bcf86cd799439011", StatusCode::BAD_REQUEST),
            ("/live/507f1f77bcf86cd799439011?t=nope", StatusCode::UNAUTHORIZED),
            ("/live/507f1f77bcf86cd799439012?t=secret", StatusCode::UNAUTHORIZED),
        ];
        for (uri, status) in cases {
            let response = app.clone().oneshot(push(uri, flv_body())).await.unwrap();
            assert_eq!(response.status(), status, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_conflict_when_already_live() {
        let (state, _store) = state(ServerConfig::default());
        let held = state
            .registry
            .register_if_absent(&StreamKey::new(PATH), account(), 99)
            .unwrap();

        let response = router(state.clone())
            .oneshot(push(&format!("{PATH}?t=secret"), flv_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // The live channel still belongs to its owner
        assert_eq!(
            state.registry.lookup(&StreamKey::new(PATH)).unwrap().publisher_id,
            99
        );
        held.remove();
    }

    #[tokio::test]
    async fn test_store_unavailable() {
        let (state, store) = state(ServerConfig::default());
        store.set_unavailable(true);

        let response = router(state)
            .oneshot(push(&format!("{PATH}?t=secret"), flv_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_publisher_limit() {
        let (state, _store) = state(ServerConfig::default().max_publishers(1));
        let _slot = state.acquire_publisher_slot().unwrap();

        let response = router(state)
            .oneshot(push(&format!("{PATH}?t=secret"), flv_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_garbage_body_ends_stream() {
        let (state, _store) = state(ServerConfig::default());
        let registry = Arc::clone(&state.registry);

        let response = router(state)
            .oneshot(push(&format!("{PATH}?t=secret"), b"definitely not flv".to_vec()))
            .await
            .unwrap();

        // Authenticated and registered, then the source failed
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.starts_with(b"stream failed"));
        assert_eq!(registry.channel_count(), 0);
    }
}
