//! HTTP-FLV playback
//!
//! `GET /<prefix>/<accountId>` streams the live channel at that path as
//! `video/x-flv`. Every response allows any origin so browser players can
//! fetch it cross-site.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::account::AccountGateway;
use crate::error::Error;
use crate::session::{FlvSink, PlaySession};

use super::ServerState;

/// Content type of the playback stream
pub const FLV_CONTENT_TYPE: &str = "video/x-flv";

/// Playback router
pub fn router<G: AccountGateway>(state: ServerState<G>) -> Router {
    Router::new()
        .route("/{*path}", get(play::<G>))
        .fallback(not_found)
        .layer(middleware::map_response(allow_any_origin))
        .with_state(state)
}

async fn allow_any_origin(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn play<G: AccountGateway>(State(state): State<ServerState<G>>, uri: Uri) -> Response {
    let session_id = state.next_session_id();
    let mut session = PlaySession::new(
        session_id,
        Arc::clone(&state.registry),
        Arc::clone(&state.gateway),
    );

    let channel = match session.locate(uri.path()) {
        Ok(channel) => channel,
        Err(Error::MalformedIdentifier(_)) => {
            return (StatusCode::BAD_REQUEST, "wrong account ID").into_response();
        }
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    let (sink, chunks) = FlvSink::channel(state.config.viewer_buffer);

    // The body drains `chunks`; dropping the response closes the sink
    tokio::spawn(async move {
        let report = session.stream(channel, sink).await;
        tracing::debug!(
            session_id,
            stream = %report.key,
            packets = report.packets,
            skipped = report.skipped,
            end = ?report.end,
            "Viewer connection closed"
        );
    });

    let body = Body::from_stream(ReceiverStream::new(chunks).map(Ok::<_, Infallible>));
    ([(header::CONTENT_TYPE, FLV_CONTENT_TYPE)], body).into_response()
}
