//! Subscriber writer: serves exactly one HTTP request for a stream.
//!
//! Grounded on the teacher's `webrtc_handler`/`ws` request-scoped task
//! shape (one task per connection, explicit teardown on exit) — the
//! streaming-body plumbing itself is axum-idiomatic rather than
//! teacher-derived, since the teacher has no long-lived streaming HTTP
//! response of its own.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream;
use tokio::sync::mpsc;

use crate::broker::{AddOutcome, BrokerHandle, Subscription};
use crate::stats::StreamStats;

/// Admit `remote` onto `broker` and, if admitted, stream packets back as
/// the HTTP response body until the broker closes the queue or the
/// client disconnects.
pub async fn serve(remote: SocketAddr, broker: BrokerHandle, capacity: usize, stats: Arc<StreamStats>) -> Response {
    match broker.add(remote, capacity).await {
        // Offline, over capacity, and inhibited all collapse to the same
        // client-visible outcome: this stream has nothing for you right now.
        AddOutcome::Rejected => StatusCode::NOT_FOUND.into_response(),
        AddOutcome::Admitted(subscription) => {
            let (body_tx, body_rx) = mpsc::channel::<Bytes>(capacity.max(1));
            tokio::spawn(run(subscription, broker, body_tx, stats));

            let body_stream = stream::unfold(body_rx, |mut rx| async move {
                rx.recv().await.map(|bytes| (Ok::<_, Infallible>(bytes), rx))
            });

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "video/mpeg")
                .header(header::LAST_MODIFIED, httpdate::fmt_http_date(SystemTime::now()))
                .header("Accept-Range", "none")
                .header(header::CACHE_CONTROL, "no-cache,no-store,no-transform")
                .body(Body::from_stream(body_stream))
                .expect("static header set is always a valid response")
        }
    }
}

/// Drains `subscription.packets` into `body_tx` until either side closes.
/// Owns the full teardown contract: the broker is told to forget this
/// subscriber only after the loop exits, whatever the reason.
async fn run(mut subscription: Subscription, broker: BrokerHandle, body_tx: mpsc::Sender<Bytes>, stats: Arc<StreamStats>) {
    // §4.F: duration runs from first byte to writer exit, not from task
    // spawn — a subscriber that never gets a byte before teardown (e.g.
    // removed by an `inhibit` before its first packet arrived) contributes
    // no idle wait time to the metric.
    let mut started: Option<Instant> = None;

    loop {
        match subscription.packets.recv().await {
            Some(packet) => {
                // A send buffer's own internal flushing is relied on
                // instead of flushing per packet here.
                if body_tx.send(Bytes::copy_from_slice(packet.as_ref())).await.is_err() {
                    break; // client vanished
                }
                started.get_or_insert_with(Instant::now);
            }
            None => break, // broker closed the queue: normal shutdown
        }
    }

    if let Some(started) = started {
        stats.add_stream_duration(started.elapsed());
    }
    broker.remove(subscription.id).await;
    while subscription.packets.try_recv().is_ok() {}
}
