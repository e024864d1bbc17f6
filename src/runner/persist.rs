//! Response persister.
//!
//! Request nodes enqueue each HTTP exchange on a shared bounded channel and
//! block until the consumer acknowledges persistence by dropping the
//! message's `done` sender. A single background task drains the channel,
//! writes records through the repository, and acks. Cancellation of the
//! runner stops the consumer after draining what is already queued.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::model::HttpResponseRecord;
use crate::repo::Repository;

/// One persisted exchange plus its ack handle.
#[derive(Debug)]
pub struct ResponseMsg {
    pub record: HttpResponseRecord,
    pub done: oneshot::Sender<()>,
}

pub type ResponseSender = mpsc::Sender<ResponseMsg>;

/// Channel capacity: worst-case loop expansion without head-of-line
/// blocking, floored at 10k.
pub fn response_channel_capacity(max_iter_count: usize, request_node_count: usize) -> usize {
    (max_iter_count
        .saturating_mul(request_node_count)
        .saturating_mul(2))
    .max(10_000)
    // keep the allocation bounded even for absurd loop counts
    .min(262_144)
}

/// Spawn the background consumer. Returns the producer side and the join
/// handle of the consumer task.
pub fn spawn_response_persister(
    repo: Arc<dyn Repository>,
    capacity: usize,
    cancel: CancellationToken,
) -> (ResponseSender, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<ResponseMsg>(capacity);

    let handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                msg = rx.recv() => msg,
                _ = cancel.cancelled() => {
                    // drain whatever producers already queued, then stop
                    rx.close();
                    while let Ok(msg) = rx.try_recv() {
                        persist_one(repo.as_ref(), msg).await;
                    }
                    break;
                }
            };
            match msg {
                Some(msg) => persist_one(repo.as_ref(), msg).await,
                None => break,
            }
        }
    });

    (tx, handle)
}

async fn persist_one(repo: &dyn Repository, msg: ResponseMsg) {
    if let Err(error) = repo.create_response(msg.record).await {
        warn!(%error, "failed to persist http response");
    }
    // ack regardless; the producer must not wedge on storage errors
    let _ = msg.done.send(());
}
