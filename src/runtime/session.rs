//! Stream reader tasks
//!
//! A reader owns one response body. It only moves bytes through the frame
//! decoder into the council's channel; all state changes happen on the
//! receiving side.

use crate::api::{ApiError, ByteStream};
use crate::conversation::SessionId;
use crate::protocol::{decode_frames, EventRecord};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One item read from a session's response body
#[derive(Debug)]
pub struct SessionMessage {
    pub session: SessionId,
    pub payload: SessionPayload,
}

#[derive(Debug)]
pub enum SessionPayload {
    Record(EventRecord),
    /// The body ended; sent after the last record
    Closed,
    /// The body broke off; nothing follows
    Failed(ApiError),
}

pub(crate) fn spawn_reader(
    session: SessionId,
    body: ByteStream,
    tx: mpsc::UnboundedSender<SessionMessage>,
) -> JoinHandle<()> {
    tokio::spawn(read_session(session, body, tx))
}

async fn read_session(
    session: SessionId,
    body: ByteStream,
    tx: mpsc::UnboundedSender<SessionMessage>,
) {
    let frames = decode_frames(body);
    futures::pin_mut!(frames);

    let mut records = 0usize;
    while let Some(item) = frames.next().await {
        let (payload, last) = match item {
            Ok(record) => {
                records += 1;
                (SessionPayload::Record(record), false)
            }
            Err(e) => {
                tracing::warn!(%session, records, error = %e, "Stream read failed");
                (SessionPayload::Failed(e), true)
            }
        };

        if tx.send(SessionMessage { session, payload }).is_err() {
            tracing::debug!(%session, "Council dropped, stopping reader");
            return;
        }
        if last {
            return;
        }
    }

    tracing::debug!(%session, records, "Stream body ended");
    let _ = tx.send(SessionMessage {
        session,
        payload: SessionPayload::Closed,
    });
}
