//! # Server task
//!
//! Runs a [`SyncServer`] on its own tokio task. Requests arrive over an mpsc
//! channel with oneshot replies, and every accepted batch goes out on a
//! broadcast channel. A client subscribes while its connect request is
//! handled, so it sees exactly the commits after its snapshot.

use crate::client::ClientSession;
use crate::errors::{SyncError, SyncResult};
use crate::record::{DeltasRecord, Welcome};
use crate::server::SyncServer;
use massing_document::DocumentRecord;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const REQUEST_QUEUE: usize = 100;
const BROADCAST_CAPACITY: usize = 1024;

type Reply<T> = oneshot::Sender<T>;

enum Request {
    Connect {
        reply: Reply<SyncResult<(Welcome, broadcast::Receiver<DeltasRecord>)>>,
    },
    Disconnect {
        user_idx: u8,
        reply: Reply<bool>,
    },
    Submit {
        record: DeltasRecord,
        reply: Reply<SyncResult<DeltasRecord>>,
    },
    RecordsSince {
        hash: u32,
        reply: Reply<Option<Vec<DeltasRecord>>>,
    },
    Snapshot {
        reply: Reply<(DocumentRecord, u32)>,
    },
}

/// Cloneable handle to a running server task
#[derive(Debug, Clone)]
pub struct ServerHandle {
    requests: mpsc::Sender<Request>,
}

/// Start the server task; it stops and hands the server back once every
/// handle is dropped
pub fn spawn_server(server: SyncServer) -> (ServerHandle, JoinHandle<SyncServer>) {
    let (requests, receiver) = mpsc::channel(REQUEST_QUEUE);
    let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
    let task = tokio::spawn(run(server, receiver, broadcast));
    (ServerHandle { requests }, task)
}

async fn run(
    mut server: SyncServer,
    mut requests: mpsc::Receiver<Request>,
    broadcast: broadcast::Sender<DeltasRecord>,
) -> SyncServer {
    info!(hash = server.hash(), "sync server started");
    while let Some(request) = requests.recv().await {
        match request {
            Request::Connect { reply } => {
                let result = server.connect().map(|welcome| (welcome, broadcast.subscribe()));
                let _ = reply.send(result);
            }
            Request::Disconnect { user_idx, reply } => {
                let _ = reply.send(server.disconnect(user_idx));
            }
            Request::Submit { record, reply } => {
                let result = server.submit(record);
                if let Ok(accepted) = &result {
                    // No subscribers is not an error
                    let receivers = broadcast.send(accepted.clone()).unwrap_or(0);
                    debug!(receivers, hash = accepted.total_hash, "broadcast batch");
                }
                let _ = reply.send(result);
            }
            Request::RecordsSince { hash, reply } => {
                let _ = reply.send(server.records_since(hash).map(<[_]>::to_vec));
            }
            Request::Snapshot { reply } => {
                let _ = reply.send((server.document().to_record(), server.hash()));
            }
        }
    }
    info!(hash = server.hash(), "sync server stopped");
    server
}

impl ServerHandle {
    async fn call<T>(&self, request: impl FnOnce(Reply<T>) -> Request) -> SyncResult<T> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(request(reply))
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        response.await.map_err(|_| SyncError::ChannelClosed)
    }

    pub async fn connect(&self) -> SyncResult<(Welcome, broadcast::Receiver<DeltasRecord>)> {
        self.call(|reply| Request::Connect { reply }).await?
    }

    pub async fn disconnect(&self, user_idx: u8) -> SyncResult<bool> {
        self.call(|reply| Request::Disconnect { user_idx, reply }).await
    }

    pub async fn submit(&self, record: DeltasRecord) -> SyncResult<DeltasRecord> {
        self.call(|reply| Request::Submit { record, reply }).await?
    }

    pub async fn records_since(&self, hash: u32) -> SyncResult<Option<Vec<DeltasRecord>>> {
        self.call(|reply| Request::RecordsSince { hash, reply }).await
    }

    pub async fn snapshot(&self) -> SyncResult<(DocumentRecord, u32)> {
        self.call(|reply| Request::Snapshot { reply }).await
    }

    /// Bring a session that missed broadcasts back to the server's hash
    ///
    /// Replays the logged records after the session's verified hash, or
    /// reloads a snapshot when the log cannot bridge the gap.
    pub async fn recover(&self, session: &mut ClientSession) -> SyncResult<()> {
        if let Some(records) = self.records_since(session.verified_hash()).await? {
            match session.catch_up(&records) {
                Ok(()) => return Ok(()),
                Err(err) => warn!(%err, "catch-up failed, loading snapshot"),
            }
        }

        let (record, hash) = self.snapshot().await?;
        let welcome = Welcome {
            user_idx: session.user_idx(),
            record,
            hash,
        };
        session.resync(&welcome)
    }
}

/// Next broadcast record, with channel failures as sync errors
pub async fn recv_record(receiver: &mut broadcast::Receiver<DeltasRecord>) -> SyncResult<DeltasRecord> {
    match receiver.recv().await {
        Ok(record) => Ok(record),
        Err(broadcast::error::RecvError::Lagged(missed)) => Err(SyncError::Lagged(missed)),
        Err(broadcast::error::RecvError::Closed) => Err(SyncError::ChannelClosed),
    }
}
