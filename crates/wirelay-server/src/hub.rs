//! The chat hub: per-user control sessions and transfer orchestration.
//!
//! The hub owns the online-clients table and the transfer table, both under
//! one lock. Each client runs exactly two tasks: a reader that parses
//! newline-delimited JSON and dispatches handlers, and a writer that drains
//! the bounded outbound queue. Broadcast and unicast snapshot their targets
//! under the lock and enqueue only after releasing it, so a slow consumer
//! can never stall registration or transfer accounting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use wirelay_core::constants::{OUTBOUND_QUEUE_DEPTH, TOP_FILES_LIMIT};
use wirelay_core::protocol::{
    encode_message, ChatBroadcastPayload, ChatMessagePayload, Envelope, GetFilePayload,
    NetworkStatsPayload, SearchPayload, SearchResultsPayload, SharePayload, TransferErrorPayload,
    TransferStartPayload, UploadDataPayload, UploadDonePayload, UploadErrorPayload,
    UploadRequestPayload, UserStatus,
};
use wirelay_core::{Error, Result};

use crate::registry::FileRegistry;

// =============================================================================
// Transfer Accounting
// =============================================================================

/// The hub's accounting entry for one in-flight download.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub id: String,
    pub file_name: String,
    pub size: u64,
    pub from_user: String,
    pub to_user: String,
    pub created_at: SystemTime,
}

/// Mint a fresh 128-bit transfer id, rendered as 32 hex digits.
fn mint_transfer_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

// =============================================================================
// Clients
// =============================================================================

/// One online client as the hub sees it.
struct ClientEntry {
    nickname: String,
    outbound: mpsc::Sender<Vec<u8>>,
    done_tx: watch::Sender<bool>,
    left: AtomicBool,
}

/// Handle returned by [`ChatHub::join`]; resolves once the client has
/// fully departed.
pub struct ClientHandle {
    done_rx: watch::Receiver<bool>,
}

impl ClientHandle {
    /// Wait for the client's departure.
    pub async fn done(mut self) {
        while !*self.done_rx.borrow() {
            if self.done_rx.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Read-only snapshot for the status service.
#[derive(Debug, Clone)]
pub struct HubSnapshot {
    pub users: Vec<String>,
    pub files_shared: usize,
    pub transfers_in_flight: usize,
    pub total_transfers: u64,
}

struct HubState {
    clients: HashMap<String, Arc<ClientEntry>>,
    transfers: HashMap<String, TransferRecord>,
    total_transfers: u64,
}

// =============================================================================
// ChatHub
// =============================================================================

/// Fans out control messages, drives the file registry, and orchestrates
/// transfers between endpoints.
pub struct ChatHub {
    registry: Arc<FileRegistry>,
    state: Mutex<HubState>,
}

impl ChatHub {
    pub fn new(registry: Arc<FileRegistry>) -> Self {
        Self {
            registry,
            state: Mutex::new(HubState {
                clients: HashMap::new(),
                transfers: HashMap::new(),
                total_transfers: 0,
            }),
        }
    }

    /// Register a control channel for `nickname` and start its reader and
    /// writer tasks.
    ///
    /// At most one session per nickname is live at a time: a reconnect
    /// evicts the prior session through the normal leave path, so the old
    /// client never sees messages addressed to the new one.
    pub async fn join<S>(self: &Arc<Self>, nickname: &str, stream: S) -> ClientHandle
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let (done_tx, done_rx) = watch::channel(false);
        let entry = Arc::new(ClientEntry {
            nickname: nickname.to_string(),
            outbound: outbound_tx,
            done_tx,
            left: AtomicBool::new(false),
        });

        let prior = {
            let mut state = self.state.lock().await;
            state
                .clients
                .insert(nickname.to_string(), Arc::clone(&entry))
        };
        if let Some(prior) = prior {
            warn!(nickname, "nickname already online, evicting prior session");
            self.leave(&prior).await;
        }

        let (read_half, write_half) = tokio::io::split(stream);
        tokio::spawn(writer_loop(
            write_half,
            outbound_rx,
            entry.done_tx.subscribe(),
        ));
        let hub = Arc::clone(self);
        let reader_entry = Arc::clone(&entry);
        tokio::spawn(async move {
            hub.reader_loop(reader_entry, read_half).await;
        });

        info!(nickname, "client joined");
        self.broadcast_system(format!("{nickname} joined the chat."), Some(nickname))
            .await;

        ClientHandle { done_rx }
    }

    /// Tear down a client. Idempotent: the reader ending and an external
    /// eviction may race, but the body runs at most once per client.
    async fn leave(self: &Arc<Self>, entry: &Arc<ClientEntry>) {
        if entry.left.swap(true, Ordering::SeqCst) {
            return;
        }

        self.registry.remove(&entry.nickname);
        {
            let mut state = self.state.lock().await;
            // A replacement session may already hold this nickname; only
            // remove the table entry if it is still ours.
            if let Some(current) = state.clients.get(&entry.nickname) {
                if Arc::ptr_eq(current, entry) {
                    state.clients.remove(&entry.nickname);
                }
            }
        }
        let _ = entry.done_tx.send(true);

        info!(nickname = %entry.nickname, "client left");
        self.broadcast_system(
            format!("{} left the chat.", entry.nickname),
            Some(&entry.nickname),
        )
        .await;
    }

    /// Snapshot for the status service. Every field, the catalog count
    /// included, is read while the hub lock is held, so the snapshot
    /// describes one instant.
    pub async fn snapshot(&self) -> HubSnapshot {
        let state = self.state.lock().await;
        let mut users: Vec<String> = state.clients.keys().cloned().collect();
        users.sort();
        HubSnapshot {
            users,
            files_shared: self.registry.total_files(),
            transfers_in_flight: state.transfers.len(),
            total_transfers: state.total_transfers,
        }
    }

    // =========================================================================
    // Per-client tasks
    // =========================================================================

    async fn reader_loop<R>(self: Arc<Self>, entry: Arc<ClientEntry>, read_half: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(read_half).lines();
        let mut done_rx = entry.done_tx.subscribe();

        loop {
            tokio::select! {
                _ = done_rx.changed() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        self.handle_line(&entry, &line).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(nickname = %entry.nickname, error = %e, "control channel read failed");
                        break;
                    }
                },
            }
        }

        self.leave(&entry).await;
    }

    // =========================================================================
    // Message dispatch
    // =========================================================================

    async fn handle_line(self: &Arc<Self>, entry: &Arc<ClientEntry>, line: &str) {
        let envelope: Envelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(nickname = %entry.nickname, error = %e, "malformed control message");
                return;
            }
        };
        debug!(nickname = %entry.nickname, kind = %envelope.kind, "control message");

        match envelope.kind.as_str() {
            "share" => {
                if let Some(p) = self.decode::<SharePayload>(entry, &envelope.kind, envelope.payload) {
                    self.registry.replace(&entry.nickname, p.files);
                }
            }
            "search" => {
                if let Some(p) = self.decode::<SearchPayload>(entry, &envelope.kind, envelope.payload) {
                    let results = self.registry.search(&p.query);
                    self.send(entry, "search_results", &SearchResultsPayload { results })
                        .await;
                }
            }
            "top_files" => {
                let results = self.registry.top(TOP_FILES_LIMIT);
                self.send(entry, "search_results", &SearchResultsPayload { results })
                    .await;
            }
            "get_stats" => {
                let stats = self.network_stats().await;
                self.send(entry, "network_stats", &stats).await;
            }
            "get_file" => {
                if let Some(p) = self.decode::<GetFilePayload>(entry, &envelope.kind, envelope.payload) {
                    self.initiate_transfer(entry, p.file_name, p.peer).await;
                }
            }
            "chat_message" => {
                if let Some(p) = self.decode::<ChatMessagePayload>(entry, &envelope.kind, envelope.payload) {
                    let payload = ChatBroadcastPayload {
                        timestamp: chat_timestamp(),
                        nickname: entry.nickname.clone(),
                        text: p.text,
                        is_system: false,
                    };
                    self.broadcast("chat_broadcast", &payload, Some(&entry.nickname))
                        .await;
                }
            }
            "upload_data" => {
                if let Some(p) = self.decode::<UploadDataPayload>(entry, &envelope.kind, envelope.payload) {
                    let id = p.transfer_id.clone();
                    self.relay_transfer(entry, "upload_data", &p, &id).await;
                }
            }
            "upload_done" => {
                if let Some(p) = self.decode::<UploadDonePayload>(entry, &envelope.kind, envelope.payload) {
                    let id = p.transfer_id.clone();
                    if self.relay_transfer(entry, "upload_done", &p, &id).await {
                        let mut state = self.state.lock().await;
                        state.transfers.remove(&id);
                        state.total_transfers += 1;
                    }
                }
            }
            "upload_error" => {
                if let Some(p) = self.decode::<UploadErrorPayload>(entry, &envelope.kind, envelope.payload) {
                    let relayed = TransferErrorPayload {
                        transfer_id: p.transfer_id.clone(),
                        message: p.message,
                    };
                    if self
                        .relay_transfer(entry, "transfer_error", &relayed, &p.transfer_id)
                        .await
                    {
                        let mut state = self.state.lock().await;
                        state.transfers.remove(&p.transfer_id);
                    }
                }
            }
            other => {
                warn!(nickname = %entry.nickname, kind = other, "unknown message type");
            }
        }
    }

    fn decode<T: DeserializeOwned>(
        &self,
        entry: &ClientEntry,
        kind: &str,
        payload: serde_json::Value,
    ) -> Option<T> {
        match serde_json::from_value(payload) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(nickname = %entry.nickname, kind, error = %e, "malformed payload");
                None
            }
        }
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    async fn initiate_transfer(&self, entry: &Arc<ClientEntry>, file_name: String, peer: String) {
        if peer == entry.nickname {
            self.send_transfer_error(entry, "", "You cannot download your own file.")
                .await;
            return;
        }

        let Some(file) = self.registry.lookup(&file_name, &peer) else {
            self.send_transfer_error(entry, "", "File not found or peer does not own it.")
                .await;
            return;
        };

        let id = mint_transfer_id();
        {
            let mut state = self.state.lock().await;
            state.transfers.insert(
                id.clone(),
                TransferRecord {
                    id: id.clone(),
                    file_name: file_name.clone(),
                    size: file.size,
                    from_user: peer.clone(),
                    to_user: entry.nickname.clone(),
                    created_at: SystemTime::now(),
                },
            );
        }
        info!(
            transfer = %id,
            from = %peer,
            to = %entry.nickname,
            file = %file_name,
            "transfer initiated"
        );

        self.send(
            entry,
            "transfer_start",
            &TransferStartPayload {
                transfer_id: id.clone(),
                file_name: file_name.clone(),
                size: file.size,
                from_user: peer.clone(),
            },
        )
        .await;

        // If the uploader is gone or backed up, the request drops here; the
        // requester will observe no progress and time out client-side. The
        // transfer record is intentionally not reaped.
        if let Err(e) = self
            .unicast(
                "upload_request",
                &UploadRequestPayload {
                    transfer_id: id.clone(),
                    file_name,
                },
                &peer,
            )
            .await
        {
            warn!(transfer = %id, peer = %peer, error = %e, "upload_request not delivered");
        }
    }

    /// Relay an `upload_*` control message to the transfer's downloader.
    ///
    /// The sender must be the transfer's from-user and the id must exist;
    /// this is the sole protection against peers impersonating one another.
    /// Violations are logged and dropped with no reply, so the transfer
    /// table leaks nothing to the sender. Returns whether the security
    /// check passed.
    async fn relay_transfer<P: Serialize>(
        &self,
        entry: &Arc<ClientEntry>,
        out_kind: &str,
        payload: &P,
        transfer_id: &str,
    ) -> bool {
        let to_user = {
            let state = self.state.lock().await;
            match state.transfers.get(transfer_id) {
                None => {
                    warn!(
                        nickname = %entry.nickname,
                        transfer = transfer_id,
                        "security: upload control for unknown transfer id"
                    );
                    return false;
                }
                Some(t) if t.from_user != entry.nickname => {
                    warn!(
                        nickname = %entry.nickname,
                        transfer = transfer_id,
                        expected = %t.from_user,
                        "security: upload control from wrong sender"
                    );
                    return false;
                }
                Some(t) => t.to_user.clone(),
            }
        };

        if let Err(e) = self.unicast(out_kind, payload, &to_user).await {
            warn!(transfer = transfer_id, to = %to_user, error = %e, "transfer relay not delivered");
        }
        true
    }

    async fn network_stats(&self) -> NetworkStatsPayload {
        let state = self.state.lock().await;
        let mut users: Vec<UserStatus> = state
            .clients
            .keys()
            .map(|nickname| UserStatus {
                nickname: nickname.clone(),
                status: "Online".to_string(),
            })
            .collect();
        users.sort_by(|a, b| a.nickname.cmp(&b.nickname));
        NetworkStatsPayload {
            total_users: users.len(),
            users,
            relay_servers: 1,
            active_transfers: state.transfers.len(),
            total_transfers: state.total_transfers,
        }
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Respond to the client that sent the current message. A full queue
    /// drops the reply; responses share the lossy chat policy.
    async fn send<P: Serialize>(&self, entry: &ClientEntry, kind: &str, payload: &P) {
        let msg = match encode_message(kind, payload) {
            Ok(msg) => msg,
            Err(e) => {
                error!(kind, error = %e, "failed to encode message");
                return;
            }
        };
        if entry.outbound.try_send(msg).is_err() {
            warn!(nickname = %entry.nickname, kind, "outbound queue full, dropping reply");
        }
    }

    async fn send_transfer_error(&self, entry: &ClientEntry, transfer_id: &str, message: &str) {
        self.send(
            entry,
            "transfer_error",
            &TransferErrorPayload {
                transfer_id: transfer_id.to_string(),
                message: message.to_string(),
            },
        )
        .await;
    }

    /// Deliver to exactly one online client. Transfer-control callers get a
    /// failure back when the target is offline or its queue is full, so the
    /// loss can be surfaced where it matters.
    async fn unicast<P: Serialize>(&self, kind: &str, payload: &P, to: &str) -> Result<()> {
        let msg = encode_message(kind, payload)?;
        let tx = {
            let state = self.state.lock().await;
            state.clients.get(to).map(|c| c.outbound.clone())
        };
        let Some(tx) = tx else {
            debug!(to, kind, "unicast target not online");
            return Err(Error::Delivery {
                nickname: to.to_string(),
            });
        };
        tx.try_send(msg).map_err(|_| {
            warn!(to, kind, "outbound queue full, dropping unicast");
            Error::Delivery {
                nickname: to.to_string(),
            }
        })
    }

    /// Fan out to every online client except `exclude`. Serialized once;
    /// targets are snapshotted under the lock and enqueued after releasing
    /// it. Overflow drops silently: chat is lossy under backpressure.
    async fn broadcast<P: Serialize>(&self, kind: &str, payload: &P, exclude: Option<&str>) {
        let msg = match encode_message(kind, payload) {
            Ok(msg) => msg,
            Err(e) => {
                error!(kind, error = %e, "failed to encode broadcast");
                return;
            }
        };

        let targets: Vec<mpsc::Sender<Vec<u8>>> = {
            let state = self.state.lock().await;
            state
                .clients
                .values()
                .filter(|c| exclude != Some(c.nickname.as_str()))
                .map(|c| c.outbound.clone())
                .collect()
        };

        for tx in targets {
            let _ = tx.try_send(msg.clone());
        }
    }

    async fn broadcast_system(&self, text: String, exclude: Option<&str>) {
        let payload = ChatBroadcastPayload {
            timestamp: chat_timestamp(),
            nickname: String::new(),
            text,
            is_system: true,
        };
        self.broadcast("system_broadcast", &payload, exclude).await;
    }
}

/// Writer task: drain the outbound queue onto the channel, one JSON record
/// per line. Exits when the done signal fires or the channel breaks.
async fn writer_loop<W>(
    mut write_half: W,
    mut outbound_rx: mpsc::Receiver<Vec<u8>>,
    mut done_rx: watch::Receiver<bool>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = done_rx.changed() => break,
            msg = outbound_rx.recv() => match msg {
                Some(mut buf) => {
                    buf.push(b'\n');
                    if write_half.write_all(&buf).await.is_err() {
                        break;
                    }
                    if write_half.flush().await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
    let _ = write_half.shutdown().await;
}

/// Wall-clock timestamp for chat lines, local `HH:MM`.
fn chat_timestamp() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

// =============================================================================
// Tests
// =============================================================================
