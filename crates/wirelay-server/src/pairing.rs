//! Rendezvous pairing for data channels.
//!
//! Each data channel arrives tagged with `(transfer_id, stream_index)`. The
//! first arrival for a key parks; the second triggers a bidirectional
//! splice between the two. The manager never inspects or buffers payload
//! bytes, so relay memory stays proportional to users, not data. A parked
//! channel whose peer never shows up is closed by a watchdog.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use wirelay_core::constants::PAIRING_TIMEOUT;

/// Object-safe bound for the streams the manager splices.
pub trait PairableStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> PairableStream for T {}

/// A boxed data-channel stream.
pub type DataStream = Box<dyn PairableStream>;

/// Rendezvous key: one per (transfer, substream) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    pub transfer_id: String,
    pub stream_index: u32,
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transfer_id, self.stream_index)
    }
}

/// A first arrival waiting for its peer. The token distinguishes this
/// parked stream from a later arrival that reused the key after expiry.
struct Parked {
    token: u64,
    stream: DataStream,
}

/// Pairs data channels by key and splices them.
pub struct StreamPairing {
    pending: Mutex<HashMap<PairKey, Parked>>,
    timeout: Duration,
    next_token: AtomicU64,
}

impl StreamPairing {
    pub fn new() -> Self {
        Self::with_timeout(PAIRING_TIMEOUT)
    }

    /// Timeout override for tests.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
            next_token: AtomicU64::new(1),
        }
    }

    /// Hand a data channel to the rendezvous.
    ///
    /// If a peer is already parked under `key`, both streams are spliced on
    /// a background task. Otherwise this stream parks and a watchdog closes
    /// it after the timeout unless the peer arrives first. Different keys
    /// are fully independent; an arrival for an already-paired key simply
    /// parks anew and itself times out.
    pub fn pair(self: &Arc<Self>, key: PairKey, stream: DataStream) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match pending.remove(&key) {
            Some(parked) => {
                drop(pending);
                info!(key = %key, "pairing data streams");
                tokio::spawn(splice(parked.stream, stream, key));
            }
            None => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                pending.insert(key.clone(), Parked { token, stream });
                drop(pending);
                let this = Arc::clone(self);
                let expire_key = key.clone();
                tokio::spawn(async move {
                    this.expire(expire_key, token).await;
                });
                debug!(key = %key, "data stream parked, waiting for peer");
            }
        }
    }

    /// Number of streams currently parked.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Watchdog: evict and close the parked stream if it is still the same
    /// one (token match) when the deadline fires.
    async fn expire(self: Arc<Self>, key: PairKey, token: u64) {
        tokio::time::sleep(self.timeout).await;

        let evicted = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            match pending.get(&key) {
                Some(parked) if parked.token == token => pending.remove(&key),
                _ => None,
            }
        };

        if let Some(parked) = evicted {
            warn!(key = %key, "no peer arrived in time, closing parked stream");
            let mut stream = parked.stream;
            let _ = stream.shutdown().await;
        }
    }
}

impl Default for StreamPairing {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy bytes in both directions between two paired streams.
///
/// Whichever direction finishes first, cleanly or not, wins the race; the
/// loser is dropped and both write sides are shut down. Running the close
/// after the race, on the task that owns both streams, is what guarantees
/// it happens exactly once.
async fn splice(a: DataStream, b: DataStream, key: PairKey) {
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let result = tokio::select! {
        r = tokio::io::copy(&mut a_read, &mut b_write) => r,
        r = tokio::io::copy(&mut b_read, &mut a_write) => r,
    };

    let _ = a_write.shutdown().await;
    let _ = b_write.shutdown().await;

    match result {
        Ok(bytes) => debug!(key = %key, bytes, "splice finished"),
        Err(e) => debug!(key = %key, error = %e, "splice ended with error"),
    }
}

// =============================================================================
// Tests
// =============================================================================
