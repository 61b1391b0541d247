//! Control-channel message envelope and payload schemas.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::types::{SearchResult, SharedFile};

// =============================================================================
// Envelope
// =============================================================================

/// First decoding stage for an inbound control message.
///
/// Payload parsing is deferred until the type is known so that unknown or
/// malformed types can be logged and dropped without disconnecting the
/// client.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Outbound frame: type tag plus payload, serialized in one shot.
#[derive(Debug, Serialize)]
struct Outbound<'a, P: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: &'a P,
}

/// Serialize one outbound control message to JSON bytes (no trailing
/// newline; the writer task appends it).
pub fn encode_message<P: Serialize>(kind: &str, payload: &P) -> Result<Vec<u8>> {
    serde_json::to_vec(&Outbound { kind, payload }).map_err(|e| Error::Protocol {
        message: format!("failed to encode '{kind}': {e}"),
    })
}

// =============================================================================
// Client-to-Server Payloads
// =============================================================================

/// `share` — replace the sender's catalog wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharePayload {
    pub files: Vec<SharedFile>,
}

/// `search` — case-insensitive substring search across all catalogs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPayload {
    pub query: String,
}

/// `get_file` — ask the relay to orchestrate a download from `peer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetFilePayload {
    pub file_name: String,
    pub peer: String,
}

/// `chat_message` — text to fan out to the other users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    pub text: String,
}

/// `upload_data` — legacy inline-base64 relay chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadDataPayload {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
    pub data: String,
}

/// `upload_done` — uploader finished sending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadDonePayload {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
}

/// `upload_error` — uploader aborted; relayed to the downloader as
/// `transfer_error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadErrorPayload {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
    pub message: String,
}

// =============================================================================
// Server-to-Client Payloads
// =============================================================================

/// `search_results` — reply to `search` and `top_files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultsPayload {
    pub results: Vec<SearchResult>,
}

/// One entry of `network_stats.users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatus {
    pub nickname: String,
    pub status: String,
}

/// `network_stats` — reply to `get_stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatsPayload {
    pub users: Vec<UserStatus>,
    pub relay_servers: u32,
    pub total_users: usize,
    pub active_transfers: usize,
    pub total_transfers: u64,
}

/// `chat_broadcast` / `system_broadcast` — fan-out chat line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBroadcastPayload {
    pub timestamp: String,
    #[serde(default)]
    pub nickname: String,
    pub text: String,
    pub is_system: bool,
}

/// `transfer_start` — tells the downloader its request was accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStartPayload {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
    pub file_name: String,
    pub size: u64,
    pub from_user: String,
}

/// `upload_request` — tells the uploader to start sending.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequestPayload {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
    pub file_name: String,
}

/// `transfer_error` — human-readable failure for one transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferErrorPayload {
    #[serde(rename = "transferID", default)]
    pub transfer_id: String,
    pub message: String,
}

// =============================================================================
// Tests
// =============================================================================
