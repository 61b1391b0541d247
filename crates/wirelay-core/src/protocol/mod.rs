//! Control-channel wire protocol.
//!
//! Messages travel as UTF-8, newline-delimited JSON objects of the form
//! `{"type": <string>, "payload": <object>}`. The payload schema depends on
//! the type; unknown types are tolerated by callers (logged and ignored),
//! which is why decoding happens in two stages: [`Envelope`] first, then the
//! typed payload.

mod message;
mod subsystem;
mod types;

pub use message::{
    encode_message, ChatBroadcastPayload, ChatMessagePayload, Envelope, GetFilePayload,
    NetworkStatsPayload, SearchPayload, SearchResultsPayload, SharePayload, TransferErrorPayload,
    TransferStartPayload, UploadDataPayload, UploadDonePayload, UploadErrorPayload,
    UploadRequestPayload, UserStatus,
};
pub use subsystem::SubsystemRequest;
pub use types::{SearchResult, SharedFile};
