//! Subsystem-name parsing for channel classification.
//!
//! Two encodings reach the server for the same request: a native subsystem
//! request carrying the name itself, and an exec request whose command
//! string is `subsystem:<name>`. Both must be accepted to stay portable
//! across client SSH libraries.

use crate::constants::{
    CHAT_SUBSYSTEM, DATA_SUBSYSTEM_PREFIX, EXEC_SUBSYSTEM_PREFIX, TRANSFER_ID_HEX_LEN,
};

/// A recognized subsystem request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubsystemRequest {
    /// The per-user control channel.
    Chat,
    /// One data channel of a parallel transfer.
    DataTransfer {
        transfer_id: String,
        stream_index: u32,
    },
}

impl SubsystemRequest {
    /// Parse a native subsystem name.
    ///
    /// Data-channel names must carry exactly 32 hex digits and a decimal
    /// stream index; anything else is not recognized.
    pub fn parse(name: &str) -> Option<Self> {
        if name == CHAT_SUBSYSTEM {
            return Some(SubsystemRequest::Chat);
        }

        let rest = name.strip_prefix(DATA_SUBSYSTEM_PREFIX)?;
        let (id, index) = rest.split_once(':')?;

        if id.len() != TRANSFER_ID_HEX_LEN || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        // `u32::from_str` accepts a leading '+'; the wire format does not.
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let stream_index = index.parse().ok()?;

        Some(SubsystemRequest::DataTransfer {
            transfer_id: id.to_string(),
            stream_index,
        })
    }

    /// Parse the exec-request encoding (`subsystem:<name>`).
    pub fn parse_exec(command: &str) -> Option<Self> {
        Self::parse(command.strip_prefix(EXEC_SUBSYSTEM_PREFIX)?)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_ID: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn parses_chat() {
        assert_eq!(SubsystemRequest::parse("chat"), Some(SubsystemRequest::Chat));
    }

    #[test]
    fn parses_data_transfer() {
        let parsed = SubsystemRequest::parse(&format!("data-transfer:{VALID_ID}:7"));
        assert_eq!(
            parsed,
            Some(SubsystemRequest::DataTransfer {
                transfer_id: VALID_ID.to_string(),
                stream_index: 7,
            })
        );
    }

    #[test]
    fn accepts_uppercase_hex() {
        let id = VALID_ID.to_uppercase();
        assert!(SubsystemRequest::parse(&format!("data-transfer:{id}:0")).is_some());
    }

    #[test]
    fn parses_exec_encoding() {
        assert_eq!(
            SubsystemRequest::parse_exec("subsystem:chat"),
            Some(SubsystemRequest::Chat)
        );
        assert!(
            SubsystemRequest::parse_exec(&format!("subsystem:data-transfer:{VALID_ID}:12"))
                .is_some()
        );
    }

    #[test]
    fn exec_requires_prefix() {
        assert_eq!(SubsystemRequest::parse_exec("chat"), None);
        assert_eq!(SubsystemRequest::parse_exec("ls -la"), None);
    }

    #[test]
    fn rejects_bad_transfer_ids() {
        // Empty, short, and non-hex ids must not match.
        assert_eq!(SubsystemRequest::parse("data-transfer::0"), None);
        assert_eq!(SubsystemRequest::parse("data-transfer:abc:0"), None);
        let non_hex = "z".repeat(TRANSFER_ID_HEX_LEN);
        assert_eq!(
            SubsystemRequest::parse(&format!("data-transfer:{non_hex}:0")),
            None
        );
        let too_long = "a".repeat(TRANSFER_ID_HEX_LEN + 2);
        assert_eq!(
            SubsystemRequest::parse(&format!("data-transfer:{too_long}:0")),
            None
        );
    }

    #[test]
    fn rejects_bad_stream_indexes() {
        assert_eq!(SubsystemRequest::parse(&format!("data-transfer:{VALID_ID}:")), None);
        assert_eq!(
            SubsystemRequest::parse(&format!("data-transfer:{VALID_ID}:-1")),
            None
        );
        assert_eq!(
            SubsystemRequest::parse(&format!("data-transfer:{VALID_ID}:+1")),
            None
        );
        assert_eq!(
            SubsystemRequest::parse(&format!("data-transfer:{VALID_ID}:1:2")),
            None
        );
    }

    #[test]
    fn rejects_unrelated_names() {
        assert_eq!(SubsystemRequest::parse("sftp"), None);
        assert_eq!(SubsystemRequest::parse(""), None);
        assert_eq!(SubsystemRequest::parse("data-transfer"), None);
    }
}
