//! Protocol and configuration constants for wirelay.

use std::time::Duration;

// =============================================================================
// Subsystem Names
// =============================================================================

/// Subsystem name for the control channel.
pub const CHAT_SUBSYSTEM: &str = "chat";

/// Prefix of the data-channel subsystem name (`data-transfer:<id>:<index>`).
pub const DATA_SUBSYSTEM_PREFIX: &str = "data-transfer:";

/// Prefix some client libraries use to smuggle a subsystem name through an
/// exec request (`subsystem:<name>`).
pub const EXEC_SUBSYSTEM_PREFIX: &str = "subsystem:";

// =============================================================================
// Protocol Constants
// =============================================================================

/// Length of a transfer id rendered as hex digits (128 bits).
pub const TRANSFER_ID_HEX_LEN: usize = 32;

/// Line written to shell channels before closing them.
pub const SHELL_REFUSAL: &str = "wirelay shell not implemented. Closing session.\n";

/// How many results `top_files` returns.
pub const TOP_FILES_LIMIT: usize = 50;

// =============================================================================
// Limits
// =============================================================================

/// Depth of each client's bounded outbound queue. Chat fan-out drops on
/// overflow; transfer-control unicast reports the overflow to its caller.
pub const OUTBOUND_QUEUE_DEPTH: usize = 16;

// =============================================================================
// Timing Constants
// =============================================================================

/// How long an unpaired data channel may wait for its peer.
pub const PAIRING_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Defaults
// =============================================================================

/// Default SSH listen port.
pub const DEFAULT_SSH_PORT: u16 = 2222;

/// Default bind address for the status HTTP listener.
pub const DEFAULT_STATUS_ADDR: &str = "127.0.0.1:8080";

/// Default host key path.
pub const DEFAULT_HOST_KEY_FILE: &str = "server_ed25519";

/// Default identity store path.
pub const DEFAULT_IDENTITY_DB_FILE: &str = "nicks.db";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_id_is_128_bits_of_hex() {
        assert_eq!(TRANSFER_ID_HEX_LEN, 32);
    }

    #[test]
    fn outbound_queue_meets_minimum_bound() {
        assert!(OUTBOUND_QUEUE_DEPTH >= 16);
    }

    #[test]
    fn pairing_timeout_is_thirty_seconds() {
        assert_eq!(PAIRING_TIMEOUT, Duration::from_secs(30));
    }
}
