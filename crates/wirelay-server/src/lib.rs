//! wirelay-server: the relay hub.
//!
//! Authenticates users by public key over SSH, multiplexes a per-user
//! control channel (chat, catalog sharing, transfer orchestration) and
//! ephemeral data channels (rendezvous-paired uploader/downloader streams),
//! and exposes a read-only HTTP status snapshot.

pub mod cli;
pub mod hub;
pub mod identity;
pub mod pairing;
pub mod registry;
pub mod session;
pub mod status;

pub use cli::Cli;
