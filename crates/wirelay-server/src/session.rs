//! SSH session front-end.
//!
//! Authenticates each connection by public key against the identity store,
//! accepts session channels, and classifies each channel's first recognized
//! request as control (`chat`), data (`data-transfer:<id>:<index>`), or a
//! shell to refuse. Both the native subsystem framing and the
//! `subsystem:<name>` exec encoding are accepted; different client
//! libraries emit one or the other.
//!
//! The front-end is stateless across connections: everything per-user lives
//! in the chat hub.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::server::{Auth, Msg, Server, Session};
use russh::{Channel, ChannelId, MethodSet};
use russh_keys::key::{KeyPair, PublicKey};
use russh_keys::PublicKeyBase64;
use tracing::{debug, error, info, warn};

use wirelay_core::constants::SHELL_REFUSAL;
use wirelay_core::protocol::SubsystemRequest;
use wirelay_core::{Error, Result};

use crate::hub::ChatHub;
use crate::identity::{IdentityStore, RegisterOutcome};
use crate::pairing::{PairKey, StreamPairing};

/// Collaborators shared by every connection.
pub struct ServerContext {
    pub identity: Arc<IdentityStore>,
    pub hub: Arc<ChatHub>,
    pub pairing: Arc<StreamPairing>,
}

/// Read the host key from `path`, failing closed when it is absent.
pub async fn load_host_key(path: &Path) -> Result<KeyPair> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::HostKey {
                message: format!(
                    "host key {path} not found; generate with: ssh-keygen -t ed25519 -f {path}",
                    path = path.display()
                ),
            }
        } else {
            Error::HostKey {
                message: format!("failed to read host key {}: {e}", path.display()),
            }
        }
    })?;

    russh_keys::decode_secret_key(&contents, None).map_err(|e| Error::HostKey {
        message: format!("failed to parse host key {}: {e}", path.display()),
    })
}

/// Run the SSH accept loop until the listener fails.
pub async fn run_ssh_listener(
    ctx: Arc<ServerContext>,
    addr: SocketAddr,
    host_key: KeyPair,
) -> Result<()> {
    let config = russh::server::Config {
        methods: MethodSet::PUBLICKEY,
        keys: vec![host_key],
        auth_rejection_time: Duration::from_secs(1),
        auth_rejection_time_initial: Some(Duration::ZERO),
        ..Default::default()
    };

    let mut server = RelayServer { ctx };
    server
        .run_on_address(Arc::new(config), addr)
        .await
        .map_err(|e| Error::Transport {
            message: format!("ssh listener failed: {e}"),
        })
}

/// Factory handing one [`SshSession`] to each inbound connection.
struct RelayServer {
    ctx: Arc<ServerContext>,
}

impl Server for RelayServer {
    type Handler = SshSession;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> SshSession {
        SshSession {
            ctx: Arc::clone(&self.ctx),
            peer_addr,
            nickname: None,
            channels: HashMap::new(),
        }
    }
}

/// Per-connection handler state.
pub struct SshSession {
    ctx: Arc<ServerContext>,
    peer_addr: Option<SocketAddr>,
    /// Authenticated nickname (the SSH user field).
    nickname: Option<String>,
    /// Session channels whose role is not yet determined.
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl SshSession {
    /// Activate a classified channel: reply success and hand it off.
    fn start_subsystem(
        &mut self,
        request: SubsystemRequest,
        channel_id: ChannelId,
        session: &mut Session,
    ) {
        let Some(nickname) = self.nickname.clone() else {
            session.channel_failure(channel_id);
            return;
        };
        let Some(channel) = self.channels.remove(&channel_id) else {
            // Already consumed by an earlier request on the same channel.
            session.channel_failure(channel_id);
            return;
        };
        session.channel_success(channel_id);

        match request {
            SubsystemRequest::Chat => {
                info!(nickname = %nickname, "chat subsystem accepted");
                let hub = Arc::clone(&self.ctx.hub);
                tokio::spawn(async move {
                    let handle = hub.join(&nickname, channel.into_stream()).await;
                    handle.done().await;
                    debug!(nickname = %nickname, "control channel finished");
                });
            }
            SubsystemRequest::DataTransfer {
                transfer_id,
                stream_index,
            } => {
                let key = PairKey {
                    transfer_id,
                    stream_index,
                };
                info!(nickname = %nickname, key = %key, "data subsystem accepted");
                self.ctx.pairing.pair(key, Box::new(channel.into_stream()));
            }
        }
    }
}

#[async_trait]
impl russh::server::Handler for SshSession {
    type Error = russh::Error;

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> std::result::Result<Auth, Self::Error> {
        if user.is_empty() {
            warn!(addr = ?self.peer_addr, "rejecting login without a nickname");
            return Ok(Auth::Reject {
                proceed_with_methods: None,
            });
        }

        let key_b64 = public_key.public_key_base64();
        match self.ctx.identity.register_or_check(user, &key_b64) {
            Ok(outcome) => {
                if outcome == RegisterOutcome::Bound {
                    // The in-memory binding holds for the process lifetime
                    // even if persisting it fails.
                    if let Err(e) = self.ctx.identity.save().await {
                        error!(error = %e, "failed to persist identity store");
                    }
                }
                self.nickname = Some(user.to_string());
                info!(nickname = user, addr = ?self.peer_addr, "public key accepted");
                Ok(Auth::Accept)
            }
            Err(e) => {
                warn!(nickname = user, error = %e, "rejecting login");
                Ok(Auth::Reject {
                    proceed_with_methods: None,
                })
            }
        }
    }

    async fn auth_password(
        &mut self,
        user: &str,
        _password: &str,
    ) -> std::result::Result<Auth, Self::Error> {
        debug!(nickname = user, "password auth rejected");
        Ok(Auth::Reject {
            proceed_with_methods: Some(MethodSet::PUBLICKEY),
        })
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        match SubsystemRequest::parse(name) {
            Some(request) => self.start_subsystem(request, channel_id, session),
            None => {
                debug!(name, "unknown subsystem requested");
                session.channel_failure(channel_id);
            }
        }
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel_id: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data);
        match SubsystemRequest::parse_exec(&command) {
            Some(request) => self.start_subsystem(request, channel_id, session),
            None => {
                debug!(command = %command, "unsupported exec request");
                session.channel_failure(channel_id);
            }
        }
        Ok(())
    }

    async fn pty_request(
        &mut self,
        channel_id: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        // Not a terminal server; the channel stays open for a real request.
        session.channel_failure(channel_id);
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel_id: ChannelId,
        _variable_name: &str,
        _variable_value: &str,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        session.channel_failure(channel_id);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel_id: ChannelId,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        session.channel_success(channel_id);
        if let Some(mut channel) = self.channels.remove(&channel_id) {
            debug!(nickname = ?self.nickname, "refusing shell request");
            tokio::spawn(async move {
                let _ = channel.data(SHELL_REFUSAL.as_bytes()).await;
                let _ = channel.eof().await;
                let _ = channel.close().await;
            });
        }
        Ok(())
    }
}
