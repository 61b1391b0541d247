//! Read-only HTTP status snapshot.
//!
//! Two routes on a separate listener: `/api/status` returns the snapshot as
//! JSON, `/` renders the same snapshot as a small HTML page. Both derive
//! from one state capture taken under the hub's lock.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Local};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

use wirelay_core::Result;

use crate::hub::ChatHub;

/// Shared state for the status routes.
#[derive(Clone)]
pub struct StatusState {
    hub: Arc<ChatHub>,
    /// Advertised SSH listen address.
    listen_on: String,
    started_at: SystemTime,
    start_instant: Instant,
}

impl StatusState {
    pub fn new(hub: Arc<ChatHub>, listen_on: String) -> Self {
        Self {
            hub,
            listen_on,
            started_at: SystemTime::now(),
            start_instant: Instant::now(),
        }
    }

    async fn collect(&self) -> ServerStatus {
        // One hub snapshot covers every counter, so the page never mixes
        // two instants.
        let snapshot = self.hub.snapshot().await;
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        ServerStatus {
            hostname,
            address: self.listen_on.clone(),
            start_time: DateTime::<Local>::from(self.started_at).to_rfc3339(),
            uptime_seconds: self.start_instant.elapsed().as_secs(),
            total_users: snapshot.users.len(),
            users: snapshot.users,
            files_shared: snapshot.files_shared,
            transfers_in_flight: snapshot.transfers_in_flight,
            total_transfers: snapshot.total_transfers,
            relay_servers: 1,
        }
    }
}

/// Health and network info served by both routes.
#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub hostname: String,
    pub address: String,
    pub start_time: String,
    pub uptime_seconds: u64,
    pub total_users: usize,
    pub users: Vec<String>,
    pub files_shared: usize,
    pub transfers_in_flight: usize,
    pub total_transfers: u64,
    pub relay_servers: u32,
}

pub fn build_router(state: StatusState) -> Router {
    Router::new()
        .route("/", get(status_page))
        .route("/api/status", get(api_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the status listener and serve until it fails.
pub async fn serve(state: StatusState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "status service listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

async fn api_status(State(state): State<StatusState>) -> Json<ServerStatus> {
    Json(state.collect().await)
}

async fn status_page(State(state): State<StatusState>) -> Html<String> {
    Html(render_page(&state.collect().await))
}

fn render_page(status: &ServerStatus) -> String {
    let users = if status.users.is_empty() {
        "<li class=\"user\">nobody online</li>".to_string()
    } else {
        status
            .users
            .iter()
            .map(|nick| format!("<li class=\"user\">{} <span>online</span></li>", escape(nick)))
            .collect::<Vec<_>>()
            .join("\n      ")
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>wirelay relay status</title>
  <style>
  body {{ font-family: sans-serif; background: #1a1633; color: #eee; margin: 0; }}
  main {{ max-width: 640px; margin: 40px auto; padding: 24px; background: #29213c; border-radius: 12px; }}
  h1 {{ color: #ff6ec4; }}
  .stats {{ display: flex; gap: 12px; }}
  .stat {{ flex: 1; background: #1e1831; border-radius: 8px; padding: 16px; text-align: center; }}
  .stat b {{ display: block; font-size: 1.6rem; }}
  ul {{ list-style: none; padding: 0; }}
  .user {{ padding: 8px 12px; border-bottom: 1px solid #3d2f53; }}
  .user span {{ float: right; color: #1bbd6a; }}
  footer {{ color: #9787b8; font-size: 0.85rem; margin-top: 24px; }}
  </style>
</head>
<body>
  <main>
    <h1>wirelay</h1>
    <div class="stats">
      <div class="stat"><b>{total_users}</b>users online</div>
      <div class="stat"><b>{relay_servers}</b>relay servers</div>
      <div class="stat"><b>{in_flight}</b>active transfers</div>
      <div class="stat"><b>{total_transfers}</b>total transfers</div>
    </div>
    <h2>Users on the network</h2>
    <ul>
      {users}
    </ul>
    <footer>{hostname} &middot; {address} &middot; up {uptime}s &middot; {files} files shared</footer>
  </main>
</body>
</html>
"#,
        total_users = status.total_users,
        relay_servers = status.relay_servers,
        in_flight = status.transfers_in_flight,
        total_transfers = status.total_transfers,
        users = users,
        hostname = escape(&status.hostname),
        address = escape(&status.address),
        uptime = status.uptime_seconds,
        files = status.files_shared,
    )
}

/// Minimal HTML escaping for user-supplied strings.
fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FileRegistry;
    use wirelay_core::protocol::SharedFile;

    fn state_with_fixtures() -> StatusState {
        let registry = Arc::new(FileRegistry::new());
        registry.replace(
            "alice",
            vec![SharedFile {
                name: "song.flac".into(),
                size: 10,
                is_dir: false,
            }],
        );
        let hub = Arc::new(ChatHub::new(registry));
        StatusState::new(hub, "0.0.0.0:2222".into())
    }

    #[tokio::test]
    async fn api_status_reports_snapshot() {
        let state = state_with_fixtures();
        let Json(status) = api_status(State(state)).await;

        assert_eq!(status.address, "0.0.0.0:2222");
        assert_eq!(status.files_shared, 1);
        assert_eq!(status.total_users, 0);
        assert_eq!(status.transfers_in_flight, 0);
        assert_eq!(status.total_transfers, 0);
        assert_eq!(status.relay_servers, 1);
        assert!(!status.start_time.is_empty());
    }

    #[test]
    fn status_json_field_names() {
        let status = ServerStatus {
            hostname: "relay1".into(),
            address: "0.0.0.0:2222".into(),
            start_time: "2026-01-01T00:00:00Z".into(),
            uptime_seconds: 5,
            total_users: 1,
            users: vec!["alice".into()],
            files_shared: 2,
            transfers_in_flight: 3,
            total_transfers: 4,
            relay_servers: 1,
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["hostname"], "relay1");
        assert_eq!(value["uptime_seconds"], 5);
        assert_eq!(value["total_users"], 1);
        assert_eq!(value["files_shared"], 2);
        assert_eq!(value["transfers_in_flight"], 3);
        assert_eq!(value["total_transfers"], 4);
        assert_eq!(value["relay_servers"], 1);
    }

    #[test]
    fn page_escapes_nicknames() {
        let status = ServerStatus {
            hostname: "relay1".into(),
            address: "0.0.0.0:2222".into(),
            start_time: String::new(),
            uptime_seconds: 0,
            total_users: 1,
            users: vec!["<script>".into()],
            files_shared: 0,
            transfers_in_flight: 0,
            total_transfers: 0,
            relay_servers: 1,
        };
        let page = render_page(&status);
        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("<script>"));
    }
}
