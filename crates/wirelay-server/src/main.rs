//! wirelay server binary entry point.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use wirelay_core::Result;
use wirelay_server::hub::ChatHub;
use wirelay_server::identity::IdentityStore;
use wirelay_server::pairing::StreamPairing;
use wirelay_server::registry::FileRegistry;
use wirelay_server::session::{self, ServerContext};
use wirelay_server::status::{self, StatusState};
use wirelay_server::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = wirelay_core::init_logging(cli.verbose, cli.log_file.as_deref(), cli.log_format.into()) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "wirelay-server starting");

    if let Err(e) = run(cli).await {
        error!(error = %e, "fatal startup error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Host key and identity store are load-bearing: either failing aborts
    // startup before the listeners come up.
    let host_key = session::load_host_key(&cli.host_key).await?;
    let identity = Arc::new(IdentityStore::load(&cli.identity_db)?);
    info!(
        nicknames = identity.len(),
        db = %cli.identity_db.display(),
        "identity store loaded"
    );

    let registry = Arc::new(FileRegistry::new());
    let hub = Arc::new(ChatHub::new(registry));
    let pairing = Arc::new(StreamPairing::new());

    let ssh_addr = cli.socket_addr();

    let status_state = StatusState::new(Arc::clone(&hub), ssh_addr.to_string());
    let status_addr = cli.status_addr;
    tokio::spawn(async move {
        if let Err(e) = status::serve(status_state, status_addr).await {
            error!(error = %e, "status service failed");
        }
    });

    let ctx = Arc::new(ServerContext {
        identity,
        hub,
        pairing,
    });

    info!(addr = %ssh_addr, "relay listening");
    session::run_ssh_listener(ctx, ssh_addr, host_key).await
}
