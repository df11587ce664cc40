//! Courier terminal client entry point.
//!
//! # Usage
//!
//! ```bash
//! # Log in as alice against a local relay
//! courier alice
//!
//! # Remote relay, verbose logs
//! COURIER_SERVER=https://chat.example.com courier alice --log-level debug
//! ```

use clap::Parser;
use courier_app::{Runtime, SystemEnv};
use courier_cli::{CliError, WsDriver, console, websocket_endpoint};
use courier_client::{Directory, SyncConfig, rest::RestDirectory};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Courier terminal client
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Terminal client for the Courier relay")]
#[command(version)]
struct Args {
    /// Username to log in as (registered on first use)
    username: String,

    /// Relay base URL; the WebSocket endpoint is derived from it
    #[arg(short, long, env = "COURIER_SERVER", default_value = "http://localhost:8080")]
    server: String,

    /// Messages kept per channel (unbounded if omitted)
    #[arg(long)]
    history_limit: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout belongs to the console
    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    let directory = RestDirectory::new(&args.server);
    let user_id = directory.create_user_if_not_exists(args.username.clone()).await?;
    let identity = i64::try_from(user_id).map_err(|_| CliError::InvalidUserId(user_id))?;
    tracing::info!(user_id, username = %args.username, "logged in");

    let mut config = SyncConfig::default();
    config.connection.endpoint = websocket_endpoint(&args.server);
    config.store.max_per_channel = args.history_limit;

    let (runtime, handle, updates) = Runtime::new(WsDriver::default(), SystemEnv::new(), directory, config);
    let session = tokio::spawn(runtime.run(identity));

    console::run(handle, updates, user_id, std::io::stdout()).await?;
    session.await??;
    Ok(())
}
