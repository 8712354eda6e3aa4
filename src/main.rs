//! minikv server
//!
//! Parses command-line options, sets up logging and serves until Ctrl+C.

use clap::Parser;
use minikv::{Server, ServerConfig, DEFAULT_HOST, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// minikv server
#[derive(Parser, Debug)]
#[command(name = "minikv-server")]
#[command(about = "A small networked in-memory key-value store")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum concurrent connections
    #[arg(short, long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig::new(args.host, args.port, args.max_connections)
    }
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
minikv v{} - In-Memory Key-Value Store
──────────────────────────────────────
Server started on {} (max {} connections)
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        minikv::VERSION,
        config.bind_address(),
        config.max_connections
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from(Args::parse());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let server = Server::new(config);
    let listener = server.bind().await?;
    print_banner(server.config());

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            // Without a signal handler the server runs until killed
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    server.serve(listener, shutdown).await;

    info!("Server shutdown complete");
    Ok(())
}
