//! Demo worker: serves the dispatch and greeting subjects as a member of
//! the default queue group, then drains cleanly on Ctrl-C.
//!
//! Start it against a broker:
//!
//! ```text
//! worker --token s3cr3t --endpoint broker.internal:4222
//! ```

use anyhow::Result;
use bytes::Bytes;
use clap::Parser;
use machina_net::{ConnectConfig, Connection, RpcServer, ShutdownCoordinator};
use tracing::info;

#[derive(Parser)]
#[command(name = "worker", about = "Queue-group worker for machina RPC")]
struct Args {
    /// Token credential for the broker session
    #[arg(long)]
    token: String,

    /// Broker endpoint, host:port
    #[arg(long)]
    endpoint: String,

    /// Skip TLS certificate verification (test/dev only)
    #[arg(long)]
    insecure: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ConnectConfig::new(args.token, args.endpoint);
    if args.insecure {
        config = config.danger_skip_verify();
    }

    let shutdown = ShutdownCoordinator::new();
    let conn = Connection::open_managed(config, &shutdown).await?;
    let server = RpcServer::new(&conn);

    // Route dispatch requests to the default worker.
    let dispatch = server
        .serve("workers.*", |subject, payload| async move {
            info!(subject, payload = %String::from_utf8_lossy(&payload), "dispatch request");
            Bytes::from_static(br#"{"worker":"worker.default"}"#)
        })
        .await?;
    shutdown.defer(move || async move { dispatch.stop() });

    // Greet whoever lands on the default worker.
    let greeter = server
        .serve("worker.default.*", |subject, payload| async move {
            info!(subject, payload = %String::from_utf8_lossy(&payload), "greeting request");
            let caller = subject.rsplit('.').next().unwrap_or("stranger");
            Bytes::from(format!("{{\"msg\":\"Hello, {caller}\"}}"))
        })
        .await?;
    shutdown.defer(move || async move { greeter.stop() });

    info!("worker ready; Ctrl-C to drain and exit");
    tokio::signal::ctrl_c().await?;
    shutdown.run().await;
    Ok(())
}
