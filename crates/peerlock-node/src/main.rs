//! `peerlock` command-line node.

use std::{io, process::ExitCode, time::Duration};

use clap::Parser;
use peerlock_core::{LivenessConfig, NodeId, PeerAddress};
use peerlock_node::{Node, NodeConfig, NodeError, TcpTransport, TokioEnv, prompt};
use tokio::{io::BufReader, task::JoinError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Peer-to-peer mutual exclusion node.
#[derive(Debug, Parser)]
#[command(name = "peerlock", version, about)]
struct Args {
    /// Unique id of this node
    #[arg(long)]
    id: NodeId,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:7000")]
    listen: String,

    /// Address peers should use to reach this node (defaults to the
    /// listening port on 127.0.0.1 when listening on all interfaces)
    #[arg(long)]
    advertise: Option<PeerAddress>,

    /// Peer to join on startup (repeatable)
    #[arg(long = "seed")]
    seeds: Vec<PeerAddress>,

    /// Heartbeat interval in milliseconds
    #[arg(long, default_value_t = 1_000)]
    heartbeat_ms: u64,

    /// Silence in milliseconds before a peer is evicted
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// Control loop poll interval in milliseconds
    #[arg(long, default_value_t = 50)]
    poll_ms: u64,
}

impl Args {
    fn config(&self, advertise: PeerAddress) -> NodeConfig {
        NodeConfig::new(self.id, advertise)
            .with_seeds(self.seeds.iter().cloned())
            .with_liveness(LivenessConfig {
                heartbeat_interval: Duration::from_millis(self.heartbeat_ms),
                timeout: Duration::from_millis(self.timeout_ms),
            })
            .with_poll_interval(Duration::from_millis(self.poll_ms))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so the prompt owns stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "peerlock exited");
            ExitCode::FAILURE
        },
    }
}

async fn run(args: Args) -> Result<(), NodeError> {
    let transport = TcpTransport::bind(&args.listen).await?;
    let local = transport.local_addr()?;
    let advertise = args.advertise.clone().unwrap_or_else(|| {
        let host = if local.ip().is_unspecified() {
            "127.0.0.1".to_string()
        } else {
            local.ip().to_string()
        };
        PeerAddress::new(host, local.port())
    });
    info!(%local, %advertise, "listening");

    let (node, handle) = Node::new(args.config(advertise), transport, TokioEnv);
    let mut node_task = tokio::spawn(node.run());

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        prompt_result = prompt::run(&handle, stdin, tokio::io::stdout()) => {
            // The loop may already be gone; its own result is what matters.
            let _ = handle.shutdown();
            let node_result = joined(node_task.await);
            prompt_result.and(node_result)
        },
        node_result = &mut node_task => joined(node_result),
    }
}

fn joined(result: Result<Result<(), NodeError>, JoinError>) -> Result<(), NodeError> {
    result.map_err(|e| NodeError::Io(io::Error::other(e)))?
}
