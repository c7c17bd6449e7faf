//! Line-oriented text prompt.
//!
//! [`parse`] turns one input line into a [`Command`]; [`run`] drives a
//! [`NodeHandle`] from any async line source and writes replies to any async
//! sink, so the prompt can be exercised without a terminal.

use peerlock_core::NodeState;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::watch,
};

use crate::{NodeError, NodeHandle};

const HELP: &str = "\
commands:
  acquire, a    request the critical section
  release, r    leave the critical section
  peers, ls     list known peers
  status        show this node's state
  help          show this text
  quit, q       stop the node
";

const ENTERED: &str = "HELD: critical section acquired\n";

/// Parsed command from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request the critical section
    Acquire,
    /// Leave the critical section
    Release,
    /// List known peers
    Peers,
    /// Show local state
    Status,
    /// Show usage
    Help,
    /// Stop the node
    Quit,
    /// Blank line
    Empty,
    /// Anything else
    Unknown {
        /// The original input
        input: String,
    },
}

/// Parse a user input line into a command.
pub fn parse(input: &str) -> Command {
    let input = input.trim();

    match input.to_ascii_lowercase().as_str() {
        "" => Command::Empty,
        "acquire" | "a" => Command::Acquire,
        "release" | "r" => Command::Release,
        "peers" | "ls" => Command::Peers,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        _ => Command::Unknown { input: input.to_string() },
    }
}

/// Serve commands from `input` until it ends or `quit` is entered.
///
/// `acquire` answers as soon as the request is out; entry into the critical
/// section is announced separately whenever it happens, so every command
/// stays available while the node waits. Rejected intents are reported and
/// the prompt continues; anything else (the node stopped, stdio failed) ends
/// the prompt with an error.
pub async fn run<R, W>(handle: &NodeHandle, input: R, mut output: W) -> Result<(), NodeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut states = handle.subscribe();
    let mut waiting = false;
    output.write_all(HELP.as_bytes()).await?;
    output.flush().await?;

    loop {
        let reply = tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse(&line) {
                    Command::Quit => break,
                    Command::Empty => continue,
                    command => serve(handle, command, &mut states, &mut waiting).await?,
                }
            },
            changed = states.changed(), if waiting => {
                changed.map_err(|_| NodeError::QueueClosed)?;
                if *states.borrow_and_update() != NodeState::Held {
                    continue;
                }
                waiting = false;
                ENTERED.to_string()
            },
        };

        output.write_all(reply.as_bytes()).await?;
        output.flush().await?;
    }

    Ok(())
}

async fn serve(
    handle: &NodeHandle,
    command: Command,
    states: &mut watch::Receiver<NodeState>,
    waiting: &mut bool,
) -> Result<String, NodeError> {
    let reply = match command {
        Command::Acquire => match handle.acquire().await {
            Ok(()) => {
                if *states.borrow_and_update() == NodeState::Held {
                    ENTERED.to_string()
                } else {
                    *waiting = true;
                    "WANTED: request sent, waiting for grants\n".to_string()
                }
            },
            Err(NodeError::Rejected(e)) => format!("error: {e}\n"),
            Err(e) => return Err(e),
        },
        Command::Release => match handle.release().await {
            Ok(()) => "RELEASED\n".to_string(),
            Err(NodeError::Rejected(e)) => format!("error: {e}\n"),
            Err(e) => return Err(e),
        },
        Command::Peers => {
            let peers = handle.peers().await?;
            if peers.is_empty() {
                "no peers\n".to_string()
            } else {
                peers
                    .iter()
                    .map(|peer| {
                        let address = peer.address.to_string();
                        format!(
                            "  {:>6}  {address:<24} granted={:<5} idle={:.1}s\n",
                            peer.id,
                            peer.granted,
                            peer.idle.as_secs_f64()
                        )
                    })
                    .collect()
            }
        },
        Command::Status => format!("node {}: {}\n", handle.id(), handle.state()),
        Command::Help => HELP.to_string(),
        Command::Quit | Command::Empty => String::new(),
        Command::Unknown { input } => format!("unknown command: {input} (try 'help')\n"),
    };
    Ok(reply)
}
