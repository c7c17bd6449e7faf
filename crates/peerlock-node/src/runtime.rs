//! Single-owner control loop.
//!
//! ```text
//!  accept task ──> reader tasks ──┐
//!                                 ├──> mpsc queue ──> Node (owns Coordinator)
//!  NodeHandle (prompt, tests) ────┘                         │
//!                                                           ├──> Outbound writers
//!                                                           └──> watch<NodeState>
//! ```
//!
//! Only the loop touches the [`Coordinator`]. Every other task talks to it
//! through the queue, so protocol state needs no locks.

use std::{ops::ControlFlow, sync::Arc};

use peerlock_core::{
    Coordinator, CoordinatorError, Environment, NodeAction, NodeId, NodeState, PeerSnapshot,
    Transport,
};
use peerlock_proto::Payload;
use tokio::{
    io::AsyncRead,
    sync::{mpsc, oneshot, watch},
};
use tracing::{debug, error, info, warn};

use crate::{NodeConfig, NodeError, codec::read_frame, outbound::Outbound};

/// Reply channel for an intent the coordinator may reject.
type IntentReply = oneshot::Sender<Result<(), CoordinatorError>>;

/// Everything the control loop consumes.
#[derive(Debug)]
pub enum NodeEvent {
    /// Decoded message from a peer
    Inbound(Payload),
    /// Local request for the critical section
    Acquire(IntentReply),
    /// Local release of the critical section
    Release(IntentReply),
    /// Local request for the peer listing
    Peers(oneshot::Sender<Vec<PeerSnapshot>>),
    /// Stop the loop
    Shutdown,
}

/// A running peerlock node.
pub struct Node<T: Transport, E: Environment> {
    config: NodeConfig,
    coordinator: Coordinator,
    env: E,
    transport: Arc<T>,
    outbound: Outbound<T>,
    events_tx: mpsc::UnboundedSender<NodeEvent>,
    events_rx: mpsc::UnboundedReceiver<NodeEvent>,
    state_tx: watch::Sender<NodeState>,
}

impl<T: Transport, E: Environment> Node<T, E> {
    /// Create a node over an already bound transport.
    pub fn new(config: NodeConfig, transport: T, env: E) -> (Self, NodeHandle) {
        let coordinator = Coordinator::new(config.id, config.advertise.clone(), config.liveness);
        let transport = Arc::new(transport);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(NodeState::Released);

        let handle = NodeHandle { id: config.id, events: events_tx.clone(), state: state_rx };
        let node = Self {
            outbound: Outbound::new(Arc::clone(&transport)),
            config,
            coordinator,
            env,
            transport,
            events_tx,
            events_rx,
            state_tx,
        };
        (node, handle)
    }

    /// Run until shutdown or a fatal coordinator error.
    pub async fn run(mut self) -> Result<(), NodeError> {
        info!(node = self.config.id, address = %self.config.advertise, "node starting");

        let acceptor =
            tokio::spawn(accept_loop(Arc::clone(&self.transport), self.events_tx.clone()));
        let result = self.control_loop().await;
        acceptor.abort();
        result
    }

    async fn control_loop(&mut self) -> Result<(), NodeError> {
        let announce = self.coordinator.announce(&self.config.seeds);
        self.execute(announce);

        loop {
            let actions = self.coordinator.tick(self.env.now()).map_err(|e| {
                error!(node = self.config.id, error = %e, "control loop stopped");
                NodeError::from(e)
            })?;
            self.execute(actions);

            for _ in 0..self.config.max_batch {
                let Ok(event) = self.events_rx.try_recv() else {
                    break;
                };
                if self.handle_event(event)?.is_break() {
                    info!(node = self.config.id, "node shutting down");
                    return Ok(());
                }
            }

            self.env.sleep(self.config.poll_interval).await;
        }
    }

    /// Apply one event. Fatal intent failures are answered, then stop the
    /// loop.
    fn handle_event(&mut self, event: NodeEvent) -> Result<ControlFlow<()>, NodeError> {
        let now = self.env.now();
        let (reply, result) = match event {
            NodeEvent::Inbound(payload) => {
                let actions = self.coordinator.handle_payload(payload, now);
                self.execute(actions);
                return Ok(ControlFlow::Continue(()));
            },
            NodeEvent::Acquire(reply) => {
                (reply, self.coordinator.acquire(now).map(|actions| self.execute(actions)))
            },
            NodeEvent::Release(reply) => {
                (reply, self.coordinator.release(now).map(|actions| self.execute(actions)))
            },
            NodeEvent::Peers(reply) => {
                let _ = reply.send(self.coordinator.peers(now));
                return Ok(ControlFlow::Continue(()));
            },
            NodeEvent::Shutdown => return Ok(ControlFlow::Break(())),
        };

        let fatal = result.as_ref().err().filter(|e| e.is_fatal()).cloned();
        let _ = reply.send(result);
        match fatal {
            Some(e) => {
                error!(node = self.config.id, error = %e, "control loop stopped");
                Err(NodeError::from(e))
            },
            None => Ok(ControlFlow::Continue(())),
        }
    }

    fn execute(&mut self, actions: Vec<NodeAction>) {
        for action in actions {
            match action {
                NodeAction::Send { peer, address, payload } => match payload.into_frame() {
                    Ok(frame) => self.outbound.send(&address, frame),
                    Err(e) => warn!(?peer, %address, error = %e, "failed to encode payload"),
                },
                NodeAction::Disconnect { peer, address } => {
                    debug!(peer, %address, "disconnecting evicted peer");
                    self.outbound.disconnect(&address);
                },
                NodeAction::StateChanged { to, .. } => {
                    self.state_tx.send_replace(to);
                },
            }
        }
    }
}

async fn accept_loop<T: Transport>(transport: Arc<T>, events: mpsc::UnboundedSender<NodeEvent>) {
    loop {
        match transport.accept().await {
            Ok((stream, remote)) => {
                debug!(%remote, "inbound connection");
                tokio::spawn(read_loop(stream, remote, events.clone()));
            },
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::task::yield_now().await;
            },
        }
    }
}

async fn read_loop<S>(mut stream: S, remote: String, events: mpsc::UnboundedSender<NodeEvent>)
where
    S: AsyncRead + Unpin,
{
    loop {
        let frame = match read_frame(&mut stream).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(%remote, "connection closed");
                return;
            },
            Err(e) => {
                warn!(%remote, error = %e, "bad frame, closing connection");
                return;
            },
        };

        match Payload::from_frame(&frame) {
            Ok(payload) => {
                if events.send(NodeEvent::Inbound(payload)).is_err() {
                    return;
                }
            },
            Err(e) => {
                warn!(%remote, error = %e, "malformed payload, closing connection");
                return;
            },
        }
    }
}

/// Cloneable handle for local intents.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    id: NodeId,
    events: mpsc::UnboundedSender<NodeEvent>,
    state: watch::Receiver<NodeState>,
}

impl NodeHandle {
    /// Id of the node behind this handle.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Last published state.
    pub fn state(&self) -> NodeState {
        *self.state.borrow()
    }

    /// Ask for the critical section. Returns once the request is broadcast;
    /// use [`NodeHandle::wait_for`] to wait for entry.
    pub async fn acquire(&self) -> Result<(), NodeError> {
        let (tx, rx) = oneshot::channel();
        self.submit(NodeEvent::Acquire(tx))?;
        rx.await.map_err(|_| NodeError::QueueClosed)?.map_err(NodeError::from)
    }

    /// Leave the critical section.
    pub async fn release(&self) -> Result<(), NodeError> {
        let (tx, rx) = oneshot::channel();
        self.submit(NodeEvent::Release(tx))?;
        rx.await.map_err(|_| NodeError::QueueClosed)?.map_err(NodeError::from)
    }

    /// Current peer listing.
    pub async fn peers(&self) -> Result<Vec<PeerSnapshot>, NodeError> {
        let (tx, rx) = oneshot::channel();
        self.submit(NodeEvent::Peers(tx))?;
        rx.await.map_err(|_| NodeError::QueueClosed)
    }

    /// Receiver for state changes published by the control loop.
    pub fn subscribe(&self) -> watch::Receiver<NodeState> {
        self.state.clone()
    }

    /// Resolve once the node reports `state`.
    pub async fn wait_for(&self, state: NodeState) -> Result<(), NodeError> {
        let mut rx = self.state.clone();
        rx.wait_for(|current| *current == state).await.map_err(|_| NodeError::QueueClosed)?;
        Ok(())
    }

    /// Ask the control loop to stop.
    pub fn shutdown(&self) -> Result<(), NodeError> {
        self.submit(NodeEvent::Shutdown)
    }

    fn submit(&self, event: NodeEvent) -> Result<(), NodeError> {
        self.events.send(event).map_err(|_| NodeError::QueueClosed)
    }
}
