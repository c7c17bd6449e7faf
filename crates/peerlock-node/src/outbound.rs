//! Per-peer outbound writers.
//!
//! Each destination address gets its own writer task fed by an unbounded
//! queue, so a slow or dead peer never stalls the control loop. The task
//! connects on its first frame. Any connect or write failure is logged, the
//! task exits and whatever it had queued is dropped; the next frame for that
//! address starts a fresh writer. Nothing is retried.

use std::{collections::HashMap, sync::Arc};

use peerlock_core::{PeerAddress, Transport};
use peerlock_proto::Frame;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::codec::write_frame;

/// Writer tasks keyed by destination address.
pub struct Outbound<T: Transport> {
    transport: Arc<T>,
    writers: HashMap<PeerAddress, mpsc::UnboundedSender<Frame>>,
}

impl<T: Transport> Outbound<T> {
    /// No writers yet.
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport, writers: HashMap::new() }
    }

    /// Queue `frame` for `address`, starting a writer if needed.
    pub fn send(&mut self, address: &PeerAddress, frame: Frame) {
        let frame = match self.writers.get(address) {
            Some(writer) => match writer.send(frame) {
                Ok(()) => return,
                // Writer exited after a failure; start over.
                Err(mpsc::error::SendError(frame)) => frame,
            },
            None => frame,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(frame);
        tokio::spawn(write_loop(Arc::clone(&self.transport), address.clone(), rx));
        self.writers.insert(address.clone(), tx);
    }

    /// Drop the writer for `address`; its task ends once the queue drains.
    pub fn disconnect(&mut self, address: &PeerAddress) {
        if self.writers.remove(address).is_some() {
            debug!(%address, "outbound writer dropped");
        }
    }
}

async fn write_loop<T: Transport>(
    transport: Arc<T>,
    address: PeerAddress,
    mut frames: mpsc::UnboundedReceiver<Frame>,
) {
    let Some(first) = frames.recv().await else {
        return;
    };

    let mut stream = match transport.connect(&address).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(%address, error = %e, "connect failed, dropping frame");
            return;
        },
    };
    debug!(%address, "outbound connection established");

    let mut next = Some(first);
    while let Some(frame) = next {
        if let Err(e) = write_frame(&mut stream, &frame).await {
            warn!(%address, error = %e, "send failed, dropping frame");
            return;
        }
        next = frames.recv().await;
    }
}
