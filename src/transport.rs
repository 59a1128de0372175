//! Push/pull message fabric between every ordered pair of nodes (spec.md
//! §6: "a push/pull, at-most-once message channel... length-prefixed opaque
//! byte strings; an empty message means terminate"). `Transport` is the
//! trait the rest of the engine depends on; [`InProcessFabric`] is a
//! `crossbeam-channel`-backed reference implementation — the teacher crate
//! has no transport layer of its own to adapt, and spec.md §6 only requires
//! "any equivalent" to its reference ZeroMQ fabric.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::partition::NodeId;

/// Which logical channel a message travels on. Edges and edge requests are
/// polled by separate pull threads (spec.md §4.5 steps 3 and 4), so each
/// gets its own channel rather than sharing one queue and a tag byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Edge,
    Request,
}

/// An empty payload is the terminate sentinel on every channel (spec.md §6).
pub fn is_terminate(message: &[u8]) -> bool {
    message.is_empty()
}

/// A push/pull fabric: `N * (N - 1)` directed, at-most-once channels, two
/// per ordered pair (one per [`Channel`]).
pub trait Transport: Send + Sync {
    /// Sends `message` to `to` on `channel`. Returns `false` on failure; per
    /// spec.md §7 this is counted and logged by the caller, not surfaced as
    /// a `Result` error.
    fn push(&self, channel: Channel, to: NodeId, message: Vec<u8>) -> bool;

    /// Blocks until a message arrives on `channel` for this node, or the
    /// implementation's idle grace period elapses with nothing arriving
    /// (`None` — the caller checks its own terminate bookkeeping and polls
    /// again, per spec.md §5's "idle-without-data timer" pull-thread exit
    /// condition).
    fn pull(&self, channel: Channel) -> Option<Vec<u8>>;
}

/// In-process reference transport: one pair of `crossbeam-channel` queues
/// per ordered node pair per channel, all fed from a single process. Good
/// enough to exercise the full engine with any `num_nodes` without a real
/// network.
pub struct InProcessFabric {
    node_id: NodeId,
    edge_senders: Vec<Sender<Vec<u8>>>,
    request_senders: Vec<Sender<Vec<u8>>>,
    edge_rx: Receiver<Vec<u8>>,
    request_rx: Receiver<Vec<u8>>,
    idle_grace: Duration,
}

impl InProcessFabric {
    /// Builds one endpoint per node in a cluster of `num_nodes`, each wired
    /// to every other. `idle_grace` bounds how long `pull` blocks before
    /// giving the caller a chance to check its own terminate/timeout state.
    pub fn cluster(num_nodes: usize, idle_grace: Duration) -> Vec<Arc<InProcessFabric>> {
        assert!(num_nodes > 0, "a fabric needs at least one node");
        let edge_channels: Vec<(Sender<Vec<u8>>, Receiver<Vec<u8>>)> = (0..num_nodes).map(|_| unbounded()).collect();
        let request_channels: Vec<(Sender<Vec<u8>>, Receiver<Vec<u8>>)> = (0..num_nodes).map(|_| unbounded()).collect();

        (0..num_nodes)
            .map(|node_id| {
                Arc::new(InProcessFabric {
                    node_id,
                    edge_senders: edge_channels.iter().map(|(tx, _)| tx.clone()).collect(),
                    request_senders: request_channels.iter().map(|(tx, _)| tx.clone()).collect(),
                    edge_rx: edge_channels[node_id].1.clone(),
                    request_rx: request_channels[node_id].1.clone(),
                    idle_grace,
                })
            })
            .collect()
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }
}

impl Transport for InProcessFabric {
    fn push(&self, channel: Channel, to: NodeId, message: Vec<u8>) -> bool {
        let senders = match channel {
            Channel::Edge => &self.edge_senders,
            Channel::Request => &self.request_senders,
        };
        match senders.get(to) {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }

    fn pull(&self, channel: Channel) -> Option<Vec<u8>> {
        let rx = match channel {
            Channel::Edge => &self.edge_rx,
            Channel::Request => &self.request_rx,
        };
        match rx.recv_timeout(self.idle_grace) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pull_delivers_the_message() {
        let cluster = InProcessFabric::cluster(2, Duration::from_millis(100));
        assert!(cluster[0].push(Channel::Edge, 1, b"hello".to_vec()));
        let received = cluster[1].pull(Channel::Edge).unwrap();
        assert_eq!(received, b"hello");
    }

    #[test]
    fn pull_times_out_with_nothing_sent() {
        let cluster = InProcessFabric::cluster(2, Duration::from_millis(20));
        assert!(cluster[0].pull(Channel::Edge).is_none());
    }

    #[test]
    fn an_empty_message_is_the_terminate_sentinel() {
        let cluster = InProcessFabric::cluster(2, Duration::from_millis(100));
        assert!(cluster[0].push(Channel::Request, 1, Vec::new()));
        let received = cluster[1].pull(Channel::Request).unwrap();
        assert!(is_terminate(&received));
    }

    #[test]
    fn push_to_an_out_of_range_node_fails() {
        let cluster = InProcessFabric::cluster(2, Duration::from_millis(20));
        assert!(!cluster[0].push(Channel::Edge, 5, b"x".to_vec()));
    }

    #[test]
    fn edge_and_request_channels_are_independent() {
        let cluster = InProcessFabric::cluster(2, Duration::from_millis(100));
        cluster[0].push(Channel::Request, 1, b"req".to_vec());
        assert!(cluster[1].pull(Channel::Edge).is_none());
        assert_eq!(cluster[1].pull(Channel::Request).unwrap(), b"req");
    }
}
