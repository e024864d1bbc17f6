//! Status event channels.
//!
//! The runner emits one [`NodeStatusEvent`] per node-state transition on an
//! unbounded channel, and exactly one terminal [`FlowStatusEvent`] on a
//! second channel. The runner closes neither; callers drain node events
//! until the terminal flow status arrives.

use tokio::sync::mpsc;

use crate::ident::Id;
use crate::model::{FlowStatus, IterationContext, NodeState};

/// One node-state transition.
#[derive(Debug, Clone)]
pub struct NodeStatusEvent {
    pub node_id: Id,
    pub node_name: String,
    pub state: NodeState,
    pub error: Option<String>,
    pub iteration: Option<IterationContext>,
}

/// The terminal flow status; the first-observed non-cancellation error is
/// attached.
#[derive(Debug, Clone)]
pub struct FlowStatusEvent {
    pub flow_id: Id,
    pub status: FlowStatus,
    pub error: Option<String>,
}

pub type NodeEventSender = mpsc::UnboundedSender<NodeStatusEvent>;
pub type NodeEventReceiver = mpsc::UnboundedReceiver<NodeStatusEvent>;
pub type FlowEventSender = mpsc::UnboundedSender<FlowStatusEvent>;
pub type FlowEventReceiver = mpsc::UnboundedReceiver<FlowStatusEvent>;

pub fn node_event_channel() -> (NodeEventSender, NodeEventReceiver) {
    mpsc::unbounded_channel()
}

pub fn flow_event_channel() -> (FlowEventSender, FlowEventReceiver) {
    mpsc::unbounded_channel()
}

/// Send helper that ignores a drained receiver: a caller that stopped
/// listening must not wedge the runner.
pub fn emit_node_event(tx: &NodeEventSender, event: NodeStatusEvent) {
    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{FakeIdSource, IdSource};

    #[tokio::test]
    async fn test_event_channel_round_trip() {
        let ids = FakeIdSource::new();
        let (tx, mut rx) = node_event_channel();
        emit_node_event(
            &tx,
            NodeStatusEvent {
                node_id: ids.next_id(),
                node_name: "R1".into(),
                state: NodeState::Running,
                error: None,
                iteration: None,
            },
        );
        let event = rx.recv().await.unwrap();
        assert_eq!(event.node_name, "R1");
        assert_eq!(event.state, NodeState::Running);
    }

    #[tokio::test]
    async fn test_emit_after_receiver_dropped_is_silent() {
        let ids = FakeIdSource::new();
        let (tx, rx) = node_event_channel();
        drop(rx);
        emit_node_event(
            &tx,
            NodeStatusEvent {
                node_id: ids.next_id(),
                node_name: "R1".into(),
                state: NodeState::Success,
                error: None,
                iteration: None,
            },
        );
    }
}
