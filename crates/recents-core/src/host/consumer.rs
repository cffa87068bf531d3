use std::sync::Arc;

use tokio::sync::mpsc;

use crate::host::RecentsConsumer;
use crate::models::RecentsSnapshot;

/// Consumer that forwards every snapshot over a channel, so the UI side can
/// drain updates on whichever thread it renders from.
pub struct ChannelConsumer {
    sender: mpsc::UnboundedSender<RecentsSnapshot>,
}

impl ChannelConsumer {
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<RecentsSnapshot>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }
}

impl RecentsConsumer for ChannelConsumer {
    fn update(&self, snapshot: RecentsSnapshot) {
        if self.sender.send(snapshot).is_err() {
            tracing::debug!("recents consumer receiver dropped; snapshot discarded");
        }
    }
}
