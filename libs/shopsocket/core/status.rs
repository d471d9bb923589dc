use crate::core::connection_state::ConnectionState;
use crate::core::message::InboundMessage;
use tokio::sync::watch;

/// Read-only view of a connection manager
///
/// Cheap to clone and safe to hand to any number of consumers. Values are
/// push-updated: `changed` wakes on every state or message update.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    state: watch::Receiver<ConnectionState>,
    latest: watch::Receiver<Option<InboundMessage>>,
}

impl ConnectionStatus {
    pub(crate) fn new(
        state: watch::Receiver<ConnectionState>,
        latest: watch::Receiver<Option<InboundMessage>>,
    ) -> Self {
        Self { state, latest }
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Most recent valid inbound message, if any
    pub fn latest(&self) -> Option<InboundMessage> {
        self.latest.borrow().clone()
    }

    /// Wait until either the state or the latest message changes
    ///
    /// Returns `false` once the manager has been dropped.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            res = self.state.changed() => res.is_ok(),
            res = self.latest.changed() => res.is_ok(),
        }
    }

    /// Wait until the manager reaches `target`
    ///
    /// Returns immediately if it is already there, and `false` if the manager
    /// is dropped first.
    pub async fn wait_for(&mut self, target: ConnectionState) -> bool {
        self.state.wait_for(|state| *state == target).await.is_ok()
    }
}
