//! The remote link owned by the coordinator.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::connector::{Connector, LinkEvent};
use super::error::LinkError;
use super::state::LinkState;
use crate::discovery::Endpoint;
use crate::event::EventSender;

/// One remote connection, created at most once per run.
///
/// The socket itself lives in a background task; this side tracks the
/// state and queues outbound messages. A terminal link is never reopened.
#[derive(Debug)]
pub struct RelayLink {
    endpoint: Endpoint,
    url: String,
    state: LinkState,
    outbound: Option<mpsc::Sender<String>>,
}

impl RelayLink {
    pub fn new(endpoint: Endpoint, scheme: &str) -> Self {
        let url = endpoint.url(scheme);
        Self {
            endpoint,
            url,
            state: LinkState::Idle,
            outbound: None,
        }
    }

    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub const fn state(&self) -> &LinkState {
        &self.state
    }

    /// Start connecting: `Idle -> Connecting`.
    pub fn open(&mut self, connector: &dyn Connector, events: EventSender) -> Result<(), LinkError> {
        self.transition(LinkState::Connecting)?;
        self.outbound = Some(connector.connect(&self.url, events));
        Ok(())
    }

    /// Apply a link event to the state.
    ///
    /// Messages are accepted only while open; anything arriving in another
    /// state is rejected.
    pub fn apply(&mut self, event: &LinkEvent) -> Result<(), LinkError> {
        match event {
            LinkEvent::Opened => self.transition(LinkState::Open),
            LinkEvent::Message(_) if self.state.is_open() => Ok(()),
            LinkEvent::Message(_) => Err(LinkError::NotConnected),
            LinkEvent::Closed => self.transition(LinkState::Closed),
            LinkEvent::Failed(reason) => self.transition(LinkState::Failed(reason.clone())),
        }
    }

    /// Queue a message for the peer. Only valid while open.
    ///
    /// Never waits: when the peer stops reading and the queue is full the
    /// message is rejected with [`LinkError::Backpressure`].
    pub fn send(&self, message: &str) -> Result<(), LinkError> {
        if !self.state.is_open() {
            return Err(LinkError::NotConnected);
        }
        let tx = self.outbound.as_ref().ok_or(LinkError::NotConnected)?;
        tx.try_send(message.to_string()).map_err(|e| match e {
            TrySendError::Full(_) => LinkError::Backpressure,
            TrySendError::Closed(_) => LinkError::NotConnected,
        })
    }

    fn transition(&mut self, next: LinkState) -> Result<(), LinkError> {
        if !self.state.can_transition_to(&next) {
            warn!(url = %self.url, from = %self.state, to = %next, "Rejected link transition");
            return Err(LinkError::InvalidTransition {
                from: self.state.clone(),
                to: next,
            });
        }
        debug!(url = %self.url, from = %self.state, to = %next, "Link transition");
        if next.is_terminal() {
            // Dropping the sender lets the socket task wind down.
            self.outbound = None;
        }
        self.state = next;
        Ok(())
    }
}
