//! The single event queue every leg reports into.
//!
//! Process output, operator input and link activity are produced by
//! independent tasks, but only the coordinator consumes them, one at a time,
//! in arrival order per source.

use tokio::sync::mpsc;

use crate::console::ConsoleEvent;
use crate::link::LinkEvent;
use crate::subprocess::ProcessEvent;

/// Capacity of the coordinator's event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Anything the coordinator reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Process(ProcessEvent),
    Console(ConsoleEvent),
    Link(LinkEvent),
    /// No endpoint appeared within the configured discovery window.
    DiscoveryTimeout,
}

impl From<ProcessEvent> for Event {
    fn from(event: ProcessEvent) -> Self {
        Self::Process(event)
    }
}

impl From<ConsoleEvent> for Event {
    fn from(event: ConsoleEvent) -> Self {
        Self::Console(event)
    }
}

impl From<LinkEvent> for Event {
    fn from(event: LinkEvent) -> Self {
        Self::Link(event)
    }
}

pub type EventSender = mpsc::Sender<Event>;
pub type EventReceiver = mpsc::Receiver<Event>;

/// Create the coordinator's event queue.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_QUEUE_CAPACITY)
}
