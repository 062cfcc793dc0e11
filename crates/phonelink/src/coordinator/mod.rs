//! Coordinator: wires the process, discovery, the remote link and the
//! operator console together.
//!
//! Data flow:
//! ```text
//! process stdout → terminal, and → DiscoveryScanner → (first match) RelayLink::open
//! operator line  → process stdin (always), and → RelayLink::send (only while open)
//! link message   → terminal
//! ```
//!
//! Every leg reports into one event queue and only the coordinator mutates
//! state, one event at a time.

pub mod display;

use std::ops::ControlFlow;
use std::time::Duration;

use tracing::{debug, info, warn};

use phonelink_core::config::LinkConfig;

use crate::console::ConsoleEvent;
use crate::discovery::{DiscoveryScanner, Endpoint};
use crate::event::{Event, EventReceiver, EventSender};
use crate::link::{Connector, LinkEvent, RelayLink};
use crate::subprocess::{ProcessEvent, ProcessSupervisor};

pub use display::{BufferTerminal, LineAssembler, StdTerminal, Stream, Terminal};

/// Coordinator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Scanning process output for an endpoint.
    Discovering,
    /// A link has been created for the discovered endpoint.
    Linked,
    /// No (further) link activity; waiting for the process to exit.
    Terminating,
}

/// Human-readable description of a process exit.
pub fn describe_exit(code: Option<i32>) -> String {
    code.map_or_else(
        || "terminated by signal".to_string(),
        |c| format!("exited with code {c}"),
    )
}

/// Post [`Event::DiscoveryTimeout`] after `timeout`.
pub fn schedule_discovery_timeout(timeout: Duration, events: EventSender) {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = events.send(Event::DiscoveryTimeout).await;
    });
}

/// Owns every leg and applies events to them.
pub struct Coordinator<T> {
    phase: Phase,
    process: ProcessSupervisor,
    scanner: DiscoveryScanner,
    link: Option<RelayLink>,
    connector: Box<dyn Connector>,
    events: EventSender,
    terminal: T,
    stdout_lines: LineAssembler,
    stderr_lines: LineAssembler,
    link_config: LinkConfig,
}

impl<T: Terminal> Coordinator<T> {
    pub fn new(
        process: ProcessSupervisor,
        scanner: DiscoveryScanner,
        connector: Box<dyn Connector>,
        terminal: T,
        events: EventSender,
        link_config: LinkConfig,
    ) -> Self {
        Self {
            phase: Phase::Discovering,
            process,
            scanner,
            link: None,
            connector,
            events,
            terminal,
            stdout_lines: LineAssembler::default(),
            stderr_lines: LineAssembler::default(),
            link_config,
        }
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    pub const fn link(&self) -> Option<&RelayLink> {
        self.link.as_ref()
    }

    pub const fn process(&self) -> &ProcessSupervisor {
        &self.process
    }

    pub const fn terminal(&self) -> &T {
        &self.terminal
    }

    /// Process events until the supervised process exits.
    ///
    /// Returns the process's exit code (`None` if killed by a signal).
    pub async fn run(mut self, mut events: EventReceiver) -> Option<i32> {
        while let Some(event) = events.recv().await {
            if let ControlFlow::Break(code) = self.handle(event) {
                return code;
            }
        }
        // We hold a sender ourselves, so this means every producer is gone.
        warn!("Event queue closed before the process exited");
        None
    }

    /// Apply one event. Breaks with the exit code once the process exits.
    ///
    /// Never waits on a leg: a stalled process or peer costs dropped lines,
    /// not a stuck coordinator.
    pub fn handle(&mut self, event: Event) -> ControlFlow<Option<i32>> {
        match event {
            Event::Process(event) => return self.on_process(event),
            Event::Console(event) => self.on_console(event),
            Event::Link(event) => self.on_link(event),
            Event::DiscoveryTimeout => self.on_discovery_timeout(),
        }
        ControlFlow::Continue(())
    }

    fn on_process(&mut self, event: ProcessEvent) -> ControlFlow<Option<i32>> {
        match event {
            ProcessEvent::Stdout(chunk) => {
                for line in self.stdout_lines.push(&chunk) {
                    self.terminal.out(&format!("{}: {line}", self.process.name()));
                }
                if self.phase == Phase::Discovering {
                    if let Some(endpoint) = self.scanner.feed(&String::from_utf8_lossy(&chunk)) {
                        self.link_to(endpoint);
                    }
                }
            }
            ProcessEvent::Stderr(chunk) => {
                for line in self.stderr_lines.push(&chunk) {
                    self.terminal
                        .err(&format!("{} error: {line}", self.process.name()));
                }
            }
            ProcessEvent::Exited(code) => {
                if let Some(line) = self.stdout_lines.flush() {
                    self.terminal.out(&format!("{}: {line}", self.process.name()));
                }
                if let Some(line) = self.stderr_lines.flush() {
                    self.terminal
                        .err(&format!("{} error: {line}", self.process.name()));
                }
                self.process.mark_exited(code);
                self.scanner.stop();
                self.phase = Phase::Terminating;
                self.terminal
                    .out(&format!("{} {}", self.process.name(), describe_exit(code)));
                info!(code, "Supervised process exited, shutting down");
                return ControlFlow::Break(code);
            }
        }
        ControlFlow::Continue(())
    }

    fn link_to(&mut self, endpoint: Endpoint) {
        info!(endpoint = %endpoint, "Endpoint discovered");
        self.phase = Phase::Linked;
        let mut link = RelayLink::new(endpoint, &self.link_config.scheme);
        self.terminal
            .out(&format!("Discovered endpoint, connecting to {}", link.url()));
        if let Err(e) = link.open(self.connector.as_ref(), self.events.clone()) {
            self.terminal.err(&format!("Link error: {e}"));
        }
        self.link = Some(link);
    }

    fn on_console(&mut self, event: ConsoleEvent) {
        match event {
            ConsoleEvent::Line(line) => {
                // The process leg always gets the line.
                if let Err(e) = self.process.write(&line) {
                    warn!(error = %e, "Dropping operator input for process");
                    self.terminal.err(&format!(
                        "Could not forward input to {}: {e}",
                        self.process.name()
                    ));
                }
                // The link leg only while open.
                match self.link.as_ref() {
                    Some(link) if link.state().is_open() => {
                        if let Err(e) = link.send(&line) {
                            self.terminal.err(&format!("Relay send failed: {e}"));
                        }
                    }
                    _ => debug!("Link not open, line not relayed"),
                }
            }
            ConsoleEvent::Closed => {
                info!("Operator input closed");
                self.process.close_input();
            }
        }
    }

    fn on_link(&mut self, event: LinkEvent) {
        let Some(link) = self.link.as_mut() else {
            warn!(?event, "Link event without a link");
            return;
        };
        if let Err(e) = link.apply(&event) {
            warn!(error = %e, ?event, "Ignoring link event");
            return;
        }
        match event {
            LinkEvent::Opened => {
                self.terminal.out(&format!("Connected to {}", link.url()));
                // Queued before any operator line can be relayed.
                if let Err(e) = link.send(&self.link_config.greeting) {
                    self.terminal.err(&format!("Relay send failed: {e}"));
                }
            }
            LinkEvent::Message(message) => {
                self.terminal.out(&format!("Received from server: {message}"));
            }
            LinkEvent::Closed => {
                self.terminal
                    .out(&format!("Connection to {} closed", link.url()));
                self.phase = Phase::Terminating;
            }
            LinkEvent::Failed(reason) => {
                self.terminal.err(&format!("Link error: {reason}"));
                self.phase = Phase::Terminating;
            }
        }
    }

    fn on_discovery_timeout(&mut self) {
        if self.phase != Phase::Discovering {
            return;
        }
        warn!("No endpoint discovered before the timeout");
        self.scanner.stop();
        self.phase = Phase::Terminating;
        self.terminal
            .err("No endpoint announced in time; continuing without a remote link");
    }
}
