#![allow(clippy::unwrap_used, clippy::panic)] // Integration tests use unwrap for brevity
#![cfg(unix)]

//! End-to-end relay tests.
//!
//! A shell script stands in for bitlite: it announces a local endpoint and
//! then echoes its input. A local WebSocket server plays the phone.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use phonelink::console::ConsoleEvent;
use phonelink::coordinator::{BufferTerminal, Coordinator, Phase, Stream};
use phonelink::discovery::DiscoveryScanner;
use phonelink::event::{self, Event, EventReceiver, EventSender};
use phonelink::link::{LinkState, WsConnector};
use phonelink::subprocess::ProcessSupervisor;
use phonelink_core::config::LinkConfig;

const TEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Write an executable script that announces `port` and then runs `cat`.
fn announcing_script(dir: &tempfile::TempDir, port: u16) -> PathBuf {
    let path = dir.path().join("bitlite");
    let body = format!("#!/bin/sh\necho \"Phone IP: 127.0.0.1\"\necho \"Port: {port}\"\nexec cat\n");
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Accept one WebSocket client, report every text it sends and answer
/// "ping" with "pong".
async fn phone_server(listener: TcpListener, received: oneshot::Sender<Vec<String>>) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    let mut texts = Vec::new();
    while let Some(Ok(msg)) = ws.next().await {
        match msg {
            Message::Text(text) => {
                if text == "ping" {
                    ws.send(Message::Text("pong".into())).await.unwrap();
                }
                texts.push(text);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    let _ = received.send(texts);
}

fn coordinator(
    script: &std::path::Path,
    events: &EventSender,
) -> (Coordinator<BufferTerminal>, BufferTerminal) {
    let process = ProcessSupervisor::spawn(script, "bitlite", events.clone()).unwrap();
    let terminal = BufferTerminal::new();
    let coordinator = Coordinator::new(
        process,
        DiscoveryScanner::default(),
        Box::new(WsConnector::new(Duration::from_secs(5))),
        terminal.clone(),
        events.clone(),
        LinkConfig::default(),
    );
    (coordinator, terminal)
}

/// Feed events to the coordinator until the process exits, letting `step`
/// inject operator input after each one.
async fn drive(
    mut coordinator: Coordinator<BufferTerminal>,
    mut rx: EventReceiver,
    events: EventSender,
    mut step: impl FnMut(&Coordinator<BufferTerminal>) -> Option<ConsoleEvent>,
) -> (Coordinator<BufferTerminal>, Option<i32>) {
    let run = async {
        while let Some(event) = rx.recv().await {
            if let std::ops::ControlFlow::Break(code) = coordinator.handle(event) {
                return code;
            }
            if let Some(input) = step(&coordinator) {
                events.send(Event::Console(input)).await.unwrap();
            }
        }
        panic!("event queue closed before the process exited");
    };
    let code = tokio::time::timeout(TEST_TIMEOUT, run).await.unwrap();
    (coordinator, code)
}

#[tokio::test]
async fn relays_operator_lines_to_process_and_phone() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (received_tx, received_rx) = oneshot::channel();
    tokio::spawn(phone_server(listener, received_tx));

    let dir = tempfile::tempdir().unwrap();
    let script = announcing_script(&dir, port);
    let (events_tx, events_rx) = event::channel();
    let (coordinator, terminal) = coordinator(&script, &events_tx);

    let mut pinged = false;
    let mut closed = false;
    let (coordinator, code) = drive(coordinator, events_rx, events_tx, |c| {
        let open = c.link().is_some_and(|l| l.state().is_open());
        if open && !pinged {
            pinged = true;
            return Some(ConsoleEvent::Line("ping".into()));
        }
        let ponged = c
            .terminal()
            .contains(Stream::Out, "Received from server: pong");
        if ponged && !closed {
            closed = true;
            return Some(ConsoleEvent::Closed);
        }
        None
    })
    .await;

    assert_eq!(code, Some(0));
    assert_eq!(coordinator.phase(), Phase::Terminating);
    let url = format!("ws://127.0.0.1:{port}");
    assert!(terminal.contains(Stream::Out, "bitlite: Phone IP: 127.0.0.1"));
    assert!(terminal.contains(Stream::Out, &format!("Connected to {url}")));
    // cat echoed the line back: the process leg got it too.
    assert!(terminal.contains(Stream::Out, "bitlite: ping"));
    assert!(terminal.contains(Stream::Out, "bitlite exited with code 0"));

    // Dropping the coordinator closes the link's outbound queue.
    drop(coordinator);
    let texts = tokio::time::timeout(TEST_TIMEOUT, received_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(texts, vec!["Hello from the laptop!", "ping"]);
}

#[tokio::test]
async fn refused_connection_keeps_process_leg_alive() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let dir = tempfile::tempdir().unwrap();
    let script = announcing_script(&dir, port);
    let (events_tx, events_rx) = event::channel();
    let (coordinator, terminal) = coordinator(&script, &events_tx);

    let mut sent = 0;
    let (coordinator, code) = drive(coordinator, events_rx, events_tx, |c| {
        let failed = c
            .link()
            .is_some_and(|l| matches!(l.state(), LinkState::Failed(_)));
        match sent {
            0 if failed => {
                sent = 1;
                Some(ConsoleEvent::Line("local only".into()))
            }
            1 if c.terminal().contains(Stream::Out, "bitlite: local only") => {
                sent = 2;
                Some(ConsoleEvent::Closed)
            }
            _ => None,
        }
    })
    .await;

    assert_eq!(code, Some(0));
    assert!(matches!(
        coordinator.link().map(|l| l.state()),
        Some(LinkState::Failed(_))
    ));
    let link_errors = terminal
        .lines()
        .into_iter()
        .filter(|(s, l)| *s == Stream::Err && l.starts_with("Link error:"))
        .count();
    assert_eq!(link_errors, 1);
}

#[tokio::test]
async fn missing_binary_fails_to_spawn() {
    let (events_tx, _events_rx) = event::channel();
    let err = ProcessSupervisor::spawn(
        std::path::Path::new("/nonexistent/bitlite"),
        "bitlite",
        events_tx,
    )
    .unwrap_err();
    assert!(err.to_string().contains("/nonexistent/bitlite"));
}
