//! Background connection tasks for the remote link.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::error::LinkError;
use crate::event::{Event, EventSender};

/// Events produced by the remote link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The handshake completed.
    Opened,
    /// An inbound application message.
    Message(String),
    /// The peer closed the connection.
    Closed,
    /// Connecting failed or the connection broke.
    Failed(String),
}

/// Starts a remote connection in the background.
pub trait Connector {
    /// Begin connecting to `url`. Progress and inbound messages are reported
    /// on `events`; text queued on the returned sender is written to the
    /// peer in order once the link is open.
    fn connect(&self, url: &str, events: EventSender) -> mpsc::Sender<String>;
}

/// WebSocket connector.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: &str, events: EventSender) -> mpsc::Sender<String> {
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(64);
        tokio::spawn(run_ws_link(
            url.to_string(),
            self.connect_timeout,
            outbound_rx,
            events,
        ));
        outbound_tx
    }
}

async fn emit(events: &EventSender, event: LinkEvent) {
    if events.send(Event::Link(event)).await.is_err() {
        debug!("event queue closed, dropping link event");
    }
}

async fn run_ws_link(
    url: String,
    connect_timeout: Duration,
    mut outbound: mpsc::Receiver<String>,
    events: EventSender,
) {
    info!(url = %url, "Connecting remote link");
    let connected = match tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await
    {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            let err = LinkError::Connection(e.to_string());
            warn!(url = %url, error = %err, "Remote link failed to connect");
            emit(&events, LinkEvent::Failed(err.to_string())).await;
            return;
        }
        Err(_) => {
            let err = LinkError::Timeout(connect_timeout.as_secs());
            warn!(url = %url, error = %err, "Remote link failed to connect");
            emit(&events, LinkEvent::Failed(err.to_string())).await;
            return;
        }
    };
    info!(url = %url, "Remote link open");
    emit(&events, LinkEvent::Opened).await;

    let (mut sink, mut stream) = connected.split();
    loop {
        tokio::select! {
            out = outbound.recv() => {
                let Some(text) = out else {
                    // Owner dropped the link.
                    debug!(url = %url, "Outbound queue closed, closing link");
                    let _ = sink.close().await;
                    return;
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    emit(&events, LinkEvent::Failed(LinkError::Connection(e.to_string()).to_string())).await;
                    return;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        emit(&events, LinkEvent::Message(text)).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        emit(&events, LinkEvent::Message(String::from_utf8_lossy(&bytes).into_owned())).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(url = %url, ?frame, "Peer closed link");
                        emit(&events, LinkEvent::Closed).await;
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        emit(&events, LinkEvent::Failed(LinkError::Connection(e.to_string()).to_string())).await;
                        return;
                    }
                    None => {
                        emit(&events, LinkEvent::Closed).await;
                        return;
                    }
                }
            }
        }
    }
}
