//! Operator console: line-oriented input from the terminal.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::event::{Event, EventSender};

/// Events produced by the operator console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    /// One line of operator input, without its terminator.
    Line(String),
    /// End of operator input.
    Closed,
}

/// Reads operator lines and reports them on the event queue.
pub struct OperatorConsole<R> {
    reader: R,
}

impl OperatorConsole<BufReader<Stdin>> {
    /// Console over the process's standard input.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> OperatorConsole<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub const fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read lines until end of input, then report [`ConsoleEvent::Closed`].
    pub fn spawn(self, events: EventSender) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut reader = self.reader;
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = decode_line(&buf);
                        if events
                            .send(Event::Console(ConsoleEvent::Line(line)))
                            .await
                            .is_err()
                        {
                            debug!("event queue closed, console stopping");
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read operator input");
                        break;
                    }
                }
            }
            let _ = events.send(Event::Console(ConsoleEvent::Closed)).await;
        })
    }
}

/// Strip the line terminator. Bytes that are not UTF-8 are replaced rather
/// than ending the input.
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
