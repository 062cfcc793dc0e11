//! Incremental endpoint discovery over chunked process output.
//!
//! Chunks carry no line alignment, so a token may be split anywhere,
//! including in the middle of its value. The scanner keeps the unconsumed
//! tail of the output (the pending text) and only accepts a token once
//! something follows its value.

use std::net::Ipv4Addr;

use tracing::{debug, warn};

use super::extractor::{Endpoint, EndpointExtractor, PhoneIpExtractor, Token};

/// Default ceiling for pending text.
pub const DEFAULT_MAX_PENDING_BYTES: usize = 64 * 1024;

/// Streaming wrapper around an [`EndpointExtractor`].
///
/// Fires at most once. After an endpoint is found, or after [`stop`] is
/// called, further output is ignored.
///
/// [`stop`]: DiscoveryScanner::stop
#[derive(Debug)]
pub struct DiscoveryScanner<E = PhoneIpExtractor> {
    extractor: E,
    pending: String,
    /// Offset into `pending` up to which text has been consumed by a match.
    cursor: usize,
    host: Option<Ipv4Addr>,
    port: Option<u16>,
    max_pending: usize,
    done: bool,
}

impl DiscoveryScanner<PhoneIpExtractor> {
    pub fn new(max_pending: usize) -> Self {
        Self::with_extractor(PhoneIpExtractor, max_pending)
    }
}

impl Default for DiscoveryScanner<PhoneIpExtractor> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING_BYTES)
    }
}

impl<E: EndpointExtractor> DiscoveryScanner<E> {
    pub fn with_extractor(extractor: E, max_pending: usize) -> Self {
        Self {
            extractor,
            pending: String::new(),
            cursor: 0,
            host: None,
            port: None,
            max_pending: max_pending.max(1),
            done: false,
        }
    }

    /// Feed one chunk of output. Returns the endpoint the first time both
    /// tokens have been seen.
    pub fn feed(&mut self, chunk: &str) -> Option<Endpoint> {
        if self.done {
            return None;
        }
        self.pending.push_str(chunk);

        let base = self.cursor;
        for m in self.extractor.tokens(&self.pending[base..]) {
            let end = base + m.end;
            // Touching the end: the value may continue in the next chunk.
            if end >= self.pending.len() {
                break;
            }
            self.cursor = end;
            match m.token {
                Token::Host(ip) if self.host.is_none() => {
                    debug!(host = %ip, "Discovered host token");
                    self.host = Some(ip);
                }
                Token::Port(port) if self.port.is_none() => {
                    debug!(port, "Discovered port token");
                    self.port = Some(port);
                }
                Token::Malformed(raw) => {
                    debug!(value = %raw, "Ignoring malformed endpoint token");
                }
                Token::Host(_) | Token::Port(_) => {}
            }
            if let (Some(ip), Some(port)) = (self.host, self.port) {
                self.stop();
                return Endpoint::new(ip.to_string(), port);
            }
        }

        self.discard_scanned_lines();
        self.enforce_ceiling();
        None
    }

    /// Stop discovery; all later output is ignored.
    pub fn stop(&mut self) {
        self.done = true;
        self.pending = String::new();
        self.cursor = 0;
    }

    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Bytes currently held back.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Tokens never span a newline, so everything up to the last newline
    /// has been fully scanned.
    fn discard_scanned_lines(&mut self) {
        if let Some(nl) = self.pending.rfind('\n') {
            self.pending.drain(..=nl);
            self.cursor = self.cursor.saturating_sub(nl + 1);
        }
    }

    fn enforce_ceiling(&mut self) {
        if self.pending.len() <= self.max_pending {
            return;
        }
        let mut cut = self.pending.len() - self.max_pending;
        while !self.pending.is_char_boundary(cut) {
            cut += 1;
        }
        warn!(
            dropped = cut,
            ceiling = self.max_pending,
            "Discovery buffer over ceiling, dropping oldest output"
        );
        self.pending.drain(..cut);
        self.cursor = self.cursor.saturating_sub(cut);
    }
}
