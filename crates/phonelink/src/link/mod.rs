//! Remote link to the discovered endpoint.
//!
//! Exactly one link is created per run, on the first discovered endpoint.
//! It is never retried or reconnected.

pub mod client;
pub mod connector;
pub mod error;
pub mod state;

pub use client::RelayLink;
pub use connector::{Connector, LinkEvent, WsConnector};
pub use error::LinkError;
pub use state::LinkState;
