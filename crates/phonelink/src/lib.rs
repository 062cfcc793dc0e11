//! phonelink Library
//!
//! Core functionality for the phonelink relay:
//! - Supervision of the bitlite process and its standard streams
//! - Endpoint discovery from the process's free-form output
//! - A single WebSocket link to the discovered endpoint
//! - Operator console relaying to both the process and the link

pub mod console;
pub mod coordinator;
pub mod discovery;
pub mod event;
pub mod link;
pub mod subprocess;
