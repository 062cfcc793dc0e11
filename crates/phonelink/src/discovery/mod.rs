//! Endpoint discovery from the supervised process's output.

pub mod extractor;
pub mod scanner;

pub use extractor::{Endpoint, EndpointExtractor, PhoneIpExtractor, Token, TokenMatch};
pub use scanner::{DEFAULT_MAX_PENDING_BYTES, DiscoveryScanner};
