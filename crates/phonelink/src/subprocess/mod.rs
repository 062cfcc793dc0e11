//! Supervision of the local process that announces the endpoint.

pub mod supervisor;

pub use supervisor::{ProcessEvent, ProcessState, ProcessSupervisor, SubprocessError};
