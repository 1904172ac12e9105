//! Centralized error type for the stomp umbrella crate.
//!
//! Wraps subsystem errors so `?` propagates naturally across crate
//! boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Host: {0}")]
    Host(#[from] stomp_host::HostError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
