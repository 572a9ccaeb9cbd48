use std::io;
use thiserror::Error;

/// Error taxonomy shared by the core crate and its backend implementations.
///
/// Configuration and validation errors abort a command immediately. Transport
/// errors raised during a queue flush are reported through the queue's error
/// callback and never abort the producer.
#[derive(Error, Debug)]
pub enum CdfError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CdfError>;
