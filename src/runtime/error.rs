// ABOUTME: Runtime error types with SNAFU pattern.
// ABOUTME: Covers opening the local store and building the registry client.

use crate::runtime::traits::TransferError;
use snafu::Snafu;
use std::path::PathBuf;

/// Failure to assemble a local runtime.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RuntimeError {
    #[snafu(display("failed to open image store at {}: {source}", path.display()))]
    OpenStore {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to create registry client: {source}"))]
    Client { source: TransferError },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// Store directory missing, unreadable, or holding corrupt records.
    StoreUnavailable,
    /// HTTP client could not be built.
    ClientSetup,
}

impl RuntimeError {
    pub fn kind(&self) -> RuntimeErrorKind {
        match self {
            RuntimeError::OpenStore { .. } => RuntimeErrorKind::StoreUnavailable,
            RuntimeError::Client { .. } => RuntimeErrorKind::ClientSetup,
        }
    }
}
