// ABOUTME: Coordinator error types with SNAFU context selectors.
// ABOUTME: Every variant carries the operation and reference it failed on.

use snafu::Snafu;
use std::fmt;
use std::path::PathBuf;

use super::archive::ArchiveError;
use super::inspect::InspectError;
use crate::runtime::traits::{ContentError, ImageStoreError, TransferError};
use crate::types::ParseImageRefError;

/// The user-facing operation an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Pull,
    Push,
    Tag,
    Remove,
    Exists,
    Save,
    Load,
    Mirror,
}

impl Operation {
    /// Step label used in progress events.
    pub fn step(&self) -> &'static str {
        match self {
            Operation::Pull => "pullimage",
            Operation::Push => "pushimage",
            Operation::Tag => "changetag",
            Operation::Remove => "removeimage",
            Operation::Exists => "checkimage",
            Operation::Save => "saveimage",
            Operation::Load => "loadimage",
            Operation::Mirror => "mirrorimage",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Pull => "pull",
            Operation::Push => "push",
            Operation::Tag => "tag",
            Operation::Remove => "remove",
            Operation::Exists => "exists",
            Operation::Save => "save",
            Operation::Load => "load",
            Operation::Mirror => "mirror",
        })
    }
}

/// Errors returned by the transfer coordinator and image operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CoordinatorError {
    #[snafu(display("{operation}: invalid image reference {input:?}: {source}"))]
    ParseReference {
        operation: Operation,
        input: String,
        source: ParseImageRefError,
    },

    #[snafu(display("{operation} {reference}: image lookup failed: {source}"))]
    Lookup {
        operation: Operation,
        reference: String,
        source: ImageStoreError,
    },

    #[snafu(display("{operation} {reference}: failed to read image content: {source}"))]
    Inspect {
        operation: Operation,
        reference: String,
        source: InspectError,
    },

    #[snafu(display("pull {reference}: {source}"))]
    Pull {
        reference: String,
        source: TransferError,
    },

    #[snafu(display("push {reference}: failed after {attempts} attempt(s): {source}"))]
    Push {
        reference: String,
        attempts: u32,
        source: TransferError,
    },

    #[snafu(display("pull {reference}: cannot read image config: {source}"))]
    ImageConfig {
        reference: String,
        source: InspectError,
    },

    #[snafu(display("{operation} {reference}: progress reporting failed: {source}"))]
    Progress {
        operation: Operation,
        reference: String,
        source: ContentError,
    },

    #[snafu(display("{operation} {reference}: progress task aborted: {source}"))]
    ProgressTask {
        operation: Operation,
        reference: String,
        source: tokio::task::JoinError,
    },

    #[snafu(display("tag {from} -> {to}: {source}"))]
    Tag {
        from: String,
        to: String,
        source: ImageStoreError,
    },

    #[snafu(display("remove {reference}: {source}"))]
    Remove {
        reference: String,
        source: ImageStoreError,
    },

    #[snafu(display("{operation} {}: {source}", path.display()))]
    Archive {
        operation: Operation,
        path: PathBuf,
        source: ArchiveError,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorErrorKind {
    /// The reference could not be parsed.
    InvalidReference,
    /// The image or some of its content is not in the local store.
    NotFound,
    /// Talking to the registry failed.
    Transfer,
    /// The local store misbehaved.
    Store,
    /// The progress reporter failed.
    Progress,
    /// Reading or writing an image archive failed.
    Archive,
}

impl CoordinatorError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> CoordinatorErrorKind {
        match self {
            CoordinatorError::ParseReference { .. } => CoordinatorErrorKind::InvalidReference,
            CoordinatorError::Lookup { source, .. }
            | CoordinatorError::Tag { source, .. }
            | CoordinatorError::Remove { source, .. } => {
                if source.is_not_found() {
                    CoordinatorErrorKind::NotFound
                } else {
                    CoordinatorErrorKind::Store
                }
            }
            CoordinatorError::Inspect { source, .. }
            | CoordinatorError::ImageConfig { source, .. } => {
                if source.is_not_found() {
                    CoordinatorErrorKind::NotFound
                } else {
                    CoordinatorErrorKind::Store
                }
            }
            CoordinatorError::Pull { .. } | CoordinatorError::Push { .. } => {
                CoordinatorErrorKind::Transfer
            }
            CoordinatorError::Progress { .. } | CoordinatorError::ProgressTask { .. } => {
                CoordinatorErrorKind::Progress
            }
            CoordinatorError::Archive { .. } => CoordinatorErrorKind::Archive,
        }
    }

    /// The operation that failed.
    pub fn operation(&self) -> Operation {
        match self {
            CoordinatorError::ParseReference { operation, .. }
            | CoordinatorError::Lookup { operation, .. }
            | CoordinatorError::Inspect { operation, .. }
            | CoordinatorError::Progress { operation, .. }
            | CoordinatorError::ProgressTask { operation, .. }
            | CoordinatorError::Archive { operation, .. } => *operation,
            CoordinatorError::Pull { .. } | CoordinatorError::ImageConfig { .. } => {
                Operation::Pull
            }
            CoordinatorError::Push { .. } => Operation::Push,
            CoordinatorError::Tag { .. } => Operation::Tag,
            CoordinatorError::Remove { .. } => Operation::Remove,
        }
    }

    /// Number of push attempts made, for push failures.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            CoordinatorError::Push { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
