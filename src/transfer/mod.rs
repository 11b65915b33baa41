// ABOUTME: Image transfer orchestration: pull, retrying push, and local image operations.
// ABOUTME: Ties the backend, progress reporter, and render sink together.

pub mod archive;
mod coordinator;
mod error;
pub mod inspect;
mod ops;
mod retry;

pub use archive::ArchiveError;
pub use coordinator::{DEFAULT_TIMEOUT, TransferCoordinator, TransferSettings};
pub use error::{CoordinatorError, CoordinatorErrorKind, Operation};
pub use inspect::InspectError;
pub use retry::{DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS, RetryPolicy, RetryState};
