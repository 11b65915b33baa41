// ABOUTME: Collaborator traits for image transfer.
// ABOUTME: Defines Transfer, StatusSource, ContentStore, ImageStore, and ImageBackend.

mod content;
mod images;
mod shared_types;
mod transfer;

pub use content::{ContentError, ContentStore, StatusSource};
pub use images::{ImageStore, ImageStoreError};
pub use shared_types::*;
pub use transfer::{DiscoveryHandler, Transfer, TransferError};

/// Everything the coordinator needs from one backend.
pub trait ImageBackend: Transfer + ContentStore + ImageStore {}

impl<T: Transfer + ContentStore + ImageStore> ImageBackend for T {}
