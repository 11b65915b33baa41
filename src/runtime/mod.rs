// ABOUTME: Image backends and the collaborator traits they implement.
// ABOUTME: LocalRuntime pairs the directory store with the registry client.

mod error;
mod local;
pub mod traits;

pub use error::{RuntimeError, RuntimeErrorKind};
pub use local::LocalRuntime;
