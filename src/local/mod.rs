// ABOUTME: Directory-backed local image store.
// ABOUTME: Content-addressed blobs, verified ingests, and named image records.

mod ingest;
mod store;

pub use ingest::IngestWriter;
pub use store::LocalStore;
