// ABOUTME: Thread-safe accumulator of descriptors discovered during a transfer.
// ABOUTME: Deduplicates by digest and keeps first-seen order for progress rows.

use crate::types::{Descriptor, Digest};
use parking_lot::Mutex;
use std::collections::HashSet;

/// Descriptors discovered while walking one image's manifest graph.
///
/// Written by the discovery handler and read by the progress reporter. All
/// access goes through one mutex held only for the field access or copy.
#[derive(Debug)]
pub struct DescriptorSet {
    name: String,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    added: HashSet<Digest>,
    descriptors: Vec<Descriptor>,
    resolved: bool,
}

impl DescriptorSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// The normalized reference of the overall transfer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a descriptor. Repeated digests are ignored.
    pub fn add(&self, descriptor: &Descriptor) {
        let mut inner = self.inner.lock();
        inner.resolved = true;
        if inner.added.insert(descriptor.digest.clone()) {
            inner.descriptors.push(descriptor.clone());
        }
    }

    /// Copy of the descriptors in discovery order.
    pub fn list(&self) -> Vec<Descriptor> {
        self.inner.lock().descriptors.clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.lock().resolved
    }
}
