// ABOUTME: Merges live transfer status with point lookups into ordered progress rows.
// ABOUTME: Pure state machine, no I/O; the reporter feeds it snapshots each tick.

use crate::runtime::traits::{ActiveStatus, ContentInfo};
use crate::types::{Descriptor, Digest};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Lifecycle state of one progress row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    Resolving,
    Waiting,
    Downloading,
    Uploading,
    Exists,
    Done,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Resolving => "resolving",
            TransferState::Waiting => "waiting",
            TransferState::Downloading => "downloading",
            TransferState::Uploading => "uploading",
            TransferState::Exists => "exists",
            TransferState::Done => "done",
        }
    }

    /// Bytes are currently moving.
    pub fn is_active(&self) -> bool {
        matches!(self, TransferState::Downloading | TransferState::Uploading)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Done | TransferState::Exists)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way bytes flow; decides how active rows are labelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Pull,
    Push,
}

impl Direction {
    pub fn active_state(&self) -> TransferState {
        match self {
            Direction::Pull => TransferState::Downloading,
            Direction::Push => TransferState::Uploading,
        }
    }
}

/// One progress line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub key: String,
    pub state: TransferState,
    pub offset: u64,
    pub total: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusRow {
    pub fn new(key: impl Into<String>, state: TransferState) -> Self {
        Self {
            key: key.into(),
            state,
            offset: 0,
            total: 0,
            started_at: None,
            updated_at: None,
        }
    }

    /// Completed fraction in `0.0..=1.0` for drawing a bar.
    pub fn fraction(&self) -> f64 {
        match self.state {
            TransferState::Done | TransferState::Exists => 1.0,
            TransferState::Resolving | TransferState::Waiting => 0.0,
            TransferState::Downloading | TransferState::Uploading if self.total > 0 => {
                (self.offset as f64 / self.total as f64).min(1.0)
            }
            _ => 0.0,
        }
    }

    fn from_active(active: &ActiveStatus, state: TransferState) -> Self {
        Self {
            key: active.key.clone(),
            state,
            offset: active.offset,
            total: active.total,
            started_at: Some(active.started_at),
            updated_at: Some(active.updated_at),
        }
    }
}

/// Result of asking the status source about one committed blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Missing,
    Found(ContentInfo),
}

/// Everything one merge pass looks at.
#[derive(Debug, Clone, Copy)]
pub struct MergeInput<'a> {
    /// Descriptor snapshot in discovery order.
    pub descriptors: &'a [Descriptor],
    /// In-flight transfers; ignored on the final pass.
    pub active: &'a [ActiveStatus],
    /// Lookup results for the digests returned by `pending_lookups`.
    pub lookups: &'a HashMap<Digest, Lookup>,
    /// Completion was signaled; force every row to a terminal state.
    pub done: bool,
}

/// Keeps the previous tick's rows and turns fresh snapshots into ordered rows.
#[derive(Debug)]
pub struct StatusMerger {
    name: String,
    direction: Direction,
    started_at: DateTime<Utc>,
    rows: HashMap<String, StatusRow>,
}

impl StatusMerger {
    pub fn new(name: impl Into<String>, direction: Direction, started_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            direction,
            started_at,
            rows: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Digests whose rows must be re-derived from a point lookup this tick.
    ///
    /// These are descriptors with no active entry whose prior row is either
    /// missing or still shows bytes in flight.
    pub fn pending_lookups(&self, descriptors: &[Descriptor], active: &[ActiveStatus]) -> Vec<Digest> {
        let active_keys: HashSet<&str> = active.iter().map(|a| a.key.as_str()).collect();
        let mut seen = HashSet::new();
        descriptors
            .iter()
            .filter(|d| {
                let key = d.ref_key();
                !active_keys.contains(key.as_str()) && self.needs_lookup(&key)
            })
            .filter(|d| seen.insert(d.digest.clone()))
            .map(|d| d.digest.clone())
            .collect()
    }

    fn needs_lookup(&self, key: &str) -> bool {
        match self.rows.get(key) {
            None => true,
            Some(row) => row.state.is_active(),
        }
    }

    /// Produce one row per tracked key: the transfer name first, then each
    /// descriptor in discovery order.
    pub fn merge(&mut self, input: MergeInput<'_>) -> Vec<StatusRow> {
        let keys: Vec<String> = input.descriptors.iter().map(Descriptor::ref_key).collect();
        let tracked: HashSet<&str> = keys.iter().map(String::as_str).collect();

        let name_state = if input.done {
            TransferState::Done
        } else {
            TransferState::Resolving
        };
        self.rows
            .insert(self.name.clone(), StatusRow::new(self.name.clone(), name_state));

        let mut seen_active = HashSet::new();
        if !input.done {
            let state = self.direction.active_state();
            for active in input.active {
                if tracked.contains(active.key.as_str()) {
                    self.rows
                        .insert(active.key.clone(), StatusRow::from_active(active, state));
                    seen_active.insert(active.key.as_str());
                }
            }
        }

        for (descriptor, key) in input.descriptors.iter().zip(&keys) {
            if seen_active.contains(key.as_str()) {
                continue;
            }

            if input.done {
                match self.rows.get_mut(key) {
                    Some(row) if !row.state.is_terminal() => row.state = TransferState::Done,
                    Some(_) => {}
                    None => {
                        self.rows
                            .insert(key.clone(), StatusRow::new(key.clone(), TransferState::Done));
                    }
                }
                continue;
            }

            if !self.needs_lookup(key) {
                continue;
            }

            let row = match input.lookups.get(&descriptor.digest) {
                Some(Lookup::Missing) => StatusRow::new(key.clone(), TransferState::Waiting),
                Some(Lookup::Found(info)) if info.created_at > self.started_at => StatusRow {
                    key: key.clone(),
                    state: TransferState::Done,
                    offset: info.size,
                    total: info.size,
                    started_at: None,
                    updated_at: Some(info.created_at),
                },
                Some(Lookup::Found(_)) => StatusRow::new(key.clone(), TransferState::Exists),
                // No answer this tick; leave any prior row alone.
                None => match self.rows.get(key) {
                    Some(_) => continue,
                    None => StatusRow::new(key.clone(), TransferState::Waiting),
                },
            };
            self.rows.insert(key.clone(), row);
        }

        std::iter::once(&self.name)
            .chain(keys.iter())
            .filter_map(|key| self.rows.get(key).cloned())
            .collect()
    }
}
