// ABOUTME: OCI image layout tar archives for save and load.
// ABOUTME: Blocking tar I/O meant to run inside spawn_blocking.

use crate::types::{Digest, Index, ParseDigestError};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const OCI_LAYOUT_FILE: &str = "oci-layout";
pub const INDEX_FILE: &str = "index.json";
pub const OCI_LAYOUT_VERSION: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;

/// Annotation holding the image name in `index.json`.
pub const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";
/// Full image name as written by containerd exports.
pub const CONTAINERD_NAME_ANNOTATION: &str = "io.containerd.image.name";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive has no {0}")]
    Missing(&'static str),

    #[error("malformed index.json: {0}")]
    Index(#[from] serde_json::Error),

    #[error("invalid blob path {path}: {source}")]
    BlobPath {
        path: String,
        #[source]
        source: ParseDigestError,
    },

    #[error("archive task failed: {0}")]
    Task(String),
}

/// Contents of an image layout archive.
#[derive(Debug, Default)]
pub struct Layout {
    pub index: Option<Index>,
    pub blobs: Vec<(Digest, Vec<u8>)>,
}

pub fn blob_path(digest: &Digest) -> String {
    format!("blobs/{}/{}", digest.algorithm(), digest.hex())
}

/// Write an image layout tar to `path`.
pub fn write_layout(path: &Path, index: &Index, blobs: &[(Digest, Vec<u8>)]) -> Result<(), ArchiveError> {
    let file = File::create(path)?;
    let mut builder = tar::Builder::new(file);

    append(&mut builder, OCI_LAYOUT_FILE, OCI_LAYOUT_VERSION.as_bytes())?;
    append(&mut builder, INDEX_FILE, &serde_json::to_vec_pretty(index)?)?;
    for (digest, data) in blobs {
        append(&mut builder, &blob_path(digest), data)?;
    }

    builder.into_inner()?.sync_all()?;
    Ok(())
}

fn append(builder: &mut tar::Builder<File>, name: &str, data: &[u8]) -> Result<(), ArchiveError> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, data)?;
    Ok(())
}

/// Read an image layout tar from `path`.
pub fn read_layout(path: &Path) -> Result<Layout, ArchiveError> {
    let mut archive = tar::Archive::new(File::open(path)?);
    let mut layout = Layout::default();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.to_string_lossy().trim_start_matches("./").to_string();
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;

        if name == INDEX_FILE {
            layout.index = Some(serde_json::from_slice(&data)?);
        } else if let Some(rest) = name.strip_prefix("blobs/") {
            let digest = rest
                .split_once('/')
                .map(|(algorithm, hex)| format!("{algorithm}:{hex}"))
                .unwrap_or_else(|| rest.to_string());
            let digest = Digest::parse(&digest).map_err(|source| ArchiveError::BlobPath {
                path: name.clone(),
                source,
            })?;
            layout.blobs.push((digest, data));
        }
    }

    if layout.index.is_none() {
        return Err(ArchiveError::Missing(INDEX_FILE));
    }
    Ok(layout)
}
