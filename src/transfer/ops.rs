// ABOUTME: Local image operations built on the coordinator's backend.
// ABOUTME: Existence checks, retagging, removal, archive export/import, and mirroring.

use super::archive::{self, ArchiveError, CONTAINERD_NAME_ANNOTATION, Layout, REF_NAME_ANNOTATION};
use super::coordinator::TransferCoordinator;
use super::error::{
    ArchiveSnafu, CoordinatorError, InspectSnafu, LookupSnafu, Operation, RemoveSnafu, TagSnafu,
};
use super::inspect;
use crate::progress::EventLevel;
use crate::runtime::traits::{
    ContentError, ContentStore, ImageBackend, ImageRecord, ImageStore, ImageStoreError,
    RegistryAuth,
};
use crate::types::{Descriptor, Index, media_types};
use bytes::Bytes;
use snafu::{IntoError, ResultExt};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

impl<B: ImageBackend + 'static> TransferCoordinator<B> {
    /// Whether `reference` names a local image. Returns the normalized name.
    pub async fn image_exists(&self, reference: &str) -> Result<(String, bool), CoordinatorError> {
        let op = Operation::Exists;
        let image = self.parse(op, reference)?;
        let name = image.to_string();
        match self.backend.get(&image).await {
            Ok(_) => Ok((name, true)),
            Err(err) if err.is_not_found() => Ok((name, false)),
            Err(source) => {
                self.report_failure(op, "check image failed", &source);
                Err(LookupSnafu {
                    operation: op,
                    reference: name,
                }
                .into_error(source))
            }
        }
    }

    /// All local image records, sorted by name.
    pub async fn list(&self) -> Result<Vec<ImageRecord>, CoordinatorError> {
        self.backend.list().await.context(LookupSnafu {
            operation: Operation::Exists,
            reference: "*".to_string(),
        })
    }

    /// Give the image `source` the additional name `target`, replacing any
    /// image already called `target`.
    pub async fn tag(&self, source: &str, target: &str) -> Result<(), CoordinatorError> {
        let op = Operation::Tag;
        let from = self.parse(op, source)?;
        let to = self.parse(op, target)?;
        self.sink.event(
            EventLevel::Info,
            op.step(),
            &format!("change image tag: {from} -> {to}"),
        );

        let tag_context = || TagSnafu {
            from: from.to_string(),
            to: to.to_string(),
        };

        let record = self
            .backend
            .get(&from)
            .await
            .context(tag_context())
            .inspect_err(|err| self.report_failure(op, "get source image failed", err))?;

        self.replace_record(ImageRecord::new(to.clone(), record.target))
            .await
            .context(tag_context())
            .inspect_err(|err| self.report_failure(op, "create target image failed", err))?;

        info!(from = %from, to = %to, "retagged image");
        self.sink
            .event(EventLevel::Info, op.step(), "change image tag success");
        Ok(())
    }

    /// Delete the image record `reference`. Its blobs stay in the store.
    pub async fn remove(&self, reference: &str) -> Result<(), CoordinatorError> {
        let op = Operation::Remove;
        let image = self.parse(op, reference)?;
        self.backend
            .delete(&image)
            .await
            .context(RemoveSnafu {
                reference: image.to_string(),
            })
            .inspect_err(|err| self.report_failure(op, "remove image failed", err))?;
        info!(image = %image, "removed image");
        Ok(())
    }

    /// Export `reference` with every locally present blob to an image
    /// layout tar at `path`.
    pub async fn save(&self, reference: &str, path: &Path) -> Result<(), CoordinatorError> {
        let op = Operation::Save;
        let image = self.parse(op, reference)?;
        let name = image.to_string();

        let record = self
            .backend
            .get(&image)
            .await
            .context(LookupSnafu {
                operation: op,
                reference: name.clone(),
            })
            .inspect_err(|err| self.report_failure(op, "get image failed", err))?;

        let inspect_context = || InspectSnafu {
            operation: op,
            reference: name.clone(),
        };
        let descriptors = inspect::walk(&*self.backend, &record.target)
            .await
            .context(inspect_context())
            .inspect_err(|err| self.report_failure(op, "walk image content failed", err))?;

        let mut blobs = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            let data = self
                .backend
                .read_blob(&descriptor.digest)
                .await
                .map_err(|source| inspect_context().into_error(source.into()))
                .inspect_err(|err| self.report_failure(op, "read blob failed", err))?;
            blobs.push((descriptor.digest.clone(), data.to_vec()));
        }

        let mut target = record.target.clone();
        target.annotations = BTreeMap::from([
            (REF_NAME_ANNOTATION.to_string(), name.clone()),
            (CONTAINERD_NAME_ANNOTATION.to_string(), name.clone()),
        ]);
        let index = Index {
            schema_version: 2,
            media_type: Some(media_types::OCI_INDEX.to_string()),
            manifests: vec![target],
            annotations: BTreeMap::new(),
        };

        let dest = path.to_path_buf();
        let blob_count = blobs.len();
        run_blocking(move || archive::write_layout(&dest, &index, &blobs))
            .await
            .context(ArchiveSnafu {
                operation: op,
                path: path.to_path_buf(),
            })
            .inspect_err(|err| self.report_failure(op, "write archive failed", err))?;

        info!(image = %name, path = %path.display(), blobs = blob_count, "saved image");
        Ok(())
    }

    /// Import an image layout tar. Every blob is verified before it is
    /// stored. Returns the names of the images created.
    pub async fn load(&self, path: &Path) -> Result<Vec<String>, CoordinatorError> {
        let op = Operation::Load;
        let archive_context = || ArchiveSnafu {
            operation: op,
            path: path.to_path_buf(),
        };

        let source = path.to_path_buf();
        let Layout { index, blobs } = run_blocking(move || archive::read_layout(&source))
            .await
            .context(archive_context())
            .inspect_err(|err| self.report_failure(op, "read archive failed", err))?;
        let index = index
            .ok_or_else(|| archive_context().into_error(ArchiveError::Missing(archive::INDEX_FILE)))?;

        for (digest, data) in blobs {
            let descriptor = Descriptor::new(
                "application/octet-stream",
                digest.clone(),
                data.len() as u64,
            );
            self.backend
                .write_blob(&descriptor, Bytes::from(data))
                .await
                .map_err(|source| {
                    InspectSnafu {
                        operation: op,
                        reference: digest.to_string(),
                    }
                    .into_error(source.into())
                })
                .inspect_err(|err| self.report_failure(op, "import blob failed", err))?;
        }

        let mut names = Vec::new();
        for mut entry in index.manifests {
            let Some(raw_name) = entry
                .annotations
                .get(CONTAINERD_NAME_ANNOTATION)
                .or_else(|| entry.annotations.get(REF_NAME_ANNOTATION))
                .cloned()
            else {
                debug!(digest = %entry.digest, "skipping unnamed index entry");
                continue;
            };
            let image = self.parse(op, &raw_name)?;
            let name = image.to_string();

            let present = self.backend.contains(&entry.digest).await.map_err(|source| {
                InspectSnafu {
                    operation: op,
                    reference: name.clone(),
                }
                .into_error(source.into())
            })?;
            if !present {
                let err = InspectSnafu {
                    operation: op,
                    reference: name.clone(),
                }
                .into_error(ContentError::NotFound(entry.digest.clone()).into());
                self.report_failure(op, "archive is missing image content", &err);
                return Err(err);
            }

            entry.annotations.clear();
            self.replace_record(ImageRecord::new(image, entry))
                .await
                .context(LookupSnafu {
                    operation: op,
                    reference: name.clone(),
                })
                .inspect_err(|err| self.report_failure(op, "create image failed", err))?;
            info!(image = %name, "loaded image");
            names.push(name);
        }

        Ok(names)
    }

    /// Make `source` available in its registry by copying it from `target`.
    ///
    /// Does nothing when `source` is already present locally. Otherwise
    /// pulls `target`, retags it as `source`, and pushes `source`.
    pub async fn mirror(
        &self,
        source: &str,
        target: &str,
        auth: Option<&RegistryAuth>,
        timeout: Duration,
    ) -> Result<(), CoordinatorError> {
        let op = Operation::Mirror;
        let (source_name, exists) = self.image_exists(source).await?;
        info!(source = %source_name, target = %target, exists, "mirroring image");
        if exists {
            return Ok(());
        }

        if let Err(err) = self.pull(target, auth, timeout).await {
            self.sink.event(
                EventLevel::Error,
                op.step(),
                &format!("pull image {target} failed: {err}"),
            );
            return Err(err);
        }
        if let Err(err) = self.tag(target, source).await {
            self.sink.event(
                EventLevel::Error,
                op.step(),
                &format!("change image tag {target} to {source} failed"),
            );
            return Err(err);
        }
        if let Err(err) = self.push(source, auth, timeout).await {
            self.sink.event(
                EventLevel::Error,
                op.step(),
                &format!("push image {source} failed: {err}"),
            );
            return Err(err);
        }
        Ok(())
    }

    /// Create `record`, replacing an existing image of the same name.
    async fn replace_record(&self, record: ImageRecord) -> Result<ImageRecord, ImageStoreError> {
        match self.backend.create(record.clone()).await {
            Err(ImageStoreError::AlreadyExists(_)) => {
                self.backend.delete(&record.name).await?;
                self.backend.create(record).await
            }
            other => other,
        }
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, ArchiveError>
where
    F: FnOnce() -> Result<T, ArchiveError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| ArchiveError::Task(err.to_string()))?
}
