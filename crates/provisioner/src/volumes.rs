//! Disk image handling: attach, copy contents, detach.

use crate::commands;
use crate::executor::CommandRunner;
use crate::fileset::find_files;
use macdeploy_common::Result;
use macdeploy_report_schema::EntityResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A disk image attached during this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedVolume {
    pub image: PathBuf,
    pub mount_point: PathBuf,
}

/// Mount point from `hdiutil attach` output: the last tab separated field.
pub fn parse_mount_point(output: &str) -> Option<PathBuf> {
    let field = output.split('\t').last()?.trim();
    if field.is_empty() {
        None
    } else {
        Some(PathBuf::from(field))
    }
}

pub struct VolumeMounter {
    runner: Arc<dyn CommandRunner>,
}

impl VolumeMounter {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn read_dmg_directory(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        find_files(dir, ".dmg")
    }

    /// Attach each image; failures are logged and left out of the result.
    pub async fn attach_dmgs(&self, images: &[PathBuf]) -> Vec<MountedVolume> {
        let mut mounted = Vec::new();
        for image in images {
            let output = match self.runner.run(&commands::attach_disk_image(image)).await {
                Ok(output) if output.success() => output,
                Ok(output) => {
                    error!("Failed to attach {}: {}", image.display(), output.combined());
                    continue;
                }
                Err(e) => {
                    error!("Failed to attach {}: {}", image.display(), e);
                    continue;
                }
            };
            match parse_mount_point(&output.stdout) {
                Some(mount_point) => {
                    info!("Attached {} at {}", image.display(), mount_point.display());
                    mounted.push(MountedVolume {
                        image: image.clone(),
                        mount_point,
                    });
                }
                None => warn!("No mount point reported for {}", image.display()),
            }
        }
        mounted
    }

    /// Copy each volume's contents into `target_dir`, one result per volume.
    pub async fn add_dmg_packages(
        &self,
        volumes: &[MountedVolume],
        target_dir: &Path,
    ) -> Vec<EntityResult> {
        let mut results = Vec::with_capacity(volumes.len());
        for volume in volumes {
            let name = volume.image.display().to_string();
            // trailing "/." copies the contents, not the mount directory itself
            let source = volume.mount_point.join(".");
            match self
                .runner
                .run(&commands::copy_tree(&source, target_dir))
                .await
            {
                Ok(output) if output.success() => {
                    info!("Copied {} into {}", volume.mount_point.display(), target_dir.display());
                    results.push(EntityResult::completed(name));
                }
                Ok(output) => {
                    error!("Failed to copy {}: {}", volume.mount_point.display(), output.combined());
                    results.push(EntityResult::failed(name, output.combined()));
                }
                Err(e) => {
                    error!("Failed to copy {}: {}", volume.mount_point.display(), e);
                    results.push(EntityResult::failed(name, e.to_string()));
                }
            }
        }
        results
    }

    /// Detach every volume, regardless of how its copy went.
    pub async fn detach_dmgs(&self, volumes: &[MountedVolume]) {
        for volume in volumes {
            match self
                .runner
                .run(&commands::detach_disk_image(&volume.mount_point))
                .await
            {
                Ok(output) if output.success() => {
                    info!("Detached {}", volume.mount_point.display())
                }
                Ok(output) => warn!(
                    "Failed to detach {}: {}",
                    volume.mount_point.display(),
                    output.combined()
                ),
                Err(e) => warn!("Failed to detach {}: {}", volume.mount_point.display(), e),
            }
        }
    }

    /// Attach, copy and detach every image found in `dist_dir`, copying into
    /// `target_dir`.
    pub async fn stage_disk_images(&self, dist_dir: &Path, target_dir: &Path) -> Vec<EntityResult> {
        let images = match self.read_dmg_directory(dist_dir) {
            Ok(images) => images,
            Err(e) => {
                error!("Cannot search {} for disk images: {}", dist_dir.display(), e);
                return Vec::new();
            }
        };
        if images.is_empty() {
            info!("No disk images found in {}", dist_dir.display());
            return Vec::new();
        }

        let volumes = self.attach_dmgs(&images).await;
        let mut results: Vec<EntityResult> = images
            .iter()
            .filter(|image| !volumes.iter().any(|v| &v.image == *image))
            .map(|image| EntityResult::failed(image.display().to_string(), "attach failed"))
            .collect();
        results.extend(self.add_dmg_packages(&volumes, target_dir).await);
        self.detach_dmgs(&volumes).await;
        results
    }
}
