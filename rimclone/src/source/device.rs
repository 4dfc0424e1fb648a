// SPDX-License-Identifier: MIT

use std::path::{Path, PathBuf};

use crate::host::BlockHost;

/// The disk to read from, attached as a loop device when the operator gave an image.
///
/// The loop device is detached when this value is dropped.
pub struct SourceDevice<'h, H: BlockHost + ?Sized> {
    host: &'h H,
    disk: PathBuf,
    loop_device: Option<PathBuf>,
}

impl<'h, H: BlockHost + ?Sized> SourceDevice<'h, H> {
    /// Accepts a disk (`/dev/sdb`), one of its partitions (`/dev/sdb2`) or an image file.
    pub fn resolve(host: &'h H, input: &Path) -> anyhow::Result<Self> {
        if input.is_file() {
            crate::log_info!("Attaching image {} ...", input.display());
            let node = host.attach_image(input)?;
            crate::log_verbose!("Image attached as {}", node.display());
            return Ok(Self {
                host,
                disk: node.clone(),
                loop_device: Some(node),
            });
        }

        let disk = match host.parent_disk(input)? {
            Some(parent) => Path::new("/dev").join(parent),
            None => input.to_path_buf(),
        };
        if disk != input {
            crate::log_verbose!("{} is a partition of {}", input.display(), disk.display());
        }
        Ok(Self {
            host,
            disk,
            loop_device: None,
        })
    }

    pub fn disk(&self) -> &Path {
        &self.disk
    }

    pub fn is_image(&self) -> bool {
        self.loop_device.is_some()
    }
}

impl<H: BlockHost + ?Sized> Drop for SourceDevice<'_, H> {
    fn drop(&mut self) {
        if let Some(node) = self.loop_device.take() {
            crate::log_verbose!("Detaching {} ...", node.display());
            if let Err(e) = self.host.detach_image(&node) {
                crate::log_warn!("could not detach {}: {e:#}", node.display());
            }
        }
    }
}
