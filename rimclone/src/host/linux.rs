// SPDX-License-Identifier: MIT

use anyhow::Context;
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::host::{BlockHost, Cmd, Effect, cmd_builder as cb, parse};
use crate::source::{FsFootprint, PartitionInfo, PartitionTable, device_name};

/// [`BlockHost`] backed by util-linux, e2fsprogs and fsarchiver.
#[derive(Debug, Clone, Default)]
pub struct LinuxHost;

impl LinuxHost {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, cmd: &Cmd) -> anyhow::Result<String> {
        crate::log_verbose!("$ {cmd}");
        let output = spawn(cmd)?;
        if !cmd.accepts(output.status.code()) {
            anyhow::bail!(failure(cmd.program, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn spawn(cmd: &Cmd) -> anyhow::Result<Output> {
    let mut command = Command::new(cmd.program);
    command
        .args(&cmd.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if cmd.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    let mut child = command
        .spawn()
        .with_context(|| format!("cannot start `{}`", cmd.program))?;

    if let Some(input) = &cmd.stdin {
        let mut stdin = child
            .stdin
            .take()
            .with_context(|| format!("`{}`: stdin unavailable", cmd.program))?;
        stdin.write_all(input.as_bytes())?;
    }

    Ok(child.wait_with_output()?)
}

fn failure(program: &str, output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    match output.status.code() {
        Some(code) if stderr.is_empty() => format!("`{program}` exited with code {code}"),
        Some(code) => format!("`{program}` exited with code {code}: {stderr}"),
        None => format!("`{program}` killed by signal"),
    }
}

impl BlockHost for LinuxHost {
    fn list_block_devices(&self) -> anyhow::Result<BTreeSet<String>> {
        let out = self.run(&cb::list_devices())?;
        Ok(parse::device_names(&out))
    }

    fn parent_disk(&self, device: &Path) -> anyhow::Result<Option<String>> {
        let out = self.run(&cb::parent_disk(device))?;
        Ok(parse::first_line(&out))
    }

    fn partitions_of(&self, device: &Path) -> anyhow::Result<Vec<PartitionInfo>> {
        let out = self.run(&cb::list_partitions(device))?;
        let mut parts = parse::lsblk_partitions(&out)?;
        // lsblk leaves FSTYPE blank when udev has not probed the partition yet.
        for part in parts.iter_mut().filter(|p| p.fs_type.is_empty()) {
            if let Ok(out) = self.run(&cb::probe_fstype(&part.node())) {
                part.fs_type = out.trim().to_string();
            }
        }
        Ok(parts)
    }

    fn capacity_bytes(&self, device: &Path) -> anyhow::Result<u64> {
        let out = self.run(&cb::capacity(device))?;
        parse::size_bytes(&out)
    }

    fn fs_footprint(&self, partition: &Path) -> anyhow::Result<FsFootprint> {
        let block_size = parse::dumpe2fs_block_size(&self.run(&cb::superblock(partition))?)?;
        let min_blocks = parse::resize2fs_min_blocks(&self.run(&cb::min_blocks(partition))?)?;
        Ok(FsFootprint {
            block_size,
            min_blocks,
        })
    }

    fn disk_identifier(&self, device: &Path) -> anyhow::Result<Option<String>> {
        let out = self.run(&cb::disk_id(device))?;
        Ok(parse::dos_disk_id(&out))
    }

    fn write_partition_table(&self, device: &Path, table: &PartitionTable) -> anyhow::Result<()> {
        self.run(&cb::write_table(device, table))?;
        Ok(())
    }

    fn grow_partition(&self, device: &Path, index: u32) -> anyhow::Result<()> {
        self.run(&cb::grow_partition(device, index))?;
        Ok(())
    }

    fn erase_signatures(&self, device: &Path) -> anyhow::Result<Effect> {
        let out = self.run(&cb::wipe(device))?;
        if out.trim().is_empty() {
            Ok(Effect::NotApplicable)
        } else {
            Ok(Effect::Done)
        }
    }

    fn settle_device_nodes(&self, device: &Path) -> anyhow::Result<()> {
        self.run(&cb::udev_settle())?;
        self.run(&cb::reread_table(device))?;
        self.run(&cb::udev_settle())?;
        Ok(())
    }

    fn unmount_all(&self, device: &Path) -> anyhow::Result<Effect> {
        let mounts = std::fs::read_to_string("/proc/self/mounts").context("read /proc/self/mounts")?;
        let points = parse::mounts_of(&mounts, &device_name(device));
        if points.is_empty() {
            return Ok(Effect::NotApplicable);
        }

        let errors: Vec<String> = points
            .iter()
            .filter_map(|point| self.run(&cb::umount(point)).err())
            .map(|e| e.to_string())
            .collect();
        if !errors.is_empty() {
            anyhow::bail!(errors.join("; "));
        }
        Ok(Effect::Done)
    }

    fn copy_blocks(&self, src: &Path, dst: &Path) -> anyhow::Result<()> {
        self.run(&cb::block_copy(src, dst))?;
        Ok(())
    }

    fn restore_filesystem(&self, src: &Path, dst: &Path) -> anyhow::Result<()> {
        let save = cb::save_fs(src);
        let restore = cb::restore_fs(dst);
        crate::log_verbose!("$ {save} | {restore}");

        let mut saver = Command::new(save.program)
            .args(&save.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("cannot start `{}`", save.program))?;
        let archive = saver
            .stdout
            .take()
            .context("fsarchiver savefs: stdout unavailable")?;
        let mut err_pipe = saver.stderr.take();
        // Drained on its own thread so a chatty saver cannot stall the pipe.
        let saver_err = std::thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(err) = err_pipe.as_mut() {
                let _ = err.read_to_end(&mut buf);
            }
            buf
        });

        let restorer = match Command::new(restore.program)
            .args(&restore.args)
            .stdin(Stdio::from(archive))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let _ = saver.kill();
                let _ = saver.wait();
                return Err(e).with_context(|| format!("cannot start `{}`", restore.program));
            }
        };

        let restored = restorer.wait_with_output()?;
        let saved_status = saver.wait()?;
        let saved = Output {
            status: saved_status,
            stdout: Vec::new(),
            stderr: saver_err.join().unwrap_or_default(),
        };

        if !save.accepts(saved.status.code()) {
            anyhow::bail!(failure("fsarchiver savefs", &saved));
        }
        if !restore.accepts(restored.status.code()) {
            anyhow::bail!(failure("fsarchiver restfs", &restored));
        }
        Ok(())
    }

    fn grow_filesystem(&self, partition: &Path) -> anyhow::Result<()> {
        self.run(&cb::check_fs(partition))?;
        self.run(&cb::resize_fs(partition))?;
        Ok(())
    }

    fn flush_buffers(&self, device: &Path) -> anyhow::Result<()> {
        self.run(&cb::flush_buffers(device))?;
        Ok(())
    }

    fn sync(&self) -> anyhow::Result<()> {
        self.run(&cb::sync())?;
        Ok(())
    }

    fn attach_image(&self, image: &Path) -> anyhow::Result<PathBuf> {
        let out = self.run(&cb::loop_attach(image))?;
        let node = parse::first_line(&out)
            .with_context(|| format!("losetup printed no device for {}", image.display()))?;
        if let Err(e) = self.run(&cb::udev_settle()) {
            crate::log_verbose!("udevadm settle after losetup: {e}");
        }
        Ok(PathBuf::from(node))
    }

    fn detach_image(&self, loop_device: &Path) -> anyhow::Result<()> {
        self.run(&cb::loop_detach(loop_device))?;
        Ok(())
    }
}
