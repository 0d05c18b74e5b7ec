//! Linux NBD binding
//!
//! Sets a `/dev/nbdX` device up for a partition and hands the kernel one end
//! of a Unix socket pair. The other end is the device channel the proxy
//! serves. The kernel's request loop (`NBD_DO_IT`) blocks for the lifetime
//! of the device, so it runs on its own thread.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::{self, JoinHandle};

use crate::config::Config;
use crate::error::Result;

const NBD_SET_SOCK: u64 = 0xab00;
const NBD_SET_BLKSIZE: u64 = 0xab01;
const NBD_DO_IT: u64 = 0xab03;
const NBD_CLEAR_SOCK: u64 = 0xab04;
const NBD_CLEAR_QUE: u64 = 0xab05;
const NBD_SET_SIZE_BLOCKS: u64 = 0xab07;

/// An NBD device configured and waiting to be served
pub struct NbdBinding {
    device: File,
    kernel_end: UnixStream,
}

impl NbdBinding {
    /// Configure `path` as a block device of `size` bytes
    ///
    /// Returns the binding and the proxy's end of the device channel.
    pub fn attach(path: &Path, size: u64, config: &Config) -> Result<(Self, UnixStream)> {
        let device = OpenOptions::new().read(true).write(true).open(path)?;

        limit_request_size(path, config.max_sectors_kb);

        let power = u32::from(config.nbd_block_size_power);
        let fd = device.as_raw_fd();
        ioctl(fd, NBD_SET_BLKSIZE, 1 << power)?;
        ioctl(fd, NBD_SET_SIZE_BLOCKS, (size >> power) as libc::c_ulong)?;

        let (kernel_end, proxy_end) = UnixStream::pair()?;
        ioctl(fd, NBD_SET_SOCK, kernel_end.as_raw_fd() as libc::c_ulong)?;

        tracing::info!(
            "Attached {} ({} bytes, {} byte blocks)",
            path.display(),
            size,
            1u64 << power
        );
        Ok((Self { device, kernel_end }, proxy_end))
    }

    /// Run the kernel request loop on a background thread
    ///
    /// The thread finishes when the device is disconnected; the kernel end
    /// of the channel is closed then, which ends the proxy loop.
    pub fn serve(self) -> Result<JoinHandle<Result<()>>> {
        let handle = thread::Builder::new()
            .name("nbd-do-it".to_string())
            .spawn(move || self.do_it())?;
        Ok(handle)
    }

    fn do_it(self) -> Result<()> {
        let fd = self.device.as_raw_fd();
        let result = ioctl(fd, NBD_DO_IT, 0);

        if let Err(e) = ioctl(fd, NBD_CLEAR_QUE, 0) {
            tracing::warn!("ioctl(NBD_CLEAR_QUE): {}", e);
        }
        if let Err(e) = ioctl(fd, NBD_CLEAR_SOCK, 0) {
            tracing::warn!("ioctl(NBD_CLEAR_SOCK): {}", e);
        }

        drop(self.kernel_end);
        tracing::info!("Block device released");
        Ok(result?)
    }
}

/// Cap the kernel's request size; large merged requests fail more often
fn limit_request_size(path: &Path, max_sectors_kb: u32) {
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => return,
    };
    let knob = format!("/sys/block/{}/queue/max_sectors_kb", name);
    if let Err(e) = fs::write(&knob, max_sectors_kb.to_string()) {
        tracing::debug!("Could not write {}: {}", knob, e);
    }
}

fn ioctl(fd: RawFd, request: u64, arg: libc::c_ulong) -> io::Result<()> {
    // SAFETY: every NBD ioctl used here takes a plain integer argument and
    // `fd` is an open block device for the duration of the call.
    let rc = unsafe { libc::ioctl(fd, request as _, arg) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
