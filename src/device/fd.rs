use crate::Device;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

/// Device over an owned descriptor, e.g. a configured `/dev/net/tun` handle.
///
/// The descriptor is closed when the device is dropped.
#[derive(Debug)]
pub struct FdDevice {
    file: File,
}

impl FdDevice {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    pub fn from_owned_fd(fd: OwnedFd) -> Self {
        Self {
            file: File::from(fd),
        }
    }
}

impl Device for FdDevice {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.file).read(buf)
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        (&self.file).write(buf) // one frame per write, no buffering
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.file.as_raw_fd())
    }
}

impl AsRawFd for FdDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
