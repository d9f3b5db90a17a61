#[cfg(unix)]
mod fd;

#[cfg(unix)]
pub use self::fd::FdDevice;

#[cfg(test)]
pub use self::mock::MockDevice;

use std::io;

/// Frame-level I/O on an open virtual interface.
///
/// Each call moves exactly one frame. Implementations must tolerate one
/// reader and one writer running concurrently on different threads.
pub trait Device: Send + Sync {
    /// Receive one frame into `buf`, blocking until one is available.
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Send one frame.
    fn send(&self, buf: &[u8]) -> io::Result<usize>;

    /// Descriptor backing this device, if it has one.
    #[cfg(unix)]
    fn raw_fd(&self) -> Option<std::os::fd::RawFd> {
        None
    }
}
