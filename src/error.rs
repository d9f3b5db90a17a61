use crate::pkbuf::BufferError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by device creation and the data path.
#[derive(Debug, Error)]
pub enum TunError {
    /// The host has no virtual-interface kernel surface.
    #[error("virtual network interfaces are not supported on this platform")]
    Unsupported,

    /// The control node could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    DeviceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// TUNSETIFF rejected the request. The descriptor is already closed.
    #[error("TUNSETIFF failed on {} for `{ifname}` (flags {flags:#x}): {source}", path.display())]
    ConfigurationFailed {
        path: PathBuf,
        ifname: String,
        flags: i32,
        #[source]
        source: io::Error,
    },

    /// One receive attempt yielded no frame.
    #[error("read from `{ifname}` failed: {source}")]
    ReadFailed {
        ifname: String,
        #[source]
        source: io::Error,
    },

    /// One transmit attempt failed.
    #[error("write to `{ifname}` failed: {source}")]
    WriteFailed {
        ifname: String,
        #[source]
        source: io::Error,
    },

    #[error("packet pool `{pool}` is exhausted")]
    PoolExhausted { pool: String },

    #[error("packet buffer: {0}")]
    Buffer(#[from] BufferError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TunError {
    /// Name of the operation that failed, for log lines.
    pub fn operation(&self) -> &'static str {
        match self {
            TunError::Unsupported => "open",
            TunError::DeviceUnavailable { .. } => "open",
            TunError::ConfigurationFailed { .. } => "ioctl",
            TunError::ReadFailed { .. } => "read",
            TunError::WriteFailed { .. } => "write",
            TunError::PoolExhausted { .. } => "alloc",
            TunError::Buffer(_) => "pkbuf",
            TunError::InvalidConfig(_) => "config",
        }
    }

    /// Underlying OS error code, when the failure came from a system call.
    pub fn os_error(&self) -> Option<i32> {
        match self {
            TunError::DeviceUnavailable { source, .. }
            | TunError::ConfigurationFailed { source, .. }
            | TunError::ReadFailed { source, .. }
            | TunError::WriteFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// True when a read failed because the device reported end of file.
    pub fn is_eof(&self) -> bool {
        matches!(
            self,
            TunError::ReadFailed { source, .. } if source.kind() == io::ErrorKind::UnexpectedEof
        )
    }

    /// True when a read failed with an errno that may clear on retry
    /// (EINTR, EAGAIN, ENOBUFS). Other read failures mean the device is gone.
    pub fn is_transient(&self) -> bool {
        let TunError::ReadFailed { source, .. } = self else {
            return false;
        };
        match source.raw_os_error() {
            Some(errno) => matches!(errno, libc::EINTR | libc::EAGAIN | libc::ENOBUFS),
            None => matches!(
                source.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, TunError>;
