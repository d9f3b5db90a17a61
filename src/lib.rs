//! User-space adapter for Linux TUN/TAP interfaces.
//!
//! [`TunDevice`] creates a kernel virtual interface and moves one frame per
//! call between it and [`PacketBuffer`]s drawn from a [`PacketBufferPool`].
//! Received packets keep [`TUN_MAX_HEADROOM`] bytes free in front so a later
//! layer can prepend its header in place.

pub mod address;
pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod logger;
pub mod pkbuf;
pub mod tun;

#[cfg(test)]
mod test;

pub use address::{AddressConfigurator, IpSubnet, NoopConfigurator};
pub use backend::{detect, Backend, UnsupportedBackend};
#[cfg(target_os = "linux")]
pub use backend::LinuxBackend;
pub use config::TunConfig;
pub use device::Device;
pub use error::{Result, TunError};
pub use logger::{LogLogger, Logger, NullLogger};
pub use pkbuf::{BufferError, PacketBuffer, PacketBufferPool};
pub use tun::{Mode, TunDevice, MAX_PKT_LEN, TUN_MAX_HEADROOM};
