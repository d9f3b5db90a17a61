//! Device backends, chosen once per process by [`detect`].

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use self::linux::LinuxBackend;

use crate::error::{Result, TunError};
use crate::tun::Mode;
use crate::Device;

/// Control node of the Linux tun driver.
pub const TUN_DEV_PATH: &str = "/dev/net/tun";

/// A configured device as handed back by a backend.
pub struct Opened {
    pub device: Box<dyn Device>,
    /// Name the kernel actually assigned.
    pub ifname: String,
}

/// Creates and configures virtual interfaces.
///
/// Creation is all-or-nothing: on error no descriptor stays open.
pub trait Backend: Send + Sync {
    fn create(&self, ifname: &str, mode: Mode) -> Result<Opened>;

    fn name(&self) -> &'static str;
}

/// Backend for hosts without a virtual-interface kernel surface.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBackend;

impl Backend for UnsupportedBackend {
    fn create(&self, _ifname: &str, _mode: Mode) -> Result<Opened> {
        Err(TunError::Unsupported)
    }

    fn name(&self) -> &'static str {
        "unsupported"
    }
}

/// Pick the backend this host supports.
pub fn detect() -> Box<dyn Backend> {
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxBackend::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(UnsupportedBackend)
    }
}
