use super::{Backend, Opened, TUN_DEV_PATH};
use crate::device::FdDevice;
use crate::error::{Result, TunError};
use crate::tun::Mode;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

/// IFF_TUN flag - TUN device (layer 3)
const IFF_TUN: libc::c_short = libc::IFF_TUN as libc::c_short;
/// IFF_TAP flag - TAP device (layer 2)
const IFF_TAP: libc::c_short = libc::IFF_TAP as libc::c_short;
/// IFF_NO_PI flag - no packet information prefix
const IFF_NO_PI: libc::c_short = libc::IFF_NO_PI as libc::c_short;

/// _IOW('T', 202, int)
const TUNSETIFF: libc::c_ulong = 0x4004_54ca;

// The kernel writes the assigned name back into the request.
nix::ioctl_readwrite_bad!(tun_set_iff, TUNSETIFF, libc::ifreq);

/// Opens `/dev/net/tun` and configures it with TUNSETIFF.
#[derive(Debug, Clone)]
pub struct LinuxBackend {
    path: PathBuf,
}

impl Default for LinuxBackend {
    fn default() -> Self {
        Self {
            path: PathBuf::from(TUN_DEV_PATH),
        }
    }
}

impl LinuxBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another control node. Mostly useful to exercise failure paths.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub(crate) fn flags(mode: Mode) -> libc::c_short {
    IFF_NO_PI
        | match mode {
            Mode::Tun => IFF_TUN,
            Mode::Tap => IFF_TAP,
        }
}

/// Longest prefix of `ifname` that fits in `IFNAMSIZ - 1` bytes without
/// splitting a character.
pub(crate) fn truncate_name(ifname: &str) -> &str {
    let mut end = ifname.len().min(libc::IFNAMSIZ - 1);
    while !ifname.is_char_boundary(end) {
        end -= 1;
    }
    &ifname[..end]
}

/// Build the TUNSETIFF request. The name is cut to at most `IFNAMSIZ - 1`
/// bytes so the terminating NUL always fits.
pub(crate) fn request(ifname: &str, mode: Mode) -> libc::ifreq {
    // SAFETY: ifreq is plain old data; all-zero is a valid value.
    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };

    for (dst, &src) in ifr
        .ifr_name
        .iter_mut()
        .zip(truncate_name(ifname).as_bytes())
    {
        *dst = src as libc::c_char;
    }
    ifr.ifr_ifru.ifru_flags = flags(mode);

    ifr
}

pub(crate) fn name_of(ifr: &libc::ifreq) -> String {
    let bytes: Vec<u8> = ifr
        .ifr_name
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

impl Backend for LinuxBackend {
    fn create(&self, ifname: &str, mode: Mode) -> Result<Opened> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|source| TunError::DeviceUnavailable {
                path: self.path.clone(),
                source,
            })?;

        let mut ifr = request(ifname, mode);
        let requested = name_of(&ifr);

        // SAFETY: `file` is open for the whole call and `ifr` is a valid,
        // exclusively borrowed ifreq.
        if let Err(errno) = unsafe { tun_set_iff(file.as_raw_fd(), &mut ifr) } {
            // `file` is dropped here, closing the descriptor.
            return Err(TunError::ConfigurationFailed {
                path: self.path.clone(),
                ifname: requested,
                flags: flags(mode) as i32,
                source: io::Error::from(errno),
            });
        }

        Ok(Opened {
            device: Box::new(FdDevice::new(file)),
            ifname: name_of(&ifr),
        })
    }

    fn name(&self) -> &'static str {
        "linux"
    }
}
