use crate::backend::{self, Backend, Opened};
use crate::config::TunConfig;
use crate::error::{Result, TunError};
use crate::logger::{LogLogger, Logger};
use crate::pkbuf::{PacketBuffer, PacketBufferPool};
use crate::Device;
use log::Level;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Headroom reserved in front of every received packet.
///
/// Sized for the 5GC GTP-U header (16 bytes) so the user plane can
/// encapsulate a received packet without copying it.
pub const TUN_MAX_HEADROOM: usize = 16;

/// Largest packet the device is asked to read.
pub const MAX_PKT_LEN: usize = 65535;

/// Which layer the virtual interface exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Network layer (IP packets).
    #[default]
    Tun,
    /// Link layer (Ethernet frames).
    Tap,
}

impl Mode {
    pub fn from_tap(is_tap: bool) -> Self {
        if is_tap {
            Mode::Tap
        } else {
            Mode::Tun
        }
    }

    pub fn is_tap(self) -> bool {
        self == Mode::Tap
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Tun => write!(f, "TUN"),
            Mode::Tap => write!(f, "TAP"),
        }
    }
}

/// An open, configured virtual interface.
///
/// Owns its descriptor: dropping the device (or calling [`TunDevice::close`])
/// closes it. `recv` and `send` take `&self`, so one reader thread and one
/// writer thread can share the device through an `Arc`.
pub struct TunDevice {
    device: Box<dyn Device>,
    ifname: String,
    mode: Mode,
    headroom: usize,
    logger: Arc<dyn Logger>,
}

impl TunDevice {
    /// Create a device on this host's backend, logging through `log`.
    ///
    /// An empty `ifname` lets the kernel pick one. Names longer than the
    /// platform limit are truncated.
    pub fn open(ifname: &str, mode: Mode) -> Result<Self> {
        let config = TunConfig::new(ifname, mode);
        Self::open_with(backend::detect().as_ref(), &config, Arc::new(LogLogger))
    }

    pub fn open_with(
        backend: &dyn Backend,
        config: &TunConfig,
        logger: Arc<dyn Logger>,
    ) -> Result<Self> {
        config.validate()?;

        match backend.create(&config.ifname, config.mode) {
            Ok(Opened { device, ifname }) => {
                logger.log(
                    Level::Info,
                    None,
                    &format!("{} device `{}` opened ({})", config.mode, ifname, backend.name()),
                );
                Ok(Self {
                    device,
                    ifname,
                    mode: config.mode,
                    headroom: config.headroom,
                    logger,
                })
            }
            Err(err) => {
                logger.log(
                    Level::Error,
                    err.os_error(),
                    &format!("{}() failed for `{}`: {}", err.operation(), config.ifname, err),
                );
                Err(err)
            }
        }
    }

    /// Wrap an already configured device.
    pub fn from_device(device: Box<dyn Device>, ifname: &str, mode: Mode) -> Self {
        Self {
            device,
            ifname: ifname.to_string(),
            mode,
            headroom: TUN_MAX_HEADROOM,
            logger: Arc::new(LogLogger),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_headroom(mut self, headroom: usize) -> Self {
        self.headroom = headroom;
        self
    }

    /// Block until one frame arrives and return it in a buffer from `pool`.
    ///
    /// The buffer keeps `headroom()` bytes free in front of the frame. On
    /// failure the buffer has already gone back to the pool.
    pub fn recv(&self, pool: &PacketBufferPool) -> Result<PacketBuffer> {
        if self.headroom >= pool.buffer_size() {
            return Err(TunError::InvalidConfig(format!(
                "headroom {} leaves no room in {}-byte buffers of pool `{}`",
                self.headroom,
                pool.buffer_size(),
                pool.name()
            )));
        }

        let mut buf = pool.alloc().ok_or_else(|| TunError::PoolExhausted {
            pool: pool.name().to_string(),
        })?;
        buf.reserve(self.headroom)?;
        let window = buf.tailroom();

        let result = match self.device.recv(buf.put(window)?) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "device returned no data",
            )),
            Ok(n) => Ok(n),
            Err(err) => Err(err),
        };

        match result {
            Ok(n) => {
                buf.trim(n)?;
                Ok(buf)
            }
            Err(source) => {
                drop(buf);
                self.logger.log(
                    Level::Warn,
                    source.raw_os_error(),
                    &format!("read() failed on `{}`: {}", self.ifname, source),
                );
                Err(TunError::ReadFailed {
                    ifname: self.ifname.clone(),
                    source,
                })
            }
        }
    }

    /// Write the payload of `buf` as one frame. The buffer is left untouched.
    pub fn send(&self, buf: &PacketBuffer) -> Result<()> {
        let result = match self.device.send(buf.data()) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "device accepted no data",
            )),
            Ok(n) => {
                if n < buf.len() {
                    self.logger.log(
                        Level::Debug,
                        None,
                        &format!("short write on `{}`: {} of {} bytes", self.ifname, n, buf.len()),
                    );
                }
                Ok(())
            }
            Err(err) => Err(err),
        };

        result.map_err(|source| {
            self.logger.log(
                Level::Error,
                source.raw_os_error(),
                &format!("write() failed on `{}`: {}", self.ifname, source),
            );
            TunError::WriteFailed {
                ifname: self.ifname.clone(),
                source,
            }
        })
    }

    /// Interface name as assigned by the kernel.
    pub fn name(&self) -> &str {
        &self.ifname
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn headroom(&self) -> usize {
        self.headroom
    }

    /// Descriptor for external polling or timeouts. The device keeps
    /// ownership.
    #[cfg(unix)]
    pub fn as_raw_fd(&self) -> Option<std::os::fd::RawFd> {
        self.device.raw_fd()
    }

    pub fn close(self) {
        self.logger.log(
            Level::Debug,
            None,
            &format!("closing {} device `{}`", self.mode, self.ifname),
        );
    }
}

impl fmt::Debug for TunDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunDevice")
            .field("ifname", &self.ifname)
            .field("mode", &self.mode)
            .field("headroom", &self.headroom)
            .finish()
    }
}
