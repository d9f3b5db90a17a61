use crate::error::{Result, TunError};
use crate::pkbuf::PacketBufferPool;
use crate::tun::{Mode, MAX_PKT_LEN, TUN_MAX_HEADROOM};

/// Number of receive buffers a default pool holds.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Parameters for creating a device and its receive pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunConfig {
    /// Requested interface name; empty lets the kernel choose.
    pub ifname: String,
    pub mode: Mode,
    /// Bytes kept free in front of every received packet.
    pub headroom: usize,
    /// Size of each receive buffer, headroom included.
    pub max_pkt_len: usize,
    pub pool_size: usize,
}

impl Default for TunConfig {
    fn default() -> Self {
        Self {
            ifname: String::new(),
            mode: Mode::Tun,
            headroom: TUN_MAX_HEADROOM,
            max_pkt_len: MAX_PKT_LEN,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl TunConfig {
    pub fn new(ifname: &str, mode: Mode) -> Self {
        Self {
            ifname: ifname.to_string(),
            mode,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.headroom >= self.max_pkt_len {
            return Err(TunError::InvalidConfig(format!(
                "headroom ({}) must be smaller than max_pkt_len ({})",
                self.headroom, self.max_pkt_len
            )));
        }
        if self.pool_size == 0 {
            return Err(TunError::InvalidConfig("pool_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Receive pool sized for this configuration.
    pub fn pool(&self) -> Result<PacketBufferPool> {
        self.validate()?;
        let name = if self.ifname.is_empty() {
            "tun-rx".to_string()
        } else {
            format!("{}-rx", self.ifname)
        };
        Ok(PacketBufferPool::new(&name, self.max_pkt_len, self.pool_size))
    }
}
