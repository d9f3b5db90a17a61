//! Interface address assignment.
//!
//! Address and route setup belongs to whoever owns the device; the data path
//! never depends on it having run.

use crate::error::{Result, TunError};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An address with its prefix length, e.g. `10.45.0.1/16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpSubnet {
    addr: IpAddr,
    prefix: u8,
}

impl IpSubnet {
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(TunError::InvalidConfig(format!(
                "prefix length {} out of range for {}",
                prefix, addr
            )));
        }
        Ok(Self { addr, prefix })
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    pub fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }

    pub fn netmask(&self) -> IpAddr {
        match self.addr {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from(self.v4_mask())),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(self.v6_mask())),
        }
    }

    /// The address with host bits cleared.
    pub fn network(&self) -> IpAddr {
        match self.addr {
            IpAddr::V4(a) => IpAddr::V4(Ipv4Addr::from(u32::from(a) & self.v4_mask())),
            IpAddr::V6(a) => IpAddr::V6(Ipv6Addr::from(u128::from(a) & self.v6_mask())),
        }
    }

    fn v4_mask(&self) -> u32 {
        u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0)
    }

    fn v6_mask(&self) -> u128 {
        u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0)
    }
}

impl FromStr for IpSubnet {
    type Err = TunError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TunError::InvalidConfig(format!("invalid subnet `{}`", s));
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
                (addr, prefix.parse::<u8>().map_err(|_| invalid())?)
            }
            None => {
                let addr: IpAddr = s.parse().map_err(|_| invalid())?;
                (addr, if addr.is_ipv4() { 32 } else { 128 })
            }
        };
        IpSubnet::new(addr, prefix)
    }
}

impl fmt::Display for IpSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Assigns the gateway address and routes the session subnet to an interface.
///
/// Implementations must be idempotent.
pub trait AddressConfigurator: Send + Sync {
    fn configure(&self, ifname: &str, gw: &IpSubnet, sub: &IpSubnet) -> Result<()>;
}

/// Leaves the interface as it is and reports success. Address setup is
/// expected to happen outside the process (e.g. `ip addr add`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConfigurator;

impl AddressConfigurator for NoopConfigurator {
    fn configure(&self, ifname: &str, gw: &IpSubnet, sub: &IpSubnet) -> Result<()> {
        log::debug!(
            "address configuration for `{}` left to the host (gw {}, subnet {})",
            ifname,
            gw,
            sub
        );
        Ok(())
    }
}
