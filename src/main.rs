use etherparse::{Icmpv4Type, NetSlice, PacketBuilder, SlicedPacket, TransportSlice};
use std::sync::Arc;
use structopt::StructOpt;
use tunpipe::{
    detect, AddressConfigurator, IpSubnet, LogLogger, Mode, NoopConfigurator, PacketBuffer,
    TunConfig, TunDevice, TUN_MAX_HEADROOM,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "tunpipe", about = "Open a TUN/TAP interface and pump frames through it.")]
struct CliOptions {
    /// Interface name. Empty lets the kernel choose; `%d` is expanded by the kernel.
    #[structopt(long, short, default_value = "tunpipe%d")]
    name: String,

    /// Create a TAP (Ethernet) interface instead of TUN (IP).
    #[structopt(long)]
    tap: bool,

    /// Bytes reserved in front of each received packet.
    #[structopt(long, default_value = "16")]
    headroom: usize,

    /// Receive buffer size, headroom included.
    #[structopt(long, default_value = "65535")]
    max_pkt_len: usize,

    /// Number of receive buffers.
    #[structopt(long, default_value = "64")]
    pool_size: usize,

    /// Gateway address handed to the address configurator, e.g. 10.45.0.1/16.
    #[structopt(long)]
    gateway: Option<IpSubnet>,

    /// Session subnet handed to the address configurator, e.g. 10.45.0.0/16.
    #[structopt(long)]
    subnet: Option<IpSubnet>,

    /// Answer ICMPv4 echo requests (TUN mode only).
    #[structopt(long)]
    echo: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts = CliOptions::from_args();

    let config = TunConfig {
        ifname: opts.name.clone(),
        mode: Mode::from_tap(opts.tap),
        headroom: opts.headroom,
        max_pkt_len: opts.max_pkt_len,
        pool_size: opts.pool_size,
    };

    let pool = match config.pool() {
        Ok(pool) => pool,
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(2);
        }
    };
    let dev = match TunDevice::open_with(detect().as_ref(), &config, Arc::new(LogLogger)) {
        Ok(dev) => dev,
        Err(err) => {
            log::error!("cannot start: {}", err);
            std::process::exit(1);
        }
    };

    if let (Some(gw), Some(sub)) = (&opts.gateway, &opts.subnet) {
        if let Err(err) = NoopConfigurator.configure(dev.name(), gw, sub) {
            log::error!("address configuration failed: {}", err);
            std::process::exit(1);
        }
    }

    log::info!("Listening on {} ({}) …", dev.name(), dev.mode());

    let mut frames: u64 = 0;
    loop {
        let buf = match dev.recv(&pool) {
            Ok(buf) => buf,
            Err(err) if err.is_transient() => continue, // logged by the device
            Err(err) if err.is_eof() => {
                log::warn!("{} closed after {} frames", dev.name(), frames);
                break;
            }
            Err(err) => {
                log::error!("stopping on {} after {} frames: {}", dev.name(), frames, err);
                break;
            }
        };
        frames += 1;
        log::debug!("#{} {}", frames, summarize(buf.data(), dev.mode()));

        if opts.echo && dev.mode() == Mode::Tun {
            if let Some(reply) = echo_reply(buf.data()) {
                let reply = PacketBuffer::from_payload(TUN_MAX_HEADROOM, &reply);
                if dev.send(&reply).is_ok() {
                    log::debug!("#{} echo reply sent ({} bytes)", frames, reply.len());
                }
            }
        }
    }

    dev.close();
}

/// One line describing a frame, for logging only.
fn summarize(frame: &[u8], mode: Mode) -> String {
    let sliced = match mode {
        Mode::Tun => SlicedPacket::from_ip(frame).map_err(|e| e.to_string()),
        Mode::Tap => SlicedPacket::from_ethernet(frame).map_err(|e| e.to_string()),
    };
    let packet = match sliced {
        Ok(packet) => packet,
        Err(err) => return format!("{} bytes, unparsed ({})", frame.len(), err),
    };

    match packet.net {
        Some(NetSlice::Ipv4(ip)) => format!(
            "{} bytes, {} → {} proto {:?}",
            frame.len(),
            ip.header().source_addr(),
            ip.header().destination_addr(),
            ip.header().protocol()
        ),
        Some(NetSlice::Ipv6(ip)) => format!(
            "{} bytes, {} → {}",
            frame.len(),
            ip.header().source_addr(),
            ip.header().destination_addr()
        ),
        _ => format!("{} bytes, non-IP frame", frame.len()),
    }
}

/// Build the ICMPv4 echo reply for an echo request, if `packet` is one.
fn echo_reply(packet: &[u8]) -> Option<Vec<u8>> {
    let sliced = SlicedPacket::from_ip(packet).ok()?;
    let Some(NetSlice::Ipv4(ip)) = sliced.net else {
        return None;
    };
    let Some(TransportSlice::Icmpv4(icmp)) = sliced.transport else {
        return None;
    };
    let Icmpv4Type::EchoRequest(echo) = icmp.icmp_type() else {
        return None;
    };

    let header = ip.header();
    let builder = PacketBuilder::ipv4(header.destination(), header.source(), 64)
        .icmpv4_echo_reply(echo.id, echo.seq);
    let payload = icmp.payload();

    let mut reply = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut reply, payload).ok()?;
    Some(reply)
}
