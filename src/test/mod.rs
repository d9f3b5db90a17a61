
use crate::backend::{Backend, Opened, UnsupportedBackend};
use crate::device::mock::{MockDevice, Rx};
use crate::logger::capture::CaptureLogger;
use crate::pkbuf::{PacketBuffer, PacketBufferPool};
use crate::{Mode, TunConfig, TunDevice, TunError, TUN_MAX_HEADROOM};
use log::Level;
use packets::{echo_request_ids, udp_payload, PacketFactory};
use rand::Rng;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const BUFFER_SIZE: usize = 2048;

fn setup() -> (MockDevice, TunDevice, PacketBufferPool, CaptureLogger) {
    let mock = MockDevice::new();
    let logger = CaptureLogger::new();
    let dev = TunDevice::from_device(Box::new(mock.clone()), "ogstun", Mode::Tun)
        .with_logger(Arc::new(logger.clone()));
    let pool = PacketBufferPool::new("test-rx", BUFFER_SIZE, 4);
    (mock, dev, pool, logger)
}

/// Hands out clones of one mock device and counts how often it was asked.
struct MockBackend {
    device: MockDevice,
    calls: AtomicUsize,
}

impl MockBackend {
    fn new(device: MockDevice) -> Self {
        Self {
            device,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Backend for MockBackend {
    fn create(&self, ifname: &str, _mode: Mode) -> crate::Result<Opened> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ifname = if ifname.is_empty() { "tun0" } else { ifname };
        Ok(Opened {
            device: Box::new(self.device.clone()),
            ifname: ifname.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[test]
fn test_recv_one_packet_with_headroom() {
    let (mock, dev, pool, _) = setup();
    let packet = PacketFactory::udp("10.45.0.2", "8.8.8.8", 5000, 53, b"query");
    mock.inject_packet(packet.clone());

    let buf = dev.recv(&pool).unwrap();

    assert_eq!(buf.data(), &packet[..]);
    assert_eq!(buf.len(), packet.len());
    assert_eq!(buf.headroom(), TUN_MAX_HEADROOM);
    assert_eq!(buf.capacity(), BUFFER_SIZE);
    assert!(buf.headroom() + buf.len() <= buf.capacity());
    assert_eq!(udp_payload(buf.data()), b"query");
    assert_eq!(pool.outstanding(), 1);

    drop(buf);
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_recv_eof_is_read_failed() {
    let (mock, dev, pool, logger) = setup();
    mock.inject(Rx::Eof);

    let err = dev.recv(&pool).unwrap_err();

    assert!(matches!(err, TunError::ReadFailed { ref ifname, .. } if ifname == "ogstun"));
    assert!(err.is_eof());
    assert_eq!(pool.outstanding(), 0, "failed read must release its buffer");
    let record = logger.last().unwrap();
    assert_eq!(record.level, Level::Warn);
    assert!(record.message.contains("ogstun"));
}

#[test]
fn test_recv_os_error_is_read_failed() {
    let (mock, dev, pool, logger) = setup();
    mock.inject(Rx::Error(libc::EIO));

    let err = dev.recv(&pool).unwrap_err();

    assert!(matches!(err, TunError::ReadFailed { .. }));
    assert_eq!(err.os_error(), Some(libc::EIO));
    assert!(!err.is_eof());
    assert_eq!(pool.outstanding(), 0);
    assert_eq!(logger.last().unwrap().errno, Some(libc::EIO));
}

#[test]
fn test_device_survives_failed_read() {
    let (mock, dev, pool, _) = setup();
    mock.inject(Rx::Error(libc::EINTR));
    mock.inject_packet(vec![0x45; 40]);

    assert!(dev.recv(&pool).unwrap_err().is_transient());
    let buf = dev.recv(&pool).unwrap();
    assert_eq!(buf.len(), 40);
}

#[test]
fn test_vanished_device_is_not_retried() {
    let (mock, dev, pool, logger) = setup();
    for errno in [libc::EBADFD, libc::ENODEV] {
        mock.inject(Rx::Error(errno));

        let err = dev.recv(&pool).unwrap_err();

        assert!(!err.is_transient());
        assert!(!err.is_eof());
        assert_eq!(logger.last().unwrap().errno, Some(errno));
    }
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_echo_request_received_intact() {
    let (mock, dev, pool, _) = setup();
    let ping = PacketFactory::echo_request("10.45.0.2", "10.45.0.1", 0x1234, 7, b"ping");
    mock.inject_packet(ping.clone());

    let buf = dev.recv(&pool).unwrap();

    assert_eq!(buf.data(), &ping[..]);
    assert_eq!(echo_request_ids(buf.data()), Some((0x1234, 7)));
    assert_eq!(buf.headroom(), TUN_MAX_HEADROOM);
}

#[test]
fn test_recv_exhausted_pool_does_no_io() {
    let (mock, dev, _, _) = setup();
    let pool = PacketBufferPool::new("tiny", BUFFER_SIZE, 1);
    let held = pool.alloc().unwrap();
    mock.inject_packet(vec![0x45; 20]);

    let err = dev.recv(&pool).unwrap_err();

    assert!(matches!(err, TunError::PoolExhausted { ref pool } if pool == "tiny"));
    assert_eq!(mock.pending(), 1, "no read may happen without a buffer");
    drop(held);
}

#[test]
fn test_recv_headroom_larger_than_buffer() {
    let (mock, dev, _, _) = setup();
    let pool = PacketBufferPool::new("small", TUN_MAX_HEADROOM, 1);
    mock.inject_packet(vec![0x45; 20]);

    assert!(matches!(dev.recv(&pool), Err(TunError::InvalidConfig(_))));
    assert_eq!(mock.pending(), 1);
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_recv_headroom_is_usable_for_encapsulation() {
    let (mock, dev, pool, _) = setup();
    let packet = PacketFactory::udp("10.45.0.2", "10.45.0.1", 1234, 2152, b"data");
    mock.inject_packet(packet.clone());

    let mut buf = dev.recv(&pool).unwrap();
    let header = [0x34, 0xff, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0x85, 1, 0, 9, 0];
    buf.push(header.len()).unwrap().copy_from_slice(&header);

    assert_eq!(buf.headroom(), 0);
    assert_eq!(&buf.data()[..16], &header);
    assert_eq!(&buf.data()[16..], &packet[..]);
}

#[test]
fn test_send_writes_payload_only() {
    let (mock, dev, _, _) = setup();
    let packet = PacketFactory::udp("8.8.8.8", "10.45.0.2", 53, 5000, b"answer");
    let buf = PacketBuffer::from_payload(TUN_MAX_HEADROOM, &packet);

    dev.send(&buf).unwrap();

    assert_eq!(mock.last_sent_packet().unwrap(), packet);
    assert_eq!(buf.data(), &packet[..], "send must not touch the buffer");
    assert_eq!(buf.headroom(), TUN_MAX_HEADROOM);
}

#[test]
fn test_send_empty_payload_is_write_failed() {
    let (mock, dev, _, logger) = setup();
    let buf = PacketBuffer::new(64);

    match dev.send(&buf) {
        Err(TunError::WriteFailed { ifname, source }) => {
            assert_eq!(ifname, "ogstun");
            assert_eq!(source.kind(), io::ErrorKind::WriteZero);
        }
        other => panic!("expected WriteFailed, got {:?}", other),
    }
    assert!(mock.get_sent_packets().is_empty());
    assert_eq!(logger.last().unwrap().level, Level::Error);
}

#[test]
fn test_send_os_error_is_write_failed() {
    let (mock, dev, _, logger) = setup();
    mock.fail_sends(libc::EIO);
    let buf = PacketBuffer::from_payload(0, &[0x45; 28]);

    let err = dev.send(&buf).unwrap_err();

    assert!(matches!(err, TunError::WriteFailed { .. }));
    assert_eq!(err.os_error(), Some(libc::EIO));
    assert_eq!(logger.last().unwrap().errno, Some(libc::EIO));
}

/// Accepts at most `limit` bytes per write.
struct TruncatingDevice {
    limit: usize,
}

impl crate::Device for TruncatingDevice {
    fn recv(&self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::WouldBlock))
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len().min(self.limit))
    }
}

#[test]
fn test_short_write_is_logged_not_failed() {
    let logger = CaptureLogger::new();
    let dev = TunDevice::from_device(Box::new(TruncatingDevice { limit: 10 }), "ogstun", Mode::Tun)
        .with_logger(Arc::new(logger.clone()));
    let packet = PacketFactory::udp("10.45.0.2", "8.8.8.8", 5000, 53, b"query");
    let buf = PacketBuffer::from_payload(TUN_MAX_HEADROOM, &packet);

    assert!(dev.send(&buf).is_ok());
    let record = logger.last().unwrap();
    assert_eq!(record.level, Level::Debug);
    assert!(record.message.contains("short write"));
}

#[test]
fn test_sends_keep_order() {
    let (mock, dev, _, _) = setup();
    for i in 0..10u8 {
        dev.send(&PacketBuffer::from_payload(0, &[i; 20])).unwrap();
    }

    let sent = mock.get_sent_packets();
    assert_eq!(sent.len(), 10);
    for (i, packet) in sent.iter().enumerate() {
        assert_eq!(packet[0], i as u8);
    }
}

#[test]
fn test_loopback_round_trip() {
    let mock = MockDevice::loopback();
    let dev = TunDevice::from_device(Box::new(mock), "loop", Mode::Tun);
    let pool = PacketBufferPool::new("loop-rx", BUFFER_SIZE, 2);
    let max = BUFFER_SIZE - dev.headroom();
    let mut rng = rand::thread_rng();

    let mut lengths = vec![1, max];
    lengths.extend((0..50).map(|_| rng.gen_range(1..=max)));

    for len in lengths {
        let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        dev.send(&PacketBuffer::from_payload(0, &payload)).unwrap();

        let buf = dev.recv(&pool).unwrap();
        assert_eq!(buf.len(), len);
        assert_eq!(buf.data(), &payload[..]);
        assert_eq!(buf.headroom(), TUN_MAX_HEADROOM);
    }
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_reader_and_writer_threads() {
    let mock = MockDevice::loopback();
    let dev = Arc::new(TunDevice::from_device(Box::new(mock), "loop", Mode::Tun));
    let pool = PacketBufferPool::new("threads-rx", BUFFER_SIZE, 8);
    const FRAMES: usize = 200;

    let writer = {
        let dev = dev.clone();
        thread::spawn(move || {
            for i in 0..FRAMES {
                let payload = (i as u32).to_be_bytes();
                dev.send(&PacketBuffer::from_payload(0, &payload)).unwrap();
            }
        })
    };

    let mut received = Vec::with_capacity(FRAMES);
    while received.len() < FRAMES {
        match dev.recv(&pool) {
            Ok(buf) => received.push(u32::from_be_bytes(buf.data().try_into().unwrap())),
            // the mock reports an empty queue as WouldBlock
            Err(err) if err.is_transient() => thread::yield_now(),
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    writer.join().unwrap();

    let expected: Vec<u32> = (0..FRAMES as u32).collect();
    assert_eq!(received, expected);
}

#[test]
fn test_tap_frames_pass_unmodified() {
    let mock = MockDevice::new();
    let dev = TunDevice::from_device(Box::new(mock.clone()), "tap0", Mode::Tap);
    let pool = PacketBufferPool::new("tap-rx", BUFFER_SIZE, 1);
    let frame = PacketFactory::ethernet_udp("192.168.7.2", "192.168.7.1", b"hello");
    mock.inject_packet(frame.clone());

    let buf = dev.recv(&pool).unwrap();
    assert_eq!(dev.mode(), Mode::Tap);
    assert_eq!(buf.data(), &frame[..]);

    dev.send(&buf).unwrap();
    assert_eq!(mock.last_sent_packet().unwrap(), frame);
}

#[test]
fn test_open_with_backend() {
    let backend = MockBackend::new(MockDevice::new());
    let logger = CaptureLogger::new();

    let dev = TunDevice::open_with(
        &backend,
        &TunConfig::new("", Mode::Tun),
        Arc::new(logger.clone()),
    )
    .unwrap();

    assert_eq!(dev.name(), "tun0");
    assert_eq!(dev.headroom(), TUN_MAX_HEADROOM);
    #[cfg(unix)]
    assert_eq!(dev.as_raw_fd(), None);
    assert_eq!(logger.last().unwrap().level, Level::Info);
    dev.close();
}

#[test]
fn test_open_rejects_bad_config_before_backend() {
    let backend = MockBackend::new(MockDevice::new());
    let config = TunConfig {
        headroom: 4096,
        max_pkt_len: 1500,
        ..TunConfig::new("ogstun", Mode::Tun)
    };

    let err = TunDevice::open_with(&backend, &config, Arc::new(CaptureLogger::new())).unwrap_err();

    assert!(matches!(err, TunError::InvalidConfig(_)));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_open_unsupported() {
    let logger = CaptureLogger::new();
    for _ in 0..3 {
        let err = TunDevice::open_with(
            &UnsupportedBackend,
            &TunConfig::new("ogstun", Mode::Tun),
            Arc::new(logger.clone()),
        )
        .unwrap_err();
        assert!(matches!(err, TunError::Unsupported));
    }
    let records = logger.records();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.level == Level::Error && r.errno.is_none()));
}

#[cfg(target_os = "linux")]
#[test]
fn test_open_configuration_failure_is_logged() {
    let logger = CaptureLogger::new();
    let backend = crate::LinuxBackend::with_path("/dev/null");

    let err = TunDevice::open_with(
        &backend,
        &TunConfig::new("ogstun", Mode::Tun),
        Arc::new(logger.clone()),
    )
    .unwrap_err();

    assert!(matches!(err, TunError::ConfigurationFailed { .. }));
    assert_eq!(err.operation(), "ioctl");
    let record = logger.last().unwrap();
    assert_eq!(record.level, Level::Error);
    assert_eq!(record.errno, Some(libc::ENOTTY));
}

#[cfg(target_os = "linux")]
#[test]
#[ignore = "needs CAP_NET_ADMIN and /dev/net/tun"]
fn test_open_real_tun() {
    let dev = TunDevice::open("tunpipe%d", Mode::Tun).unwrap();
    assert!(dev.name().starts_with("tunpipe"));
    assert!(dev.as_raw_fd().unwrap() >= 0);
    dev.close();
}
