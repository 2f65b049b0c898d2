//! End-to-end duplex sessions over the loopback device.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axidma_transfer::{
    resolve_channels, ChannelId, ChannelSet, DmaDevice, DuplexCoordinator, Error, LoopbackDevice,
    Result, SendPlan, TransferDescriptor, PATTERN_LEN, STAGING_CAPACITY,
};

#[derive(Clone, Default)]
struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Split dump output into per-transfer (count, hex lines).
fn transfers(text: &str) -> Vec<(usize, Vec<Vec<String>>)> {
    let mut out: Vec<(usize, Vec<Vec<String>>)> = Vec::new();
    for line in text.lines() {
        if let Some(count) = line
            .strip_prefix("received ")
            .and_then(|l| l.strip_suffix(" bytes"))
        {
            out.push((count.parse().unwrap(), Vec::new()));
        } else {
            let tokens = line.split(' ').map(str::to_string).collect();
            out.last_mut().unwrap().1.push(tokens);
        }
    }
    out
}

fn session(dev: &Arc<LoopbackDevice>) -> DuplexCoordinator {
    let mut descriptor = TransferDescriptor::default();
    resolve_channels(&**dev, &mut descriptor, false).unwrap();
    DuplexCoordinator::new(dev.clone(), descriptor).unwrap()
}

fn quick_plan(sizes: &[usize]) -> SendPlan {
    SendPlan {
        sizes: sizes.to_vec(),
        pauses: vec![],
    }
}

#[test]
fn echo_round_trip() {
    let dev = Arc::new(LoopbackDevice::default());
    let mut coordinator = session(&dev);
    coordinator.transmit(&quick_plan(&[1000, 2000, 1800])).unwrap();

    let out = SharedOutput::default();
    let task = coordinator.spawn_receiver(out.clone(), Some(3)).unwrap();
    assert_eq!(task.join().unwrap(), 3);

    let dumps = transfers(&out.text());
    assert_eq!(dumps.len(), 3);
    for ((count, lines), expected) in dumps.iter().zip([1000usize, 2000, 1800]) {
        assert_eq!(*count, expected);
        let tokens: Vec<&String> = lines.iter().flatten().collect();
        assert_eq!(tokens.len(), expected);
        assert!(lines.iter().all(|l| l.len() <= 16));
        assert!(lines[..lines.len() - 1].iter().all(|l| l.len() == 16));
        for (i, t) in tokens.iter().enumerate() {
            assert_eq!(t.len(), 2);
            let expected = if i < PATTERN_LEN { i % 256 } else { 0 };
            assert_eq!(usize::from_str_radix(t, 16).unwrap(), expected);
        }
    }
}

#[test]
fn dump_reflects_echoed_length() {
    for _ in 0..8 {
        let n = fastrand::usize(1..=STAGING_CAPACITY);
        let frame: Vec<u8> = (0..n).map(|_| fastrand::u8(..)).collect();

        let dev = Arc::new(LoopbackDevice::default());
        dev.inject(&frame).unwrap();
        let mut coordinator = session(&dev);
        let out = SharedOutput::default();
        coordinator
            .spawn_receiver(out.clone(), Some(1))
            .unwrap()
            .join()
            .unwrap();

        let dumps = transfers(&out.text());
        assert_eq!(dumps.len(), 1);
        assert_eq!(dumps[0].0, n);
        let bytes: Vec<u8> = dumps[0]
            .1
            .iter()
            .flatten()
            .map(|t| u8::from_str_radix(t, 16).unwrap())
            .collect();
        assert_eq!(bytes, frame);
        assert_eq!(dumps[0].1.len(), (n + 15) / 16);
    }
}

#[test]
fn receive_runs_concurrently_with_sends() {
    let dev = Arc::new(LoopbackDevice::default());
    let mut coordinator = session(&dev);
    let out = SharedOutput::default();
    let task = coordinator.spawn_receiver(out.clone(), Some(2)).unwrap();

    let plan = SendPlan {
        sizes: vec![16, 32],
        pauses: vec![Duration::from_millis(10)],
    };
    coordinator.transmit(&plan).unwrap();
    assert_eq!(task.join().unwrap(), 2);

    let counts: Vec<usize> = transfers(&out.text()).iter().map(|t| t.0).collect();
    assert_eq!(counts, vec![16, 32]);
}

#[test]
fn receive_failure_ends_loop() {
    let dev = Arc::new(LoopbackDevice::default());
    let mut coordinator = session(&dev);
    coordinator.transmit(&quick_plan(&[64])).unwrap();
    let out = SharedOutput::default();
    let task = coordinator.spawn_receiver(out.clone(), None).unwrap();
    dev.close();
    assert!(matches!(task.join(), Err(Error::Closed)));
    assert_eq!(transfers(&out.text()).len(), 1);
}

#[test]
fn stop_flag_ends_loop_after_current_receive() {
    let dev = Arc::new(LoopbackDevice::default());
    let mut coordinator = session(&dev);
    let task = coordinator.spawn_receiver(io::sink(), None).unwrap();
    task.stop();
    // unblock the receive that may already be waiting
    dev.inject(&[0xaa]).unwrap();
    let transfers = task.join().unwrap();
    assert!(transfers <= 1);
}

#[derive(Debug)]
struct FailingSend {
    inner: LoopbackDevice,
    fail_at: usize,
    sends: Mutex<usize>,
}

impl DmaDevice for FailingSend {
    fn tx_channels(&self) -> ChannelSet {
        self.inner.tx_channels()
    }

    fn rx_channels(&self) -> ChannelSet {
        self.inner.rx_channels()
    }

    fn send(&self, channel: ChannelId, data: &[u8]) -> Result<()> {
        let mut sends = self.sends.lock().unwrap();
        *sends += 1;
        if *sends == self.fail_at {
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "bus error")));
        }
        self.inner.send(channel, data)
    }

    fn recv(&self, channel: ChannelId, buf: &mut [u8]) -> Result<usize> {
        self.inner.recv(channel, buf)
    }
}

#[test]
fn send_failure_aborts_sequence() {
    let dev = Arc::new(FailingSend {
        inner: LoopbackDevice::default(),
        fail_at: 2,
        sends: Mutex::new(0),
    });
    let mut descriptor = TransferDescriptor::default();
    resolve_channels(&*dev, &mut descriptor, false).unwrap();
    let mut coordinator = DuplexCoordinator::new(dev.clone(), descriptor).unwrap();

    assert!(coordinator.transmit(&quick_plan(&[100, 200, 300])).is_err());
    assert_eq!(*dev.sends.lock().unwrap(), 2);
    assert_eq!(dev.inner.pending(), 1);
    assert_eq!(coordinator.descriptor().transfer_len, 200);
}

#[test]
fn explicit_channels_reach_the_device() {
    let dev = Arc::new(LoopbackDevice::new(
        [2u32, 3].into_iter().collect(),
        [1u32, 4].into_iter().collect(),
    ));
    let mut descriptor = TransferDescriptor {
        tx_channel: Some(ChannelId(3)),
        rx_channel: Some(ChannelId(4)),
        ..TransferDescriptor::default()
    };
    resolve_channels(&*dev, &mut descriptor, false).unwrap();
    let mut coordinator = DuplexCoordinator::new(dev.clone(), descriptor).unwrap();
    coordinator.send(8).unwrap();
    let task = coordinator.spawn_receiver(io::sink(), Some(1)).unwrap();
    assert_eq!(task.join().unwrap(), 1);
}

#[test]
fn unlisted_override_fails_at_the_device() {
    let dev = Arc::new(LoopbackDevice::default());
    let descriptor = TransferDescriptor {
        tx_channel: Some(ChannelId(7)),
        rx_channel: Some(ChannelId(1)),
        ..TransferDescriptor::default()
    };
    let mut coordinator = DuplexCoordinator::new(dev, descriptor).unwrap();
    assert!(matches!(
        coordinator.send(8),
        Err(Error::UnknownChannel { channel: ChannelId(7), .. })
    ));
}
