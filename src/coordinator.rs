//! Duplex transfers over one shared device handle.
//!
//! The transmit side runs on the caller's thread as a strictly ordered,
//! paced sequence of blocking sends. The receive side runs on its own thread
//! and dumps every inbound transfer until the device fails, a receive limit
//! is reached or it is asked to stop.
//!
//! Nothing ties a send to the receive that observes its output. The two only
//! correlate through the latency of the pipeline in the fabric.

use std::io;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::device::{ChannelId, DmaDevice};
use crate::transfer::{StagingBuffer, TransferDescriptor, STAGING_CAPACITY};
use crate::Error;
use crate::Result;

/// Sizes of the sends issued by the transmit side, and the pauses between
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPlan {
    pub sizes: Vec<usize>,
    /// `pauses[i]` is slept before send `i + 1`. The last entry repeats for
    /// any later sends.
    pub pauses: Vec<Duration>,
}

impl Default for SendPlan {
    fn default() -> Self {
        SendPlan {
            sizes: vec![1000, 2000, 1800],
            pauses: vec![Duration::from_secs(10), Duration::from_secs(5)],
        }
    }
}

impl SendPlan {
    pub fn largest(&self) -> usize {
        self.sizes.iter().copied().max().unwrap_or(0)
    }

    /// Pause before send number `index`. The first send goes out at once.
    pub fn pause_before(&self, index: usize) -> Duration {
        match index.checked_sub(1) {
            None => Duration::ZERO,
            Some(gap) => self
                .pauses
                .get(gap)
                .or_else(|| self.pauses.last())
                .copied()
                .unwrap_or(Duration::ZERO),
        }
    }
}

/// Print the byte count of one transfer followed by its bytes in hex,
/// sixteen per line.
pub fn write_hex_dump<W: Write + ?Sized>(out: &mut W, data: &[u8]) -> io::Result<()> {
    writeln!(out, "received {} bytes", data.len())?;
    for line in data.chunks(16) {
        let mut sep = "";
        for b in line {
            write!(out, "{}{:02x}", sep, b)?;
            sep = " ";
        }
        writeln!(out)?;
    }
    out.flush()
}

pub struct DuplexCoordinator {
    device: Arc<dyn DmaDevice>,
    descriptor: TransferDescriptor,
    tx_channel: ChannelId,
    rx_channel: ChannelId,
    send_buffer: StagingBuffer,
    recv_buffer: Option<StagingBuffer>,
}

impl DuplexCoordinator {
    /// `descriptor` must carry resolved channels.
    pub fn new(device: Arc<dyn DmaDevice>, descriptor: TransferDescriptor) -> Result<Self> {
        let (tx_channel, rx_channel) = descriptor.channels().ok_or(Error::Unresolved)?;
        Ok(DuplexCoordinator {
            device,
            descriptor,
            tx_channel,
            rx_channel,
            send_buffer: StagingBuffer::with_pattern(STAGING_CAPACITY),
            recv_buffer: Some(StagingBuffer::zeroed(STAGING_CAPACITY)),
        })
    }

    pub fn descriptor(&self) -> &TransferDescriptor {
        &self.descriptor
    }

    /// Push the first `len` bytes of the send buffer and wait for the device
    /// to finish.
    pub fn send(&mut self, len: usize) -> Result<()> {
        if len > self.send_buffer.capacity() {
            return Err(Error::TooLarge {
                len,
                capacity: self.send_buffer.capacity(),
            });
        }
        self.descriptor.transfer_len = len;
        info!("sending {} bytes on channel {}", len, self.tx_channel);
        self.device.send(self.tx_channel, &self.send_buffer[..len])
    }

    /// Run every send of `plan` in order. The first failure aborts the rest.
    pub fn transmit(&mut self, plan: &SendPlan) -> Result<()> {
        for (i, &len) in plan.sizes.iter().enumerate() {
            let pause = plan.pause_before(i);
            if !pause.is_zero() {
                debug!("pacing {:?} before send {}", pause, i + 1);
                thread::sleep(pause);
            }
            self.send(len)?;
        }
        Ok(())
    }

    /// Start the receive loop on its own thread, writing dumps to `out`.
    ///
    /// With `limit` the loop ends after that many transfers, otherwise it
    /// runs until the device fails or [`ReceiveTask::stop`] is observed.
    pub fn spawn_receiver<W>(&mut self, out: W, limit: Option<usize>) -> Result<ReceiveTask>
    where
        W: Write + Send + 'static,
    {
        let buffer = self.recv_buffer.take().ok_or(Error::ReceiverStarted)?;
        let stop = Arc::new(AtomicBool::new(false));
        let receiver = Receiver {
            device: self.device.clone(),
            channel: self.rx_channel,
            buffer,
            stop: stop.clone(),
            limit,
        };
        let handle = thread::Builder::new()
            .name("axidma-rx".to_string())
            .spawn(move || receiver.run(out))?;
        Ok(ReceiveTask { handle, stop })
    }
}

struct Receiver {
    device: Arc<dyn DmaDevice>,
    channel: ChannelId,
    buffer: StagingBuffer,
    stop: Arc<AtomicBool>,
    limit: Option<usize>,
}

impl Receiver {
    fn run<W: Write>(mut self, mut out: W) -> Result<usize> {
        info!("receiving on channel {}", self.channel);
        let mut transfers = 0;
        while !self.stop.load(Ordering::Acquire) {
            if self.limit.map_or(false, |limit| transfers >= limit) {
                break;
            }
            let len = match self.device.recv(self.channel, self.buffer.as_mut_slice()) {
                Ok(len) => len,
                Err(e) => {
                    error!("receive on channel {} failed: {}", self.channel, e);
                    return Err(e);
                }
            };
            transfers += 1;
            debug!("transfer {} on channel {}: {} bytes", transfers, self.channel, len);
            write_hex_dump(&mut out, &self.buffer[..len])?;
        }
        info!("receive loop finished after {} transfers", transfers);
        Ok(transfers)
    }
}

/// Handle to a running receive loop.
#[derive(Debug)]
pub struct ReceiveTask {
    handle: JoinHandle<Result<usize>>,
    stop: Arc<AtomicBool>,
}

impl ReceiveTask {
    /// Ask the loop to finish. Takes effect once the receive in progress
    /// returns.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Wait for the loop to end and return the number of transfers it
    /// dumped.
    pub fn join(self) -> Result<usize> {
        self.handle.join().map_err(|_| Error::ReceiverPanicked)?
    }
}
