use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::device::{ChannelId, ChannelSet, Direction, DmaDevice};
use crate::Error;
use crate::Result;

#[derive(Debug, Default)]
struct Pipeline {
    frames: VecDeque<Vec<u8>>,
    closed: bool,
}

/// In-memory device that hands every sent frame back on the receive side.
///
/// Stands in for the fabric when no hardware is attached. Every frame pushed
/// out on any transmit channel is queued and returned, in order, by the next
/// receive on any receive channel.
#[derive(Debug)]
pub struct LoopbackDevice {
    tx_channels: ChannelSet,
    rx_channels: ChannelSet,
    pipeline: Mutex<Pipeline>,
    ready: Condvar,
}

impl Default for LoopbackDevice {
    fn default() -> Self {
        LoopbackDevice::new([0u32].into_iter().collect(), [1u32].into_iter().collect())
    }
}

impl LoopbackDevice {
    pub fn new(tx_channels: ChannelSet, rx_channels: ChannelSet) -> LoopbackDevice {
        LoopbackDevice {
            tx_channels,
            rx_channels,
            pipeline: Mutex::new(Pipeline::default()),
            ready: Condvar::new(),
        }
    }

    /// Queue a frame as if the fabric had produced it on its own.
    pub fn inject(&self, frame: &[u8]) -> Result<()> {
        let mut pipeline = self.lock();
        if pipeline.closed {
            return Err(Error::Closed);
        }
        pipeline.frames.push_back(frame.to_vec());
        self.ready.notify_one();
        Ok(())
    }

    /// Shut the pipeline down. Sends fail from now on, receives fail once the
    /// queued frames are drained.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn pending(&self) -> usize {
        self.lock().frames.len()
    }

    fn lock(&self) -> MutexGuard<'_, Pipeline> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DmaDevice for LoopbackDevice {
    fn tx_channels(&self) -> ChannelSet {
        self.tx_channels.clone()
    }

    fn rx_channels(&self) -> ChannelSet {
        self.rx_channels.clone()
    }

    fn send(&self, channel: ChannelId, data: &[u8]) -> Result<()> {
        if !self.tx_channels.contains(channel) {
            return Err(Error::UnknownChannel {
                channel,
                direction: Direction::Transmit,
            });
        }
        trace!("loopback: tx {} bytes on {}", data.len(), channel);
        self.inject(data)
    }

    fn recv(&self, channel: ChannelId, buf: &mut [u8]) -> Result<usize> {
        if !self.rx_channels.contains(channel) {
            return Err(Error::UnknownChannel {
                channel,
                direction: Direction::Receive,
            });
        }
        let mut pipeline = self.lock();
        loop {
            if let Some(frame) = pipeline.frames.pop_front() {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                if len < frame.len() {
                    debug!("loopback: dropped {} bytes past capacity", frame.len() - len);
                }
                return Ok(len);
            }
            if pipeline.closed {
                return Err(Error::Closed);
            }
            pipeline = self
                .ready
                .wait(pipeline)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
