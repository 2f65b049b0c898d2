use std::ops::Deref;

use crate::device::ChannelId;

/// Capacity of each staging buffer in bytes.
pub const STAGING_CAPACITY: usize = 2048;

/// Number of leading send-buffer bytes filled with the synthetic pattern.
pub const PATTERN_LEN: usize = 2000;

const MIB: f64 = 1024.0 * 1024.0;

pub fn mib_to_bytes(mib: f64) -> usize {
    (mib * MIB) as usize
}

pub fn bytes_to_mib(bytes: usize) -> f64 {
    bytes as f64 / MIB
}

/// Bookkeeping for one duplex session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferDescriptor {
    pub tx_channel: Option<ChannelId>,
    pub rx_channel: Option<ChannelId>,
    /// Requested receive size in bytes; `None` means the staging capacity.
    pub output_size: Option<usize>,
    /// Size of the send currently in flight.
    pub transfer_len: usize,
}

impl TransferDescriptor {
    pub fn output_size_or_default(&self) -> usize {
        self.output_size.unwrap_or(STAGING_CAPACITY)
    }

    pub fn channels(&self) -> Option<(ChannelId, ChannelId)> {
        Some((self.tx_channel?, self.rx_channel?))
    }
}

/// Fixed-capacity byte buffer holding data right before a send or right
/// after a receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingBuffer {
    data: Box<[u8]>,
}

impl StagingBuffer {
    pub fn zeroed(capacity: usize) -> StagingBuffer {
        StagingBuffer {
            data: vec![0u8; capacity].into_boxed_slice(),
        }
    }

    /// Send buffer: `byte[i] = i mod 256` for the first `PATTERN_LEN`
    /// positions, zero after that.
    pub fn with_pattern(capacity: usize) -> StagingBuffer {
        let mut buffer = StagingBuffer::zeroed(capacity);
        for (i, b) in buffer.data.iter_mut().take(PATTERN_LEN).enumerate() {
            *b = i as u8;
        }
        buffer
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Deref for StagingBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}
