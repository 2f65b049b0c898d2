use std::fmt;
use std::str::FromStr;

use crate::Result;

/// Identifier of one DMA channel as reported by the device layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChannelId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(ChannelId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// MM2S, memory to programmable logic.
    Transmit,
    /// S2MM, programmable logic to memory.
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Transmit => write!(f, "transmit"),
            Direction::Receive => write!(f, "receive"),
        }
    }
}

/// Ascending, duplicate free list of channels for one direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSet(Vec<ChannelId>);

impl ChannelSet {
    pub fn new(mut channels: Vec<ChannelId>) -> ChannelSet {
        channels.sort_unstable();
        channels.dedup();
        ChannelSet(channels)
    }

    /// Lowest-numbered channel, if any.
    pub fn first(&self) -> Option<ChannelId> {
        self.0.first().copied()
    }

    pub fn contains(&self, channel: ChannelId) -> bool {
        self.0.binary_search(&channel).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<u32> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        ChannelSet::new(iter.into_iter().map(ChannelId).collect())
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "]")
    }
}

/// Blocking access to an AXI DMA device.
///
/// Opening a device is its initialization and dropping it is its
/// destruction. Implementations serialize transfers per direction, so one
/// thread may be blocked in [`send`](DmaDevice::send) while another is
/// blocked in [`recv`](DmaDevice::recv) on the same handle.
pub trait DmaDevice: fmt::Debug + Send + Sync {
    fn tx_channels(&self) -> ChannelSet;

    fn rx_channels(&self) -> ChannelSet;

    /// Push `data` out on `channel` and block until the engine reports
    /// completion.
    fn send(&self, channel: ChannelId, data: &[u8]) -> Result<()>;

    /// Block until one inbound transfer on `channel` completes and return the
    /// number of bytes written to the front of `buf`.
    ///
    /// A short transfer is not an error; the count is whatever the engine
    /// reports.
    fn recv(&self, channel: ChannelId, buf: &mut [u8]) -> Result<usize>;
}
