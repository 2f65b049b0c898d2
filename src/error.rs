use std::io;
use std::num::ParseIntError;
use std::process::ExitCode;

use thiserror::Error;

use crate::device::{ChannelId, Direction};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed sysfs attribute {path}: {source}")]
    Sysfs {
        path: String,
        #[source]
        source: ParseIntError,
    },
    #[error("mapping {0} into virtual memory failed")]
    Mmap(String),
    #[error("failed to initialize the AXI DMA device: {0}")]
    DeviceInit(String),
    #[error("no transmit channels were found")]
    NoTransmitChannels,
    #[error("no receive channels were found")]
    NoReceiveChannels,
    #[error("channel {channel} is not a {direction} channel of this device")]
    UnknownChannel {
        channel: ChannelId,
        direction: Direction,
    },
    #[error("transfer of {len} bytes exceeds the {capacity} byte buffer")]
    TooLarge { len: usize, capacity: usize },
    #[error("DMA {kind} error on {direction} engine: DMASR 0x{status:08x}")]
    Dma {
        kind: &'static str,
        direction: Direction,
        status: u32,
    },
    #[error("transmit and receive channels have not been resolved")]
    Unresolved,
    #[error("receive task already started")]
    ReceiverStarted,
    #[error("device closed")]
    Closed,
    #[error("receive task panicked")]
    ReceiverPanicked,
}

impl Error {
    /// Process exit status for a session that ended with this error.
    ///
    /// Channel discovery failures report the negated `ENODEV`, everything
    /// else exits with 1.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Error::NoTransmitChannels | Error::NoReceiveChannels => {
                ExitCode::from((-libc::ENODEV) as u8)
            }
            _ => ExitCode::FAILURE,
        }
    }

    pub fn is_channel_discovery(&self) -> bool {
        matches!(self, Error::NoTransmitChannels | Error::NoReceiveChannels)
    }
}

/// Exit status for a session error that may carry `anyhow` context on top
/// of an [`Error`].
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    err.downcast_ref::<Error>()
        .map_or(ExitCode::FAILURE, Error::exit_code)
}
