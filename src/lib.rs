//! Duplex transfer harness for Xilinx AXI DMA engines driven from userspace.
//!
//! A session validates the command line, opens one [`DmaDevice`], resolves
//! transmit and receive channels and then pushes a synthetic pattern out on
//! the transmit channel while a worker thread drains and hex-dumps whatever
//! the fabric sends back.

mod args;
mod axi_dma;
mod channels;
mod coordinator;
mod device;
mod dma_buffer;
mod error;
mod loopback;
mod transfer;
mod uio;

pub use args::{parse_args, usage, ArgError, Command, SessionConfig, MAX_POSITIONALS};
pub use axi_dma::{AxiDma, DmaStatus};
pub use channels::resolve_channels;
pub use coordinator::{write_hex_dump, DuplexCoordinator, ReceiveTask, SendPlan};
pub use device::{ChannelId, ChannelSet, Direction, DmaDevice};
pub use dma_buffer::DmaBuffer;
pub use error::{exit_code_for, Error, Result};
pub use loopback::LoopbackDevice;
pub use transfer::{
    bytes_to_mib, mib_to_bytes, StagingBuffer, TransferDescriptor, PATTERN_LEN, STAGING_CAPACITY,
};
pub use uio::{UioConfig, UioDevice};

/// Data memory barrier between CPU buffer accesses and DMA register writes.
#[inline(always)]
pub fn dmb() {
    #[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
    unsafe {
        std::arch::asm!("dmb sy", options(nostack, preserves_flags));
    }
    #[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
}
