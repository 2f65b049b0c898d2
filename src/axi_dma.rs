use std::fmt;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::prelude::*;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr;

use crate::device::Direction;
use crate::dma_buffer::read_attr;
use crate::dmb;
use crate::DmaBuffer;
use crate::Error;
use crate::Result;

// Register offsets inside one direction's block, in bytes.
const DMACR: isize = 0x00;
const DMASR: isize = 0x04;
const ADDR: isize = 0x18;
const ADDR_MSB: isize = 0x1C;
const LENGTH: isize = 0x28;

const MM2S_BLOCK: isize = 0x00;
const S2MM_BLOCK: isize = 0x30;

const DMACR_RESET: u32 = 1 << 2;
// run, IOC_IrqEn, Dly_IrqEn, Err_IrqEn
const DMACR_START: u32 = 0x7001;
const DMASR_IRQS: u32 = 0x7000;

/// Register-mode access to one AXI DMA instance exposed through uio.
pub struct AxiDma {
    dev: String,
    dev_fd: File,
    base: *mut u32,
    size: usize,
}

impl fmt::Debug for AxiDma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "AxiDma ({})", &self.dev)?;
        writeln!(f, "  file: {:?}", &self.dev_fd)?;
        writeln!(f, "  base: {:?}", &self.base)?;
        write!(f, "  size: {:#x?}", &self.size)
    }
}

impl AxiDma {
    /// Map the registers of `/dev/<uio>`. The size of the register window
    /// comes from the `<uio>` entry below `sysfs_root`.
    pub fn new(sysfs_root: &Path, uio: &str) -> Result<AxiDma> {
        let size = map_size(sysfs_root, uio)?;

        let dev_fd = OpenOptions::new()
            .read(true)
            .write(true)
            .open(format!("/dev/{}", uio))?;

        let dev;
        unsafe {
            dev = libc::mmap(
                std::ptr::null_mut::<libc::c_void>(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                dev_fd.as_raw_fd(),
                0,
            );
            if dev == libc::MAP_FAILED {
                return Err(Error::Mmap(format!("/dev/{}", uio)));
            }
        }

        Ok(AxiDma {
            dev: uio.to_string(),
            dev_fd,
            base: dev as *mut u32,
            size,
        })
    }

    pub fn name(&self) -> &str {
        &self.dev
    }

    fn reg(&self, direction: Direction, offset: isize) -> *mut u32 {
        let block = match direction {
            Direction::Transmit => MM2S_BLOCK,
            Direction::Receive => S2MM_BLOCK,
        };
        unsafe { self.base.offset((block + offset) / 4) }
    }

    /// Program a simple-mode transfer of `bytes` bytes between `buff` and
    /// the fabric. Completion is signalled through [`wait`](AxiDma::wait).
    pub fn start(&mut self, direction: Direction, buff: &DmaBuffer, bytes: usize) -> Result<()> {
        if bytes > buff.size() {
            return Err(Error::TooLarge {
                len: bytes,
                capacity: buff.size(),
            });
        }
        let phys = buff.phys_addr() as u64;
        unsafe {
            // buffer writes must land before the engine reads them
            dmb();

            ptr::write_volatile(self.reg(direction, DMASR), DMASR_IRQS);

            // unmask the interrupt in the uio driver
            self.dev_fd.write_all(&1u32.to_ne_bytes())?;

            ptr::write_volatile(self.reg(direction, DMACR), DMACR_START);
            ptr::write_volatile(self.reg(direction, ADDR), (phys & 0xffff_ffff) as u32);
            ptr::write_volatile(self.reg(direction, ADDR_MSB), (phys >> 32) as u32);
            // writing the length kicks off the transfer
            ptr::write_volatile(self.reg(direction, LENGTH), bytes as u32);
        }
        Ok(())
    }

    /// Block on the uio interrupt, then check and acknowledge the engine's
    /// status.
    pub fn wait(&mut self, direction: Direction) -> Result<DmaStatus> {
        let mut buf = [0u8; 4];
        self.dev_fd.read_exact(&mut buf)?;
        let status = self.status(direction);
        unsafe {
            ptr::write_volatile(self.reg(direction, DMASR), DMASR_IRQS);
        }
        dmb();
        status.check(direction)?;
        Ok(status)
    }

    /// Bytes actually written by the last S2MM transfer.
    pub fn received_len(&self) -> usize {
        unsafe { ptr::read_volatile(self.reg(Direction::Receive, LENGTH)) as usize }
    }

    pub fn reset(&mut self, direction: Direction) {
        unsafe {
            ptr::write_volatile(self.reg(direction, DMACR), DMACR_RESET);
            while ptr::read_volatile(self.reg(direction, DMACR)) & DMACR_RESET != 0 {}
            ptr::write_volatile(self.reg(direction, DMASR), DMASR_IRQS);
        }
    }

    pub fn status(&self, direction: Direction) -> DmaStatus {
        DmaStatus(unsafe { ptr::read_volatile(self.reg(direction, DMASR)) })
    }
}

impl Drop for AxiDma {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.size);
        }
    }
}

unsafe impl Send for AxiDma {}

fn map_size(sysfs_root: &Path, uio: &str) -> Result<usize> {
    let path = sysfs_root.join(uio).join("maps/map0/size");
    let path = path.to_string_lossy();
    parse_hex(&path, &read_attr(&path)?)
}

fn parse_hex(path: &str, value: &str) -> Result<usize> {
    usize::from_str_radix(value.trim_start_matches("0x"), 16).map_err(|source| Error::Sysfs {
        path: path.to_string(),
        source,
    })
}

/// Decoded DMASR register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaStatus(pub u32);

impl DmaStatus {
    const ERRORS: [(u32, &'static str); 6] = [
        (1 << 4, "internal"),
        (1 << 5, "slave"),
        (1 << 6, "decode"),
        (1 << 8, "sg internal"),
        (1 << 9, "sg slave"),
        (1 << 10, "sg decode"),
    ];

    pub fn halted(&self) -> bool {
        self.0 & 1 != 0
    }

    pub fn idle(&self) -> bool {
        self.0 & 2 != 0
    }

    pub fn scatter_gather(&self) -> bool {
        self.0 & 8 != 0
    }

    pub fn check(&self, direction: Direction) -> Result<()> {
        match Self::ERRORS.iter().find(|(bit, _)| self.0 & bit != 0) {
            Some(&(_, kind)) => Err(Error::Dma {
                kind,
                direction,
                status: self.0,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for DmaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.halted() { "halted" } else { "running" })?;
        f.write_str(if self.idle() { ", idle" } else { ", busy" })?;
        if self.scatter_gather() {
            f.write_str(", scatter gather")?;
        }
        for (bit, kind) in Self::ERRORS {
            if self.0 & bit != 0 {
                write!(f, ", {} error", kind)?;
            }
        }
        for (bit, irq) in [(1 << 12, "ioc_irq"), (1 << 13, "dly_irq"), (1 << 14, "err_irq")] {
            if self.0 & bit != 0 {
                write!(f, ", {}", irq)?;
            }
        }
        Ok(())
    }
}
