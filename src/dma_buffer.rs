use std::fmt;
use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::prelude::*;
use std::os::unix::io::AsRawFd;
use std::slice;

use crate::Error;
use crate::Result;

/// Physically contiguous buffer provided by the u-dma-buf kernel module.
pub struct DmaBuffer {
    name: String,
    size: usize,
    phys_addr: usize,
    buffer: *mut libc::c_void,
    sync_mode: bool,
    sync_for_cpu: File,
    sync_for_device: File,
}

impl fmt::Debug for DmaBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DmaBuffer ({})", &self.name)?;
        writeln!(f, "  size: {:#x?}", &self.size)?;
        writeln!(f, "  phys_addr: {:#x?}", &self.phys_addr)?;
        writeln!(f, "  buffer: {:?}", &self.buffer)?;
        write!(f, "  sync_mode: {:?}", &self.sync_mode)
    }
}

pub(crate) fn read_attr(path: &str) -> Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

impl DmaBuffer {
    pub fn new(name: &str) -> Result<DmaBuffer> {
        let class = format!("/sys/class/u-dma-buf/{}", name);

        let path = format!("{}/phys_addr", class);
        let phys_addr = read_attr(&path)?;
        let phys_addr = usize::from_str_radix(phys_addr.trim_start_matches("0x"), 16)
            .map_err(|source| Error::Sysfs { path, source })?;

        let path = format!("{}/size", class);
        let size = read_attr(&path)?
            .parse::<usize>()
            .map_err(|source| Error::Sysfs { path, source })?;

        let sync_mode = read_attr(&format!("{}/sync_mode", class))? != "0";

        let mut sync_options = OpenOptions::new();
        sync_options.write(true);
        let sync_for_cpu = sync_options.open(format!("{}/sync_for_cpu", class))?;
        let sync_for_device = sync_options.open(format!("{}/sync_for_device", class))?;

        let dev = OpenOptions::new()
            .read(true)
            .write(true)
            .open(format!("/dev/{}", name))?;

        let buffer;
        unsafe {
            buffer = libc::mmap(
                std::ptr::null_mut::<libc::c_void>(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                dev.as_raw_fd(),
                0,
            );
            if buffer == libc::MAP_FAILED {
                return Err(Error::Mmap(format!("/dev/{}", name)));
            }
        }

        Ok(DmaBuffer {
            name: name.to_string(),
            size,
            phys_addr,
            buffer,
            sync_mode,
            sync_for_cpu,
            sync_for_device,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.buffer as *const u8, self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.buffer as *mut u8, self.size) }
    }

    /// Copy `data` to the start of the buffer and hand it to the device.
    pub fn load(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.size {
            return Err(Error::TooLarge {
                len: data.len(),
                capacity: self.size,
            });
        }
        self.as_mut_slice()[..data.len()].copy_from_slice(data);
        self.sync_for_device()
    }

    /// Take back the first `len` bytes from the device and copy them into
    /// `out`. Returns the number of bytes copied.
    pub fn unload(&mut self, len: usize, out: &mut [u8]) -> Result<usize> {
        self.sync_for_cpu()?;
        let len = len.min(out.len()).min(self.size);
        out[..len].copy_from_slice(&self.as_slice()[..len]);
        Ok(len)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn phys_addr(&self) -> usize {
        self.phys_addr
    }

    pub fn sync_mode(&self) -> bool {
        self.sync_mode
    }

    pub fn sync_for_cpu(&mut self) -> Result<()> {
        self.sync_for_cpu.write_all(b"1")?;
        Ok(())
    }

    pub fn sync_for_device(&mut self) -> Result<()> {
        self.sync_for_device.write_all(b"1")?;
        Ok(())
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.buffer, self.size);
        }
    }
}

unsafe impl Send for DmaBuffer {}
unsafe impl Sync for DmaBuffer {}
