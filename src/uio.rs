use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::device::{ChannelId, ChannelSet, Direction, DmaDevice};
use crate::AxiDma;
use crate::DmaBuffer;
use crate::Error;
use crate::Result;

/// Where to find the engines and buffers of a [`UioDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UioConfig {
    pub sysfs_root: PathBuf,
    /// uio `name` prefix of MM2S engines.
    pub tx_prefix: String,
    /// uio `name` prefix of S2MM engines.
    pub rx_prefix: String,
    pub tx_buffer: String,
    pub rx_buffer: String,
}

impl Default for UioConfig {
    fn default() -> Self {
        UioConfig {
            sysfs_root: PathBuf::from("/sys/class/uio"),
            tx_prefix: "h2d".to_string(),
            rx_prefix: "d2h".to_string(),
            tx_buffer: "udmabuf0".to_string(),
            rx_buffer: "udmabuf1".to_string(),
        }
    }
}

/// List the `uio<N>` entries below `root` whose `name` starts with `prefix`.
/// The channel id is `N`.
pub(crate) fn discover_channels(root: &Path, prefix: &str) -> Result<ChannelSet> {
    let mut channels = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let index = match file_name
            .to_str()
            .and_then(|n| n.strip_prefix("uio"))
            .and_then(|n| n.parse::<u32>().ok())
        {
            Some(index) => index,
            None => continue,
        };
        let name = match fs::read_to_string(entry.path().join("name")) {
            Ok(name) => name,
            Err(_) => continue,
        };
        if name.trim().starts_with(prefix) {
            debug!("uio{} ({}) matches {:?}", index, name.trim(), prefix);
            channels.push(ChannelId(index));
        }
    }
    Ok(ChannelSet::new(channels))
}

struct Port {
    engines: BTreeMap<ChannelId, AxiDma>,
    buffer: DmaBuffer,
}

impl Port {
    fn open(
        sysfs_root: &Path,
        channels: &ChannelSet,
        direction: Direction,
        buffer_name: &str,
    ) -> Result<Port> {
        let buffer = DmaBuffer::new(buffer_name)
            .map_err(|e| Error::DeviceInit(format!("{} buffer {}: {}", direction, buffer_name, e)))?;
        let mut engines = BTreeMap::new();
        for channel in channels.iter() {
            let uio = format!("uio{}", channel);
            let mut engine = AxiDma::new(sysfs_root, &uio)
                .map_err(|e| Error::DeviceInit(format!("{} engine {}: {}", direction, uio, e)))?;
            engine.reset(direction);
            engines.insert(channel, engine);
        }
        Ok(Port { engines, buffer })
    }

    fn engine(&mut self, channel: ChannelId, direction: Direction) -> Result<(&mut AxiDma, &mut DmaBuffer)> {
        let Port { engines, buffer } = self;
        let engine = engines
            .get_mut(&channel)
            .ok_or(Error::UnknownChannel { channel, direction })?;
        Ok((engine, buffer))
    }
}

/// AXI DMA engines exposed through uio, with one u-dma-buf per direction.
///
/// Each direction sits behind its own lock, so a send and a receive can be
/// outstanding at the same time.
pub struct UioDevice {
    tx_channels: ChannelSet,
    rx_channels: ChannelSet,
    tx: Mutex<Port>,
    rx: Mutex<Port>,
}

impl fmt::Debug for UioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UioDevice")
            .field("tx_channels", &self.tx_channels)
            .field("rx_channels", &self.rx_channels)
            .finish()
    }
}

fn lock(port: &Mutex<Port>) -> MutexGuard<'_, Port> {
    port.lock().unwrap_or_else(PoisonError::into_inner)
}

impl UioDevice {
    pub fn open(config: &UioConfig) -> Result<UioDevice> {
        let tx_channels = discover_channels(&config.sysfs_root, &config.tx_prefix)
            .map_err(|e| Error::DeviceInit(format!("scanning {:?}: {}", config.sysfs_root, e)))?;
        let rx_channels = discover_channels(&config.sysfs_root, &config.rx_prefix)
            .map_err(|e| Error::DeviceInit(format!("scanning {:?}: {}", config.sysfs_root, e)))?;

        let tx = Port::open(
            &config.sysfs_root,
            &tx_channels,
            Direction::Transmit,
            &config.tx_buffer,
        )?;
        let rx = Port::open(
            &config.sysfs_root,
            &rx_channels,
            Direction::Receive,
            &config.rx_buffer,
        )?;
        info!(
            "opened AXI DMA: tx {} via {}, rx {} via {}",
            tx_channels, config.tx_buffer, rx_channels, config.rx_buffer
        );

        Ok(UioDevice {
            tx_channels,
            rx_channels,
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
        })
    }
}

impl DmaDevice for UioDevice {
    fn tx_channels(&self) -> ChannelSet {
        self.tx_channels.clone()
    }

    fn rx_channels(&self) -> ChannelSet {
        self.rx_channels.clone()
    }

    fn send(&self, channel: ChannelId, data: &[u8]) -> Result<()> {
        let mut port = lock(&self.tx);
        let (engine, buffer) = port.engine(channel, Direction::Transmit)?;
        buffer.load(data)?;
        engine.start(Direction::Transmit, buffer, data.len())?;
        let status = engine.wait(Direction::Transmit)?;
        debug!("{}: sent {} bytes ({})", engine.name(), data.len(), status);
        Ok(())
    }

    fn recv(&self, channel: ChannelId, buf: &mut [u8]) -> Result<usize> {
        let mut port = lock(&self.rx);
        let (engine, buffer) = port.engine(channel, Direction::Receive)?;
        let len = buf.len().min(buffer.size());
        engine.start(Direction::Receive, buffer, len)?;
        let status = engine.wait(Direction::Receive)?;
        let received = buffer.unload(engine.received_len(), buf)?;
        debug!("{}: received {} bytes ({})", engine.name(), received, status);
        Ok(received)
    }
}
