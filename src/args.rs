use std::ffi::OsString;
use std::time::Duration;

use thiserror::Error;

use crate::coordinator::SendPlan;
use crate::device::ChannelId;
use crate::transfer::{mib_to_bytes, TransferDescriptor, STAGING_CAPACITY};
use crate::uio::UioConfig;

/// Trailing positional arguments tolerated after the options. Reserved for
/// input and output paths, which are not used.
pub const MAX_POSITIONALS: usize = 2;

#[derive(Debug, Error)]
pub enum ArgError {
    #[error("Either both -t and -r must be specified, or neither.")]
    UnpairedChannels,
    #[error("Only one of -s and -o can be specified.")]
    ConflictingSizes,
    #[error("Too many command line arguments.")]
    TooManyArguments,
    #[error("Unknown option {0}.")]
    UnknownOption(String),
    #[error("Send size {len} exceeds the {capacity} byte send buffer.")]
    SendTooLarge { len: usize, capacity: usize },
    #[error("Invalid argument: {0}.")]
    Invalid(#[from] pico_args::Error),
}

/// Everything a session needs, after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub descriptor: TransferDescriptor,
    pub plan: SendPlan,
    pub uio: UioConfig,
    pub loopback: bool,
    /// Stop the receive loop after this many transfers.
    pub max_receives: Option<usize>,
    /// Reject channel overrides that the device does not report.
    pub strict_channels: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            descriptor: TransferDescriptor::default(),
            plan: SendPlan::default(),
            uio: UioConfig::default(),
            loopback: false,
            max_receives: None,
            strict_channels: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Run(SessionConfig),
}

fn parse_mib(s: &str) -> Result<usize, String> {
    let mib: f64 = s.trim().parse().map_err(|e| format!("{}", e))?;
    if !mib.is_finite() || mib < 0.0 {
        return Err(format!("{} is not a size in MiB", s));
    }
    Ok(mib_to_bytes(mib))
}

fn parse_sizes(s: &str) -> Result<Vec<usize>, String> {
    let sizes = s
        .split(',')
        .map(|v| v.trim().parse::<usize>().map_err(|e| format!("{}: {}", v, e)))
        .collect::<Result<Vec<_>, _>>()?;
    if sizes.contains(&0) {
        return Err("send sizes must be positive".to_string());
    }
    Ok(sizes)
}

fn parse_pauses(s: &str) -> Result<Vec<Duration>, String> {
    s.split(',')
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| format!("{}: {}", v, e))
        })
        .collect()
}

/// Validate the command line, program name excluded.
///
/// `-h` wins over everything else. When an option is repeated the last
/// value counts.
pub fn parse_args(args: Vec<OsString>) -> Result<Command, ArgError> {
    let mut args = pico_args::Arguments::from_vec(args);

    if args.contains(["-h", "--help"]) {
        return Ok(Command::Help);
    }

    let tx_channel: Option<ChannelId> = args.values_from_str("-t")?.pop();
    let rx_channel: Option<ChannelId> = args.values_from_str("-r")?.pop();
    let mut size_bytes: Vec<usize> = args.values_from_str("-s")?;
    let mut size_mib: Vec<usize> = args.values_from_fn("-o", parse_mib)?;

    let mut config = SessionConfig {
        loopback: args.contains("--loopback"),
        strict_channels: args.contains("--strict-channels"),
        max_receives: args.opt_value_from_str("--max-receives")?,
        ..SessionConfig::default()
    };
    if let Some(prefix) = args.opt_value_from_str("--tx-prefix")? {
        config.uio.tx_prefix = prefix;
    }
    if let Some(prefix) = args.opt_value_from_str("--rx-prefix")? {
        config.uio.rx_prefix = prefix;
    }
    if let Some(name) = args.opt_value_from_str("--tx-buffer")? {
        config.uio.tx_buffer = name;
    }
    if let Some(name) = args.opt_value_from_str("--rx-buffer")? {
        config.uio.rx_buffer = name;
    }
    if let Some(sizes) = args.opt_value_from_fn("--sends", parse_sizes)? {
        config.plan.sizes = sizes;
    }
    if let Some(pauses) = args.opt_value_from_fn("--pace-ms", parse_pauses)? {
        config.plan.pauses = pauses;
    }

    let rest = args.finish();
    if let Some(option) = rest
        .iter()
        .filter_map(|a| a.to_str())
        .find(|a| a.len() > 1 && a.starts_with('-'))
    {
        return Err(ArgError::UnknownOption(option.to_string()));
    }

    if tx_channel.is_some() != rx_channel.is_some() {
        return Err(ArgError::UnpairedChannels);
    }
    if !size_bytes.is_empty() && !size_mib.is_empty() {
        return Err(ArgError::ConflictingSizes);
    }
    if rest.len() > MAX_POSITIONALS {
        return Err(ArgError::TooManyArguments);
    }
    if let Some(&len) = config.plan.sizes.iter().find(|&&l| l > STAGING_CAPACITY) {
        return Err(ArgError::SendTooLarge {
            len,
            capacity: STAGING_CAPACITY,
        });
    }

    config.descriptor = TransferDescriptor {
        tx_channel,
        rx_channel,
        output_size: size_bytes.pop().or_else(|| size_mib.pop()),
        transfer_len: 0,
    };
    Ok(Command::Run(config))
}

/// Usage text. The short form goes with error diagnostics, the full form is
/// printed for `-h`.
pub fn usage(full: bool) -> String {
    let mut text = String::from(
        "Usage: axidma-transfer [-t <DMA tx channel>] [-r <DMA rx channel>] \
         [-s <Output size> | -o <Output size>].\n",
    );
    if !full {
        return text;
    }
    text.push_str(
        "\t-t <DMA tx channel>:\tThe device id of the DMA channel to use for \
         transmitting. Default is to use the lowest numbered channel available.\n\
         \t-r <DMA rx channel>:\tThe device id of the DMA channel to use for \
         receiving the data from the PL fabric. Default is to use the lowest \
         numbered channel available.\n\
         \t-s <Output size>:\tThe size of the output in bytes. This is an \
         integer value that must be at least the number of bytes received back. \
         By default, this is the receive buffer capacity.\n\
         \t-o <Output size>:\tThe size of the output in MiBs. This is a \
         floating-point value that must be at least the number of bytes received \
         back. By default, this is the receive buffer capacity.\n\
         \t--loopback:\t\tUse an in-memory loopback instead of the hardware.\n\
         \t--tx-prefix <name>:\tuio name prefix of transmit engines (default h2d).\n\
         \t--rx-prefix <name>:\tuio name prefix of receive engines (default d2h).\n\
         \t--tx-buffer <name>:\tu-dma-buf used for transmitting (default udmabuf0).\n\
         \t--rx-buffer <name>:\tu-dma-buf used for receiving (default udmabuf1).\n\
         \t--sends <n,n,...>:\tSizes of the sends in bytes (default 1000,2000,1800).\n\
         \t--pace-ms <ms,ms,...>:\tDelays before the second and later sends; the last\n\
         \t\t\t\trepeats (default 10000,5000).\n\
         \t--max-receives <n>:\tStop receiving after n transfers (default never).\n\
         \t--strict-channels:\tReject -t/-r channels the device does not report.\n",
    );
    text
}
