use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use axidma_transfer::{
    bytes_to_mib, exit_code_for, parse_args, resolve_channels, usage, Command, DmaDevice,
    DuplexCoordinator, LoopbackDevice, SessionConfig, UioDevice,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(io::stderr)
        .init();

    let config = match parse_args(std::env::args_os().skip(1).collect()) {
        Ok(Command::Help) => {
            print!("{}", usage(true));
            return ExitCode::SUCCESS;
        }
        Ok(Command::Run(config)) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprint!("{}", usage(false));
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    }
}

fn run(config: &SessionConfig) -> Result<()> {
    let device: Arc<dyn DmaDevice> = if config.loopback {
        Arc::new(LoopbackDevice::default())
    } else {
        Arc::new(UioDevice::open(&config.uio)?)
    };
    info!("Succeed to initialize the AXI DMA device: {:?}", device);

    let mut descriptor = config.descriptor.clone();
    let (tx, rx) = resolve_channels(&*device, &mut descriptor, config.strict_channels)?;

    println!("AXI DMA Transfer Info:");
    println!("\tTransmit Channel: {}", tx);
    println!("\tReceive Channel: {}", rx);
    println!(
        "\tInput Data Size: {:.4} MiB",
        bytes_to_mib(config.plan.largest())
    );
    println!(
        "\tOutput Data Size: {:.4} MiB\n",
        bytes_to_mib(descriptor.output_size_or_default())
    );

    let mut coordinator = DuplexCoordinator::new(device, descriptor)?;
    coordinator
        .transmit(&config.plan)
        .context("transmit sequence aborted")?;

    let receiver = coordinator.spawn_receiver(io::stdout(), config.max_receives)?;
    let transfers = receiver.join().context("receive loop ended")?;
    info!("received {} transfers", transfers);

    Ok(())
}
