//! Exit status and output of the binary.

use std::process::{Command, Output};

fn axidma(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_axidma-transfer"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run axidma-transfer")
}

#[test]
fn help_exits_zero() {
    let out = axidma(&["-t", "1", "-h"]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.starts_with("Usage: axidma-transfer"));
    assert!(stdout.contains("--pace-ms"));
}

#[test]
fn argument_error_exits_one_with_usage() {
    let out = axidma(&["-t2"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("Either both -t and -r must be specified"));
    assert!(stderr.contains("Usage: axidma-transfer"));
}

#[test]
fn loopback_session_dumps_every_send() {
    let out = axidma(&[
        "--loopback",
        "-t0",
        "-r1",
        "--sends",
        "20,40",
        "--pace-ms",
        "0",
        "--max-receives",
        "2",
    ]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("AXI DMA Transfer Info:"));
    assert!(stdout.contains("\tTransmit Channel: 0"));
    assert!(stdout.contains("\tReceive Channel: 1"));
    assert!(stdout.contains("received 20 bytes\n00 01 02"));
    assert!(stdout.contains("received 40 bytes\n"));
}

#[test]
fn unknown_strict_channel_exits_one() {
    let out = axidma(&["--loopback", "--strict-channels", "-t", "5", "-r", "1"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("Error: channel 5 is not a transmit channel"));
}
