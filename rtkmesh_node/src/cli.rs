use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgMatches};
use serialport::{FlowControl as SerialFlowControl, SerialPort};

pub fn node_args() -> clap::Command {
    clap::Command::new("rtkmesh-node")
        .about("Drives the rtkmesh core from a host machine")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .value_name("config")
                .short('c')
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .default_value("rtkmesh-node.json")
                .help("JSON file holding the device configuration"),
        )
        .subcommand(
            clap::Command::new("decode")
                .about("Decode UBX navigation and RTCM corrections from a receiver or capture file")
                .arg(
                    Arg::new("port")
                        .value_name("port")
                        .short('p')
                        .long("port")
                        .conflicts_with("file")
                        .required_unless_present("file")
                        .help("Serial port the GNSS receiver is connected to"),
                )
                .arg(
                    Arg::new("baud")
                        .value_name("baud")
                        .short('s')
                        .long("baud")
                        .default_value("115200")
                        .value_parser(value_parser!(u32))
                        .help("Baud rate for the selected port"),
                )
                .arg(
                    Arg::new("file")
                        .value_name("file")
                        .short('f')
                        .long("file")
                        .value_parser(value_parser!(PathBuf))
                        .help("Raw receiver capture to decode instead of a serial port"),
                )
                .arg(
                    Arg::new("max-messages")
                        .long("max-messages")
                        .default_value("5")
                        .value_parser(value_parser!(usize))
                        .help("Messages decoded per pass before yielding"),
                )
                .arg(
                    Arg::new("resync")
                        .long("resync")
                        .action(clap::ArgAction::SetTrue)
                        .help("Skip to the next frame after a corrupted one instead of dropping the read"),
                )
                .arg(
                    Arg::new("trust-corrections")
                        .long("trust-corrections")
                        .action(clap::ArgAction::SetTrue)
                        .help("Forward RTCM frames without checking their CRC"),
                ),
        )
        .subcommand(
            clap::Command::new("simulate")
                .about("Run a root and a child node in-process and push a firmware image over the mesh")
                .arg(
                    Arg::new("firmware")
                        .value_name("firmware")
                        .long("firmware")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Firmware image to transfer"),
                )
                .arg(
                    Arg::new("chunk")
                        .long("chunk")
                        .default_value("1024")
                        .value_parser(value_parser!(usize))
                        .help("OTA chunk size in bytes, at most 1024"),
                )
                .arg(
                    Arg::new("out-dir")
                        .long("out-dir")
                        .value_parser(value_parser!(PathBuf))
                        .default_value("ota-partitions")
                        .help("Directory the child node writes its update partitions to"),
                ),
        )
}

/// Opens the receiver port. Reads time out quickly so the decode loop can
/// poll.
pub fn serialport(matches: &ArgMatches) -> Result<Box<dyn SerialPort>> {
    let port = matches
        .get_one::<String>("port")
        .context("no serial port given")?;
    let baud = matches.get_one::<u32>("baud").copied().unwrap_or(115_200);

    let builder = serialport::new(port, baud)
        .stop_bits(serialport::StopBits::One)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .timeout(Duration::from_millis(10))
        .flow_control(SerialFlowControl::None);

    log::debug!("{builder:?}");
    builder
        .open()
        .with_context(|| format!("Failed to open port: {port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_needs_a_source() {
        let res = node_args().try_get_matches_from(["rtkmesh-node", "decode"]);
        assert!(res.is_err());
    }

    #[test]
    fn port_and_file_conflict() {
        let res = node_args().try_get_matches_from([
            "rtkmesh-node",
            "decode",
            "--port",
            "/dev/ttyACM0",
            "--file",
            "capture.ubx",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn global_config_after_subcommand() {
        let matches = node_args()
            .try_get_matches_from([
                "rtkmesh-node",
                "simulate",
                "--firmware",
                "fw.bin",
                "--config",
                "node.json",
            ])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "simulate");
        assert_eq!(
            sub.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("node.json"))
        );
        assert_eq!(sub.get_one::<usize>("chunk"), Some(&1024));
    }
}
