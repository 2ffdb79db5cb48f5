use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ArgMatches;
use log::{error, info};
use rtkmesh::{
    CorrectionCheck, DecoderConfig, DeviceConfig, NavPositionFix, NavState, SharedTime,
    SyncPolicy,
};

mod cli;
mod device;
mod node;

use device::{CorrectionCounter, FileSource, JsonConfigStore, Receiver, SerialSource};

static NAV: NavState = NavState::new();
static TIME: SharedTime = SharedTime::new(None);

fn main() -> Result<()> {
    env_logger::Builder::new()
        .format_timestamp(None)
        .format_target(false)
        .filter_level(log::LevelFilter::Info)
        .parse_env("LOG_LEVEL")
        .init();

    let cli = cli::node_args()
        .version(clap::crate_version!())
        .get_matches();

    let config_path = cli
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("rtkmesh-node.json"));
    let device_config = JsonConfigStore::new(config_path).load_or_init()?;
    info!(
        "node type {}, running firmware {}",
        device_config.node_type,
        node::firmware_digest(&device_config)
    );

    match cli.subcommand() {
        Some(("decode", sub)) => decode(sub),
        Some(("simulate", sub)) => simulate(sub, device_config),
        _ => unreachable!("clap requires a subcommand"),
    }
}

fn decode(args: &ArgMatches) -> Result<()> {
    let mut config = DecoderConfig::new()
        .with_max_messages_per_pass(args.get_one::<usize>("max-messages").copied().unwrap_or(5));
    if args.get_flag("resync") {
        config = config.with_sync_policy(SyncPolicy::Resync);
    }
    if args.get_flag("trust-corrections") {
        config = config.with_correction_check(CorrectionCheck::Trust);
    }

    let mut sink = CorrectionCounter::default();
    if let Some(path) = args.get_one::<PathBuf>("file") {
        let source = FileSource::open(path)
            .with_context(|| format!("Failed to open capture: {}", path.display()))?;
        let summary = Receiver::new(source, &NAV, &TIME, config).run(&mut sink, print_fix)?;
        info!(
            "{} messages, {} navigation, {} corrections ({} bytes), {} rejected",
            summary.messages,
            summary.navigation,
            summary.corrections,
            summary.correction_bytes,
            summary.rejected
        );
    } else {
        let port = cli::serialport(args)?;
        let mut receiver = Receiver::new(SerialSource::new(port), &NAV, &TIME, config);
        loop {
            receiver.run(&mut sink, print_fix)?;
        }
    }

    if let Some(svin) = NAV.survey_in() {
        println!("{}", serde_json::to_string(&svin)?);
    }
    if let Some(time) = TIME.get() {
        println!("{}", serde_json::to_string(&time)?);
    }
    Ok(())
}

fn print_fix(fix: &NavPositionFix) {
    match DateTime::<Utc>::try_from(fix) {
        Ok(utc) => info!(
            "{utc}: lat {:.7} lon {:.7} h {:.3} m, {:?}, {} SVs",
            fix.latitude(),
            fix.longitude(),
            fix.height_above_ellipsoid(),
            fix.fix_type(),
            fix.num_satellites
        ),
        Err(e) => info!("fix at iTOW {} without valid UTC ({e})", fix.itow),
    }
    match serde_json::to_string(fix) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("could not serialize fix: {e}"),
    }
}

fn simulate(args: &ArgMatches, device_config: DeviceConfig) -> Result<()> {
    let path = args
        .get_one::<PathBuf>("firmware")
        .context("no firmware image given")?;
    let firmware =
        fs::read(path).with_context(|| format!("Failed to read firmware: {}", path.display()))?;
    let chunk = args.get_one::<usize>("chunk").copied().unwrap_or(1024);
    let out_dir = args
        .get_one::<PathBuf>("out-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("ota-partitions"));

    let report = node::simulate(&firmware, chunk, &out_dir, device_config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.image_matches {
        anyhow::bail!("child partition does not match {}", path.display());
    }
    Ok(())
}
