use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use env_logger::Env;

use dtb_hal::config::BoardConfig;
use dtb_hal::devices::{self, DeviceSession, SimulatedDevice};
use dtb_hal::hal::{CompatibilityMode, Hal};
use dtb_hal::pixel::{CalibrateOptions, ReadoutValue};

#[derive(Parser)]
#[command(about = "Talks to DTB pixel detector test boards", long_about = None)]
struct Args {
    /// Log HAL debug messages
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lists the DTBs attached over USB
    List,
    /// Opens a DTB and prints its information
    Info {
        #[arg(short, long)]
        board: Option<String>,
    },
    /// Writes a new firmware to a DTB
    Flash {
        file: PathBuf,
        #[arg(short, long)]
        board: Option<String>,
    },
    /// Configures the DUT and checks which pixels respond
    Alive {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long, conflicts_with = "simulate")]
        board: Option<String>,
        /// Run against a simulated DTB
        #[arg(long)]
        simulate: bool,
        #[arg(short, long, default_value = "10", value_parser = clap::value_parser!(i16).range(1..))]
        triggers: i16,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match args.command {
        Command::List => {
            let dtbs = devices::find_dtbs()?;
            if dtbs.is_empty() {
                println!("No DTB connected.");
            }
            for dtb in dtbs {
                println!("{}\t{}", dtb.name, dtb.port_info.port_name);
            }
        }
        Command::Info { board } => {
            let mut hal = Hal::open(board.as_deref(), CompatibilityMode::Lenient)?;
            println!("{}", hal.print_info()?);

            let report = hal.check_compatibility()?;
            println!(
                "Host calls: {} (hash {}), DTB calls: {}",
                report.host_count, report.host_hash, report.device_count
            );
            for m in &report.mismatches {
                println!("  {}: DTB \"{}\" != host \"{}\"", m.id, m.device, m.host);
            }
            hal.close()?;
        }
        Command::Flash { file, board } => {
            let reader = BufReader::new(
                File::open(&file).with_context(|| format!("Cannot open {}", file.display()))?,
            );
            let mut hal = Hal::open(board.as_deref(), CompatibilityMode::Lenient)?;
            hal.flash_testboard(reader)?;
            println!("Flash write started. Wait for the LEDs to go off, then power-cycle the DTB.");
        }
        Command::Alive {
            config,
            board,
            simulate,
            triggers,
        } => {
            let config = BoardConfig::from_file(&config)
                .with_context(|| format!("Cannot load {}", config.display()))?;

            if simulate {
                let mut hal = Hal::from_device(SimulatedDevice::default(), config.compatibility)?;
                alive(&mut hal, &config, triggers)?;
            } else {
                let mut hal = Hal::open(board.as_deref(), config.compatibility)?;
                alive(&mut hal, &config, triggers)?;
            }
        }
    }

    Ok(())
}

/// Powers the DUT, maps every ROC and takes a few DAQ events
fn alive<D: DeviceSession>(hal: &mut Hal<D>, config: &BoardConfig, triggers: i16) -> anyhow::Result<()> {
    hal.apply_config(config)?;
    if !hal.status() {
        anyhow::bail!("Board configuration failed");
    }
    hal.pon()?;

    let options = CalibrateOptions::new(triggers, ReadoutValue::Efficiency);
    for roc in config.rocs.iter().filter(|r| !r.masked) {
        let result = hal.calibrate_map(roc.i2c, &options)?;
        let responding = result
            .first()
            .map(|point| point.iter().filter(|p| p.value >= triggers as i32).count())
            .unwrap_or(0);
        println!("ROC {}: {} pixels responding", roc.i2c, responding);
    }

    let tbms = config.tbm_count();
    hal.daq_start(config.deser160_phase, tbms)?;
    hal.daq_trigger(triggers as u32)?;
    hal.daq_stop(tbms)?;
    let readout = hal.daq_read(tbms)?;
    hal.daq_reset(tbms)?;
    println!(
        "DAQ: {} words read, {} remaining",
        readout.data.len(),
        readout.remaining
    );

    hal.close()?;
    Ok(())
}
