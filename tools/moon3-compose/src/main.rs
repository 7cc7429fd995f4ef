//! moon3-compose - bring up the moon3 board topology from a machine file
//!
//! Commands:
//! - `moon3-compose init [path]` - Write a starter machine file
//! - `moon3-compose build` - Compose the board and print the resulting topology
//! - `moon3-compose info` - Show the fixed board layout

mod config;

use std::error::Error as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;

use moon3_board::mock::MockHost;
use moon3_board::{format_size, BuildStep, MachineTopology, RegionFlags, BUILD_ORDER, MOON3};

use crate::config::BuildArgs;

const MACHINE_TEMPLATE: &str = include_str!("../templates/machine.toml");

#[derive(Parser)]
#[command(name = "moon3-compose")]
#[command(version)]
#[command(about = "moon3 (SA-1110) board topology composer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter machine file
    Init {
        /// Destination
        #[arg(default_value = "moon3.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Compose the board against the recording host
    Build(BuildArgs),

    /// Show the fixed board layout
    Info,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path, force } => init_machine_file(&path, force)?,
        Commands::Build(args) => build_board(&args)?,
        Commands::Info => show_info(),
    }

    Ok(())
}

fn init_machine_file(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("'{}' already exists (use --force to overwrite)", path.display());
    }

    fs::write(path, MACHINE_TEMPLATE).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} Wrote {}", "✓".green(), path.display().to_string().bold());
    Ok(())
}

fn build_board(args: &BuildArgs) -> anyhow::Result<()> {
    let (platform_config, drives) = config::resolve(args)?;

    log::info!("═══════════════════════════════════════════════════════════");
    log::info!("  moon3 board bring-up");
    log::info!("═══════════════════════════════════════════════════════════");
    log::info!("RAM:   {}", format_size(platform_config.requested_ram_size));
    log::info!("CPU:   {}", platform_config.processor_type);
    log::info!("Drives: {}", drives.len());
    for drive in drives.iter() {
        log::info!("  {} -> {}", drive.id(), drive.file.display());
    }

    let mut host = MockHost::with_drives(drives);
    match moon3_board::build(&mut host, platform_config) {
        Ok(topology) => {
            print_topology(&topology);
            Ok(())
        }
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  {} {}", "caused by:".yellow(), cause);
                source = cause.source();
            }
            std::process::exit(err.exit_code());
        }
    }
}

fn print_topology(topology: &MachineTopology) {
    println!("{}", "moon3 topology".bold().green());
    println!("  SoC:     {}", topology.soc().variant().bold());

    println!("\n{}", "Address map:".bold());
    for region in topology.regions() {
        let kind = if region.flags.contains(RegionFlags::RAM) {
            "ram"
        } else if region.flags.contains(RegionFlags::BACKED) {
            "flash"
        } else {
            "flash (erased)"
        };
        println!(
            "  {:#010x}-{:#010x}  {:>9}  {:<20} {}",
            region.base,
            region.end() - 1,
            format_size(region.size),
            region.name,
            kind.dimmed()
        );
    }

    println!("\n{}", "Flash banks:".bold());
    for binding in topology.flash_bindings() {
        let backing = match &binding.backing {
            Some(device) => device.file.display().to_string(),
            None => "none".dimmed().to_string(),
        };
        println!("  {:?} @ {:#010x}: {}", binding.bank, binding.base, backing);
    }

    let storage = topology.storage_peripheral();
    let card = match storage.backing() {
        Some(device) => device.file.display().to_string(),
        None => "empty".dimmed().to_string(),
    };
    println!("\n{} {}", "SD card (SPI):".bold(), card);

    let params = topology.boot_parameters();
    println!("\n{}", "Boot:".bold());
    println!("  Entry:   {:#010x}", params.entry_region_base);
    println!("  Board:   {:#x}", params.board_id);
    if let Some(kernel) = &params.images.kernel {
        println!("  Kernel:  {}", kernel.display());
    }
    if let Some(initrd) = &params.images.initrd {
        println!("  Initrd:  {}", initrd.display());
    }
    if let Some(cmdline) = &params.images.cmdline {
        println!("  Cmdline: {}", cmdline);
    }
}

fn show_info() {
    println!("{}", format!("{} - {}", MOON3.name, MOON3.description).bold().green());
    println!("Version: {}", env!("CARGO_PKG_VERSION"));

    println!("\n{}", "Fixed layout:".bold());
    println!("  SDRAM    {:#010x}  {}", MOON3.ram_base, format_size(MOON3.required_ram_size));
    for bank in &MOON3.flash_banks {
        println!(
            "  {:<8} {:#010x}  {} ({} KiB sectors)",
            bank.name,
            bank.base,
            format_size(MOON3.flash_geometry.region_size),
            MOON3.flash_geometry.sector_size / 1024
        );
    }
    println!("  Board ID {:#x}", MOON3.board_id);
    println!("  CPU      {} (default)", MOON3.default_processor_type);

    println!("\n{}", "Bring-up order:".bold());
    for (index, step) in BUILD_ORDER.iter().enumerate() {
        println!("  {}. {}", index + 1, describe(*step));
    }
}

fn describe(step: BuildStep) -> &'static str {
    match step {
        BuildStep::ValidateRam => "Validate requested RAM size",
        BuildStep::CreateSoc => "Create processor and on-chip peripherals",
        BuildStep::MapRam => "Map SDRAM",
        BuildStep::AttachFlash => "Map flash banks",
        BuildStep::AttachStorage => "Attach SD card on the SSP bus",
        BuildStep::Handoff => "Hand off to the kernel loader",
    }
}
