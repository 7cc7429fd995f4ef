//! Machine file and command line layering
//!
//! The machine file is read first; flags given on the command line replace
//! what it says.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;

use moon3_board::{parse_size, DriveKind, DriveRegistry, DriveSpec, FlashBank, PlatformConfig};

/// Contents of a machine file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineFile {
    #[serde(default)]
    pub machine: PlatformConfig,

    #[serde(default, rename = "drive")]
    pub drives: Vec<DriveSpec>,
}

impl MachineFile {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid machine file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read machine file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("In {}", path.display()))
    }
}

/// Flags of `moon3-compose build`
#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Machine file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// RAM size, e.g. 512M
    #[arg(short = 'm', long)]
    pub ram: Option<String>,

    /// Processor variant
    #[arg(long)]
    pub cpu: Option<String>,

    /// Flash image; repeat for bank 0 then bank 1
    #[arg(long)]
    pub pflash: Vec<PathBuf>,

    /// SD card image
    #[arg(long)]
    pub sd: Option<PathBuf>,

    /// Kernel image
    #[arg(long)]
    pub kernel: Option<PathBuf>,

    /// Initial ramdisk
    #[arg(long)]
    pub initrd: Option<PathBuf>,

    /// Kernel command line
    #[arg(long)]
    pub append: Option<String>,
}

/// Resolve the machine file and flags into a configuration and drive registry
pub fn resolve(args: &BuildArgs) -> Result<(PlatformConfig, DriveRegistry)> {
    let file = match &args.config {
        Some(path) => MachineFile::load(path)?,
        None => MachineFile::default(),
    };
    apply(file, args)
}

fn apply(file: MachineFile, args: &BuildArgs) -> Result<(PlatformConfig, DriveRegistry)> {
    let mut config = file.machine;

    if let Some(ram) = &args.ram {
        config.requested_ram_size = parse_size(ram).with_context(|| format!("Invalid RAM size '{}'", ram))?;
    }
    if let Some(cpu) = &args.cpu {
        config.processor_type = cpu.clone();
    }
    if let Some(kernel) = &args.kernel {
        config.images.kernel = Some(kernel.clone());
    }
    if let Some(initrd) = &args.initrd {
        config.images.initrd = Some(initrd.clone());
    }
    if let Some(append) = &args.append {
        config.images.cmdline = Some(append.clone());
    }

    if args.pflash.len() > FlashBank::ALL.len() {
        bail!(
            "{} flash images given, but the board has only {} flash banks",
            args.pflash.len(),
            FlashBank::ALL.len()
        );
    }

    let mut drives: DriveRegistry = file.drives.into_iter().collect();
    for (unit, image) in args.pflash.iter().enumerate() {
        drives.add(DriveSpec::new(DriveKind::Pflash, 0, unit as u32, image));
    }
    if let Some(image) = &args.sd {
        drives.add(DriveSpec::new(DriveKind::Sd, 0, 0, image));
    }

    Ok((config, drives))
}
