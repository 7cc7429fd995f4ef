//! Boot Handoff
//!
//! Fills in the boot parameter record and passes it, with the processor
//! handle, to the kernel loader. What the loader does with it (ATAGs, image
//! placement, reset vector) is its own business.

use std::path::PathBuf;

use serde::Deserialize;

use crate::host::{KernelLoader, ProcessorHandle};
use crate::platform::PlatformDescriptor;

/// Images named on the command line or in the machine file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootImages {
    /// Kernel image
    pub kernel: Option<PathBuf>,

    pub initrd: Option<PathBuf>,

    /// Kernel command line
    #[serde(alias = "append")]
    pub cmdline: Option<String>,
}

/// Boot parameter record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootParameters {
    /// Where the loader places the kernel: the RAM base
    pub entry_region_base: u64,

    /// Validated RAM size
    pub ram_size: u64,

    /// ARM machine type number
    pub board_id: u32,

    pub images: BootImages,
}

impl BootParameters {
    pub fn new(platform: &PlatformDescriptor, ram_size: u64, images: BootImages) -> Self {
        Self {
            entry_region_base: platform.ram_base,
            ram_size,
            board_id: platform.board_id,
            images,
        }
    }
}

/// Hand the processor and boot parameters to the kernel loader
pub fn handoff<L>(loader: &mut L, processor: ProcessorHandle, params: &BootParameters)
where
    L: KernelLoader + ?Sized,
{
    log::info!(
        "handing off to kernel loader: entry {:#010x}, RAM {:#x}, board id {:#x}",
        params.entry_region_base,
        params.ram_size,
        params.board_id
    );
    loader.load(processor, params);
}
