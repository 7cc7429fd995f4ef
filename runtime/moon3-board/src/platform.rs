//! Platform Descriptor - fixed constants of the moon3 board
//!
//! The moon3 has one supported hardware configuration. Everything in here is
//! compile-time data shared read-only by the rest of the crate.

use static_assertions::const_assert;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;

// ============================================================================
// SA-1110 Memory Map
// ============================================================================

/// Static chip select 0 (boot flash)
pub const SA_CS0: u64 = 0x0000_0000;

/// Static chip select 1
pub const SA_CS1: u64 = 0x0800_0000;

/// SDRAM bank 0
pub const SA_SDCS0: u64 = 0xC000_0000;

/// Required (and only) RAM size: 512 MiB
pub const RAM_SIZE: u64 = 0x2000_0000;

/// ARM machine type number reported to the kernel
pub const BOARD_ID: u32 = 0x208;

// ============================================================================
// Flash Bank Geometry
// ============================================================================

/// Size of each flash bank
pub const FLASH_REGION_SIZE: u64 = 32 * MIB;

/// Erase sector size
pub const FLASH_SECTOR_SIZE: u64 = 64 * KIB;

/// Sector count of the bank geometry
pub const FLASH_NUM_SECTORS: u32 = 4;

const_assert!(SA_CS0 + FLASH_REGION_SIZE <= SA_CS1);
const_assert!(SA_CS1 + FLASH_REGION_SIZE <= SA_SDCS0);
const_assert!(SA_CS0 % FLASH_SECTOR_SIZE == 0);
const_assert!(SA_CS1 % FLASH_SECTOR_SIZE == 0);
const_assert!(SA_SDCS0 % FLASH_SECTOR_SIZE == 0);
const_assert!(FLASH_REGION_SIZE % FLASH_SECTOR_SIZE == 0);

/// Fixed geometry of a CFI flash bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashGeometry {
    /// Bytes covered by the bank in the address space
    pub region_size: u64,

    /// Erase sector size in bytes
    pub sector_size: u64,

    /// Sector count of the geometry triple
    pub num_sectors: u32,

    /// CFI manufacturer/device identification bytes
    pub id: [u16; 4],

    /// Big-endian data access
    pub big_endian: bool,
}

impl FlashGeometry {
    /// Number of erase blocks covering the whole region
    pub const fn erase_blocks(&self) -> u64 {
        self.region_size / self.sector_size
    }
}

pub const FLASH_GEOMETRY: FlashGeometry = FlashGeometry {
    region_size: FLASH_REGION_SIZE,
    sector_size: FLASH_SECTOR_SIZE,
    num_sectors: FLASH_NUM_SECTORS,
    id: [0x00, 0x00, 0x00, 0x00],
    big_endian: false,
};

/// Placement of one flash bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashBankLayout {
    pub base: u64,
    pub name: &'static str,
}

/// Immutable description of the supported platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformDescriptor {
    /// Machine type name
    pub name: &'static str,

    /// Human readable description
    pub description: &'static str,

    /// Physical base address of RAM
    pub ram_base: u64,

    /// The only accepted RAM size
    pub required_ram_size: u64,

    /// Region id used when mapping RAM
    pub ram_region_name: &'static str,

    /// Processor variant used when the configuration names none
    pub default_processor_type: &'static str,

    /// Board identification code handed to the kernel
    pub board_id: u32,

    /// Bus errors on unassigned addresses are ignored by the processor
    pub ignore_memory_transaction_failures: bool,

    /// Flash banks, indexed by bank number
    pub flash_banks: [FlashBankLayout; 2],

    pub flash_geometry: FlashGeometry,
}

/// The moon3 board
pub const MOON3: PlatformDescriptor = PlatformDescriptor {
    name: "moon3",
    description: "moon3 (SA-1110)",
    ram_base: SA_SDCS0,
    required_ram_size: RAM_SIZE,
    ram_region_name: "strongarm.sdram",
    default_processor_type: "sa1110",
    board_id: BOARD_ID,
    ignore_memory_transaction_failures: true,
    flash_banks: [
        FlashBankLayout {
            base: SA_CS0,
            name: "moon3.fl1",
        },
        FlashBankLayout {
            base: SA_CS1,
            name: "moon3.fl2",
        },
    ],
    flash_geometry: FLASH_GEOMETRY,
};

/// Render a byte count the way operators read it (`512 MiB`, `1.5 GiB`)
///
/// Values of 1000 or more of a unit roll over to the next unit. Non-integral
/// values keep three significant digits.
pub fn format_size(bytes: u64) -> String {
    const SUFFIXES: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < SUFFIXES.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if value.fract() == 0.0 {
        return format!("{} {}", value as u64, SUFFIXES[unit]);
    }

    let decimals = if value >= 100.0 {
        0
    } else if value >= 10.0 {
        1
    } else if value >= 1.0 {
        2
    } else {
        3
    };
    let rendered = format!("{:.*}", decimals, value);
    let rendered = if rendered.contains('.') {
        rendered.trim_end_matches('0').trim_end_matches('.')
    } else {
        rendered.as_str()
    };
    format!("{} {}", rendered, SUFFIXES[unit])
}
