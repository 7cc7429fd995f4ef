//! Address Space Composer - places RAM and flash in the physical address space
//!
//! Regions are handed to the host's [`MemoryRegistrar`] at fixed bases.
//! Nothing here checks for overlap: the layout is fixed by the platform
//! constants and asserted at compile time in [`crate::platform`].
//!
//! Once mapped, a region is never moved or resized.

use bitflags::bitflags;

use crate::host::{BackingDevice, MemoryRegistrar};
use crate::platform::{FlashGeometry, PlatformDescriptor};
use crate::Result;

bitflags! {
    /// Attributes of a mapped region
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RegionFlags: u32 {
        /// System RAM
        const RAM = 1 << 0;
        /// ROM device (flash): reads hit memory, writes hit the command interface
        const ROM_DEVICE = 1 << 1;
        /// Contents come from a host drive
        const BACKED = 1 << 2;
        /// Backing drive is read-only
        const READ_ONLY = 1 << 3;
    }
}

/// Region placed in the physical address space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRegion {
    pub name: String,

    /// Physical base address
    pub base: u64,

    /// Size in bytes
    pub size: u64,

    pub flags: RegionFlags,
}

impl MappedRegion {
    /// First address past the region
    pub fn end(&self) -> u64 {
        self.base + self.size
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.end()
    }
}

/// What to map
#[derive(Debug, Clone)]
pub enum RegionSpec {
    Ram {
        name: String,
        size: u64,
    },
    Flash {
        name: String,
        geometry: FlashGeometry,
        backing: Option<BackingDevice>,
    },
}

/// One of the two flash banks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlashBank {
    Bank0,
    Bank1,
}

impl FlashBank {
    pub const ALL: [FlashBank; 2] = [FlashBank::Bank0, FlashBank::Bank1];

    /// Bank index, also the drive unit number
    pub fn index(self) -> u32 {
        match self {
            FlashBank::Bank0 => 0,
            FlashBank::Bank1 => 1,
        }
    }

    pub fn base(self, platform: &PlatformDescriptor) -> u64 {
        platform.flash_banks[self.index() as usize].base
    }

    pub fn region_name(self, platform: &PlatformDescriptor) -> &'static str {
        platform.flash_banks[self.index() as usize].name
    }
}

/// A mapped flash bank and the drive behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashBinding {
    pub bank: FlashBank,

    /// `None` for an unbacked bank, which reads as erased
    pub backing: Option<BackingDevice>,

    pub base: u64,

    pub geometry: FlashGeometry,

    pub region: MappedRegion,
}

impl FlashBinding {
    pub fn is_backed(&self) -> bool {
        self.backing.is_some()
    }
}

/// Records every region it places, in mapping order
#[derive(Debug, Default)]
pub struct AddressSpaceComposer {
    regions: Vec<MappedRegion>,
}

impl AddressSpaceComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `region` into the address space at `base`
    ///
    /// # Errors
    /// Whatever the registrar reports (e.g. an unreadable flash image)
    pub fn map_region<R>(&mut self, registrar: &mut R, base: u64, region: RegionSpec) -> Result<MappedRegion>
    where
        R: MemoryRegistrar + ?Sized,
    {
        let mapped = match &region {
            RegionSpec::Ram { name, size } => {
                log::debug!("mapping RAM '{}' at {:#010x} ({:#x} bytes)", name, base, size);
                registrar.map_region(base, *size, name)?
            }
            RegionSpec::Flash { name, geometry, backing } => {
                log::debug!(
                    "mapping flash '{}' at {:#010x} ({:#x} bytes, {:#x} byte sectors)",
                    name,
                    base,
                    geometry.region_size,
                    geometry.sector_size
                );
                registrar.map_backed_region(base, name, geometry, backing.as_ref())?
            }
        };

        self.regions.push(mapped.clone());
        Ok(mapped)
    }

    /// Map system RAM at the platform's RAM base
    pub fn map_ram<R>(&mut self, registrar: &mut R, platform: &PlatformDescriptor, size: u64) -> Result<MappedRegion>
    where
        R: MemoryRegistrar + ?Sized,
    {
        self.map_region(
            registrar,
            platform.ram_base,
            RegionSpec::Ram {
                name: platform.ram_region_name.into(),
                size,
            },
        )
    }

    /// Map one flash bank at its fixed base
    pub fn map_flash_bank<R>(
        &mut self,
        registrar: &mut R,
        platform: &PlatformDescriptor,
        bank: FlashBank,
        backing: Option<BackingDevice>,
    ) -> Result<FlashBinding>
    where
        R: MemoryRegistrar + ?Sized,
    {
        let base = bank.base(platform);
        if backing.is_none() {
            log::warn!("flash bank {} has no drive, mapping it erased", bank.index());
        }

        let region = self.map_region(
            registrar,
            base,
            RegionSpec::Flash {
                name: bank.region_name(platform).into(),
                geometry: platform.flash_geometry,
                backing: backing.clone(),
            },
        )?;

        Ok(FlashBinding {
            bank,
            backing,
            base,
            geometry: platform.flash_geometry,
            region,
        })
    }

    /// Regions mapped so far
    pub fn regions(&self) -> &[MappedRegion] {
        &self.regions
    }

    /// Region covering `addr`, if any
    pub fn region_at(&self, addr: u64) -> Option<&MappedRegion> {
        self.regions.iter().find(|r| r.contains(addr))
    }
}
