//! Topology Builder - runs the board bring-up pipeline
//!
//! The pipeline is the fixed list [`BUILD_ORDER`]. Every step reads what the
//! steps before it left in the build context, and refuses to run when that is
//! missing. Steps run at most once. The first failure ends the build; nothing
//! is retried or rolled back.

use crate::address_space::{AddressSpaceComposer, FlashBank, FlashBinding, MappedRegion};
use crate::boot::{self, BootParameters};
use crate::config::PlatformConfig;
use crate::host::{DriveKind, HostRuntime};
use crate::platform::{format_size, PlatformDescriptor, MOON3};
use crate::soc::SocInstance;
use crate::storage::{self, StoragePeripheral};
use crate::{Result, TopologyError};

/// Bus number drives are looked up on
const DRIVE_BUS: u32 = 0;

/// Unit number of the SD card drive
const SD_UNIT: u32 = 0;

/// One stage of board bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStep {
    /// Check the requested RAM size against the platform
    ValidateRam,
    /// Create the SoC
    CreateSoc,
    /// Map SDRAM
    MapRam,
    /// Map both flash banks
    AttachFlash,
    /// Attach the SD card to the SSP bus
    AttachStorage,
    /// Pass boot parameters to the kernel loader
    Handoff,
}

/// The only order the steps may run in
pub const BUILD_ORDER: [BuildStep; 6] = [
    BuildStep::ValidateRam,
    BuildStep::CreateSoc,
    BuildStep::MapRam,
    BuildStep::AttachFlash,
    BuildStep::AttachStorage,
    BuildStep::Handoff,
];

/// The assembled board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineTopology {
    soc: SocInstance,
    ram_region: MappedRegion,
    flash_bindings: [FlashBinding; 2],
    storage_peripheral: StoragePeripheral,
    boot_parameters: BootParameters,
    regions: Vec<MappedRegion>,
}

impl MachineTopology {
    pub fn soc(&self) -> &SocInstance {
        &self.soc
    }

    /// SDRAM as mapped in the address space
    pub fn ram_region(&self) -> &MappedRegion {
        &self.ram_region
    }

    /// Flash banks, indexed by bank number
    pub fn flash_bindings(&self) -> &[FlashBinding; 2] {
        &self.flash_bindings
    }

    pub fn flash_bank(&self, bank: FlashBank) -> &FlashBinding {
        &self.flash_bindings[bank.index() as usize]
    }

    pub fn storage_peripheral(&self) -> &StoragePeripheral {
        &self.storage_peripheral
    }

    /// Parameters the kernel loader received
    pub fn boot_parameters(&self) -> &BootParameters {
        &self.boot_parameters
    }

    /// Every mapped region, in mapping order
    pub fn regions(&self) -> &[MappedRegion] {
        &self.regions
    }
}

/// Products of the steps run so far
#[derive(Debug, Default)]
struct BuildContext {
    ram_size: Option<u64>,
    soc: Option<SocInstance>,
    ram_region: Option<MappedRegion>,
    flash: Option<[FlashBinding; 2]>,
    storage: Option<StoragePeripheral>,
    boot: Option<BootParameters>,
    composer: AddressSpaceComposer,
    completed: Vec<BuildStep>,
    failed: Option<BuildStep>,
}

fn require<T>(value: Option<T>, step: BuildStep, missing: &'static str) -> Result<T> {
    value.ok_or(TopologyError::StepOutOfOrder { step, missing })
}

/// Builds a [`MachineTopology`] against a host runtime
pub struct TopologyBuilder<'h, H: HostRuntime + ?Sized> {
    platform: &'static PlatformDescriptor,
    config: PlatformConfig,
    host: &'h mut H,
    ctx: BuildContext,
}

impl<'h, H> TopologyBuilder<'h, H>
where
    H: HostRuntime + ?Sized,
{
    /// Builder for the moon3 board
    pub fn new(host: &'h mut H, config: PlatformConfig) -> Self {
        Self::for_platform(host, &MOON3, config)
    }

    pub fn for_platform(host: &'h mut H, platform: &'static PlatformDescriptor, config: PlatformConfig) -> Self {
        Self {
            platform,
            config,
            host,
            ctx: BuildContext::default(),
        }
    }

    /// Steps completed so far, in the order they ran
    pub fn completed(&self) -> &[BuildStep] {
        &self.ctx.completed
    }

    /// Run every step in [`BUILD_ORDER`] and assemble the topology
    ///
    /// # Errors
    /// The first step failure; see [`TopologyError`]
    pub fn build(mut self) -> Result<MachineTopology> {
        log::info!(
            "building {} topology ({}, {} RAM)",
            self.platform.description,
            self.config.processor_type,
            format_size(self.config.requested_ram_size)
        );

        for step in BUILD_ORDER {
            self.run_step(step)?;
        }

        self.finish()
    }

    /// Run a single step
    ///
    /// # Errors
    /// - [`TopologyError::BuildAborted`] if an earlier step failed
    /// - [`TopologyError::StepRepeated`] if `step` already ran
    /// - [`TopologyError::StepOutOfOrder`] if an earlier step has not produced its result
    /// - whatever the step itself reports
    pub fn run_step(&mut self, step: BuildStep) -> Result<()> {
        if let Some(failed) = self.ctx.failed {
            return Err(TopologyError::BuildAborted { step, failed });
        }
        if self.ctx.completed.contains(&step) {
            return Err(TopologyError::StepRepeated { step });
        }
        log::debug!("build step {:?}", step);

        let result = match step {
            BuildStep::ValidateRam => self.validate_ram(),
            BuildStep::CreateSoc => self.create_soc(),
            BuildStep::MapRam => self.map_ram(),
            BuildStep::AttachFlash => self.attach_flash(),
            BuildStep::AttachStorage => self.attach_storage(),
            BuildStep::Handoff => self.handoff(),
        };

        match result {
            Ok(()) => {
                self.ctx.completed.push(step);
                Ok(())
            }
            // Host state may be half-built; nothing runs after a failure
            Err(err) => {
                self.ctx.failed = Some(step);
                Err(err)
            }
        }
    }

    fn validate_ram(&mut self) -> Result<()> {
        let required = self.platform.required_ram_size;
        let requested = self.config.requested_ram_size;
        if requested != required {
            return Err(TopologyError::RamSizeMismatch { required, requested });
        }

        self.ctx.ram_size = Some(requested);
        Ok(())
    }

    fn create_soc(&mut self) -> Result<()> {
        require(self.ctx.ram_size, BuildStep::CreateSoc, "validated RAM size")?;

        let soc = SocInstance::create(&mut *self.host, self.platform, &self.config.processor_type)?;
        self.ctx.soc = Some(soc);
        Ok(())
    }

    fn map_ram(&mut self) -> Result<()> {
        let ram_size = require(self.ctx.ram_size, BuildStep::MapRam, "validated RAM size")?;
        require(self.ctx.soc.as_ref(), BuildStep::MapRam, "SoC")?;

        let region = self.ctx.composer.map_ram(&mut *self.host, self.platform, ram_size)?;
        log::info!("RAM mapped at {:#010x} ({})", region.base, format_size(region.size));
        self.ctx.ram_region = Some(region);
        Ok(())
    }

    fn attach_flash(&mut self) -> Result<()> {
        require(self.ctx.ram_region.as_ref(), BuildStep::AttachFlash, "RAM region")?;

        let bank0 = self.attach_flash_bank(FlashBank::Bank0)?;
        let bank1 = self.attach_flash_bank(FlashBank::Bank1)?;
        self.ctx.flash = Some([bank0, bank1]);
        Ok(())
    }

    fn attach_flash_bank(&mut self, bank: FlashBank) -> Result<FlashBinding> {
        let backing = self.host.resolve(DriveKind::Pflash, DRIVE_BUS, bank.index());
        let binding = self
            .ctx
            .composer
            .map_flash_bank(&mut *self.host, self.platform, bank, backing)?;

        log::info!(
            "flash bank {} mapped at {:#010x} ({})",
            bank.index(),
            binding.base,
            binding.backing.as_ref().map_or("unbacked", |d| d.id.as_str())
        );
        Ok(binding)
    }

    fn attach_storage(&mut self) -> Result<()> {
        require(self.ctx.flash.as_ref(), BuildStep::AttachStorage, "flash banks")?;
        let serial_bus = require(self.ctx.soc.as_ref(), BuildStep::AttachStorage, "SoC")?.serial_bus();

        let backing = self.host.resolve(DriveKind::Sd, DRIVE_BUS, SD_UNIT);
        let peripheral = storage::attach_removable_storage(&mut *self.host, serial_bus, backing)?;
        self.ctx.storage = Some(peripheral);
        Ok(())
    }

    fn handoff(&mut self) -> Result<()> {
        require(self.ctx.storage.as_ref(), BuildStep::Handoff, "storage peripheral")?;
        let ram_size = require(self.ctx.ram_size, BuildStep::Handoff, "validated RAM size")?;
        let processor = require(self.ctx.soc.as_ref(), BuildStep::Handoff, "SoC")?.processor();

        let params = BootParameters::new(self.platform, ram_size, self.config.images.clone());
        boot::handoff(&mut *self.host, processor, &params);
        self.ctx.boot = Some(params);
        Ok(())
    }

    /// Assemble the topology once every step in [`BUILD_ORDER`] has run
    ///
    /// # Errors
    /// - [`TopologyError::BuildAborted`] if a step failed
    /// - [`TopologyError::StepOutOfOrder`] if a step has not run yet
    pub fn finish(self) -> Result<MachineTopology> {
        let ctx = self.ctx;
        let step = BuildStep::Handoff;
        if let Some(failed) = ctx.failed {
            return Err(TopologyError::BuildAborted { step, failed });
        }

        Ok(MachineTopology {
            soc: require(ctx.soc, step, "SoC")?,
            ram_region: require(ctx.ram_region, step, "RAM region")?,
            flash_bindings: require(ctx.flash, step, "flash banks")?,
            storage_peripheral: require(ctx.storage, step, "storage peripheral")?,
            boot_parameters: require(ctx.boot, step, "boot parameters")?,
            regions: ctx.composer.regions().to_vec(),
        })
    }
}

/// Build the moon3 topology
///
/// # Errors
/// Any fatal misconfiguration; see [`TopologyError`]
pub fn build<H>(host: &mut H, config: PlatformConfig) -> Result<MachineTopology>
where
    H: HostRuntime + ?Sized,
{
    TopologyBuilder::new(host, config).build()
}
