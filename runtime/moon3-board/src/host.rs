//! Host runtime interfaces
//!
//! The composer never touches emulated hardware directly. SoC creation,
//! address space registration, peripheral plumbing, drive lookup and kernel
//! loading all go through the traits below, implemented by the host runtime
//! (or by [`crate::mock::MockHost`] in tests).

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::address_space::MappedRegion;
use crate::boot::BootParameters;
use crate::platform::FlashGeometry;
use crate::HostError;

/// Interface a drive is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveKind {
    /// Parallel NOR flash
    Pflash,
    /// SD/MMC card
    Sd,
}

impl fmt::Display for DriveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriveKind::Pflash => f.write_str("pflash"),
            DriveKind::Sd => f.write_str("sd"),
        }
    }
}

/// Host block device backing a flash bank or the SD card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingDevice {
    /// Drive id, unique per process
    pub id: String,

    /// Image file on the host
    pub file: PathBuf,

    pub read_only: bool,
}

/// Processor handle, consumed by the kernel loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessorHandle(pub u32);

/// Bus handle peripherals are attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusHandle(pub u32);

/// Peripheral handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeripheralHandle(pub u32);

/// What the SoC factory hands back
///
/// Clocks, DMA and UARTs live inside the SoC and are not visible here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocParts {
    pub processor: ProcessorHandle,

    /// SSP serial peripheral bus
    pub serial_bus: BusHandle,
}

/// Looks up user-configured drives by (kind, bus, unit)
pub trait BlockDeviceResolver {
    fn resolve(&self, kind: DriveKind, bus: u32, unit: u32) -> Option<BackingDevice>;
}

/// Creates the processor-and-peripheral package
pub trait SocFactory {
    /// Create the SoC for `processor_type`
    ///
    /// # Errors
    /// [`HostError::UnknownProcessorType`] for variants the factory cannot build
    fn create_soc(
        &mut self,
        processor_type: &str,
        ignore_memory_transaction_failures: bool,
    ) -> Result<SocParts, HostError>;
}

/// Registers regions in the global physical address space
pub trait MemoryRegistrar {
    /// Map plain RAM
    fn map_region(&mut self, base: u64, size: u64, name: &str) -> Result<MappedRegion, HostError>;

    /// Map a CFI flash bank, optionally backed by a host drive
    fn map_backed_region(
        &mut self,
        base: u64,
        name: &str,
        geometry: &FlashGeometry,
        backing: Option<&BackingDevice>,
    ) -> Result<MappedRegion, HostError>;
}

/// Creates peripherals and plugs them into buses
pub trait PeripheralFactory {
    /// Create an unrealized peripheral of the given type
    fn create_peripheral(&mut self, kind: &str) -> Result<PeripheralHandle, HostError>;

    /// Realize `peripheral` on `bus`
    fn attach(&mut self, bus: BusHandle, peripheral: PeripheralHandle) -> Result<(), HostError>;

    /// Look up a bus provided by `peripheral`
    fn child_bus(&mut self, peripheral: PeripheralHandle, name: &str) -> Result<BusHandle, HostError>;

    /// Set a boolean property; only valid before the peripheral is realized
    fn set_mode_flag(&mut self, peripheral: PeripheralHandle, name: &str, value: bool) -> Result<(), HostError>;

    /// Bind a drive property; `None` leaves the peripheral unbacked
    fn bind_backing_device(
        &mut self,
        peripheral: PeripheralHandle,
        property: &str,
        device: Option<&BackingDevice>,
    ) -> Result<(), HostError>;
}

/// Loads the kernel image and prepares the processor for boot
pub trait KernelLoader {
    fn load(&mut self, processor: ProcessorHandle, params: &BootParameters);
}

/// Everything the topology builder needs from the host
pub trait HostRuntime: BlockDeviceResolver + SocFactory + MemoryRegistrar + PeripheralFactory + KernelLoader {}

impl<T: ?Sized> HostRuntime for T where T: BlockDeviceResolver + SocFactory + MemoryRegistrar + PeripheralFactory + KernelLoader {}
