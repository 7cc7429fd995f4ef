//! Recording host runtime
//!
//! `MockHost` implements every collaborator trait in memory and keeps a log of
//! what it was asked to do. It is what the tests and `moon3-compose` build
//! against. Drive images are real host files: flash images are read when the
//! bank is mapped, SD images are opened when bound.

use std::collections::BTreeMap;
use std::fs::File;

use crate::address_space::{MappedRegion, RegionFlags};
use crate::boot::BootParameters;
use crate::config::DriveRegistry;
use crate::host::{
    BackingDevice, BlockDeviceResolver, BusHandle, DriveKind, KernelLoader, MemoryRegistrar, PeripheralFactory,
    PeripheralHandle, ProcessorHandle, SocFactory, SocParts,
};
use crate::platform::FlashGeometry;
use crate::storage::{BRIDGE_TYPE, CARD_BUS, CARD_TYPE, DRIVE_PROPERTY};
use crate::HostError;

/// Processor variants the SA-11x0 SoC model accepts
pub const PROCESSOR_TYPES: [&str; 2] = ["sa1100", "sa1110"];

/// Value read from erased flash
pub const ERASED: u8 = 0xFF;

/// Something the host was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// SoC created for a processor type
    SocCreated(String),
    /// Region mapped, by name
    RegionMapped(String),
    /// Peripheral created, by type
    PeripheralCreated(String),
    /// Peripheral realized on a bus, by type
    Realized(String),
    /// Flag set: peripheral type, flag name, value
    FlagSet(String, String, bool),
    /// Drive bound: peripheral type, drive id
    DriveBound(String, String),
    KernelLoaded,
}

/// A mapped region and, for backed flash, the image contents
#[derive(Debug, Clone)]
pub struct MockRegion {
    pub region: MappedRegion,
    contents: Option<Vec<u8>>,
}

/// A peripheral as the host sees it
#[derive(Debug, Clone)]
pub struct MockPeripheral {
    pub kind: String,

    /// Bus it was realized on
    pub bus: Option<BusHandle>,

    pub realized: bool,

    pub flags: BTreeMap<String, bool>,

    pub drive: Option<BackingDevice>,

    child_buses: Vec<(String, BusHandle)>,
}

impl MockPeripheral {
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.flags.get(name).copied()
    }
}

/// In-memory host runtime
#[derive(Debug, Default)]
pub struct MockHost {
    drives: DriveRegistry,
    next_handle: u32,
    socs: Vec<(String, SocParts)>,
    ignore_memory_transaction_failures: bool,
    buses: Vec<BusHandle>,
    regions: Vec<MockRegion>,
    peripherals: BTreeMap<u32, MockPeripheral>,
    drives_in_use: Vec<String>,
    loads: Vec<(ProcessorHandle, BootParameters)>,
    events: Vec<HostEvent>,
}

impl MockHost {
    /// Host with no drives configured
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drives(drives: DriveRegistry) -> Self {
        Self {
            drives,
            ..Self::default()
        }
    }

    fn allocate_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn peripheral_mut(&mut self, handle: PeripheralHandle) -> Result<&mut MockPeripheral, HostError> {
        self.peripherals
            .get_mut(&handle.0)
            .ok_or(HostError::InvalidHandle(handle.0))
    }

    fn unrealized_mut(&mut self, handle: PeripheralHandle) -> Result<&mut MockPeripheral, HostError> {
        let peripheral = self.peripheral_mut(handle)?;
        if peripheral.realized {
            return Err(HostError::AlreadyRealized { handle });
        }
        Ok(peripheral)
    }

    fn claim_drive(&mut self, device: &BackingDevice) -> Result<(), HostError> {
        if self.drive_in_use(&device.id) {
            return Err(HostError::DeviceInUse {
                device: device.id.clone(),
            });
        }
        self.drives_in_use.push(device.id.clone());
        Ok(())
    }

    pub fn soc_count(&self) -> usize {
        self.socs.len()
    }

    /// Flag passed with the most recent SoC creation
    pub fn ignores_memory_transaction_failures(&self) -> bool {
        self.ignore_memory_transaction_failures
    }

    pub fn is_bus(&self, bus: BusHandle) -> bool {
        self.buses.contains(&bus)
    }

    /// Mapped regions, in mapping order
    pub fn regions(&self) -> &[MockRegion] {
        &self.regions
    }

    /// Read one byte of the physical address space
    ///
    /// RAM reads zero, flash reads its image or [`ERASED`] past the image end.
    /// Unmapped addresses read `None`.
    pub fn read_byte(&self, addr: u64) -> Option<u8> {
        let mapped = self.regions.iter().find(|r| r.region.contains(addr))?;
        let offset = (addr - mapped.region.base) as usize;

        if mapped.region.flags.contains(RegionFlags::RAM) {
            return Some(0);
        }
        Some(
            mapped
                .contents
                .as_ref()
                .and_then(|c| c.get(offset).copied())
                .unwrap_or(ERASED),
        )
    }

    pub fn peripheral(&self, handle: PeripheralHandle) -> Option<&MockPeripheral> {
        self.peripherals.get(&handle.0)
    }

    pub fn peripherals_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a MockPeripheral> + 'a {
        self.peripherals.values().filter(move |p| p.kind == kind)
    }

    /// Peripherals realized on `bus`
    pub fn peripherals_on(&self, bus: BusHandle) -> impl Iterator<Item = &MockPeripheral> + '_ {
        self.peripherals.values().filter(move |p| p.bus == Some(bus))
    }

    pub fn drive_in_use(&self, id: &str) -> bool {
        self.drives_in_use.iter().any(|d| d == id)
    }

    /// Kernel loader invocations
    pub fn loads(&self) -> &[(ProcessorHandle, BootParameters)] {
        &self.loads
    }

    pub fn events(&self) -> &[HostEvent] {
        &self.events
    }
}

impl BlockDeviceResolver for MockHost {
    fn resolve(&self, kind: DriveKind, bus: u32, unit: u32) -> Option<BackingDevice> {
        self.drives.resolve(kind, bus, unit)
    }
}

impl SocFactory for MockHost {
    fn create_soc(
        &mut self,
        processor_type: &str,
        ignore_memory_transaction_failures: bool,
    ) -> Result<SocParts, HostError> {
        if !PROCESSOR_TYPES.contains(&processor_type) {
            return Err(HostError::UnknownProcessorType {
                name: processor_type.into(),
            });
        }

        let parts = SocParts {
            processor: ProcessorHandle(self.allocate_handle()),
            serial_bus: BusHandle(self.allocate_handle()),
        };
        self.buses.push(parts.serial_bus);
        self.ignore_memory_transaction_failures = ignore_memory_transaction_failures;
        self.socs.push((processor_type.into(), parts));
        self.events.push(HostEvent::SocCreated(processor_type.into()));
        Ok(parts)
    }
}

impl MemoryRegistrar for MockHost {
    fn map_region(&mut self, base: u64, size: u64, name: &str) -> Result<MappedRegion, HostError> {
        let region = MappedRegion {
            name: name.into(),
            base,
            size,
            flags: RegionFlags::RAM,
        };
        self.regions.push(MockRegion {
            region: region.clone(),
            contents: None,
        });
        self.events.push(HostEvent::RegionMapped(name.into()));
        Ok(region)
    }

    fn map_backed_region(
        &mut self,
        base: u64,
        name: &str,
        geometry: &FlashGeometry,
        backing: Option<&BackingDevice>,
    ) -> Result<MappedRegion, HostError> {
        let mut flags = RegionFlags::ROM_DEVICE;
        let contents = match backing {
            Some(device) => {
                let mut image = std::fs::read(&device.file).map_err(|source| HostError::DeviceUnreadable {
                    device: device.id.clone(),
                    source,
                })?;
                self.claim_drive(device)?;
                image.truncate(geometry.region_size as usize);

                flags |= RegionFlags::BACKED;
                if device.read_only {
                    flags |= RegionFlags::READ_ONLY;
                }
                Some(image)
            }
            None => None,
        };

        let region = MappedRegion {
            name: name.into(),
            base,
            size: geometry.region_size,
            flags,
        };
        self.regions.push(MockRegion {
            region: region.clone(),
            contents,
        });
        self.events.push(HostEvent::RegionMapped(name.into()));
        Ok(region)
    }
}

impl PeripheralFactory for MockHost {
    fn create_peripheral(&mut self, kind: &str) -> Result<PeripheralHandle, HostError> {
        let child_buses = match kind {
            BRIDGE_TYPE => {
                let bus = BusHandle(self.allocate_handle());
                self.buses.push(bus);
                vec![(CARD_BUS.to_string(), bus)]
            }
            CARD_TYPE => Vec::new(),
            _ => return Err(HostError::UnknownPeripheral { kind: kind.into() }),
        };

        let handle = self.allocate_handle();
        self.peripherals.insert(
            handle,
            MockPeripheral {
                kind: kind.into(),
                bus: None,
                realized: false,
                flags: BTreeMap::new(),
                drive: None,
                child_buses,
            },
        );
        self.events.push(HostEvent::PeripheralCreated(kind.into()));
        Ok(PeripheralHandle(handle))
    }

    fn attach(&mut self, bus: BusHandle, peripheral: PeripheralHandle) -> Result<(), HostError> {
        if !self.is_bus(bus) {
            return Err(HostError::InvalidHandle(bus.0));
        }

        let target = self.unrealized_mut(peripheral)?;
        target.bus = Some(bus);
        target.realized = true;
        let kind = target.kind.clone();
        self.events.push(HostEvent::Realized(kind));
        Ok(())
    }

    fn child_bus(&mut self, peripheral: PeripheralHandle, name: &str) -> Result<BusHandle, HostError> {
        self.peripheral_mut(peripheral)?
            .child_buses
            .iter()
            .find(|(bus_name, _)| bus_name == name)
            .map(|(_, bus)| *bus)
            .ok_or_else(|| HostError::NoSuchChildBus {
                handle: peripheral,
                name: name.into(),
            })
    }

    fn set_mode_flag(&mut self, peripheral: PeripheralHandle, name: &str, value: bool) -> Result<(), HostError> {
        let target = self.unrealized_mut(peripheral)?;
        target.flags.insert(name.into(), value);
        let kind = target.kind.clone();
        self.events.push(HostEvent::FlagSet(kind, name.into(), value));
        Ok(())
    }

    fn bind_backing_device(
        &mut self,
        peripheral: PeripheralHandle,
        property: &str,
        device: Option<&BackingDevice>,
    ) -> Result<(), HostError> {
        self.unrealized_mut(peripheral)?;
        if property != DRIVE_PROPERTY {
            return Err(HostError::UnknownProperty {
                handle: peripheral,
                name: property.into(),
            });
        }

        let Some(device) = device else {
            return Ok(());
        };

        File::open(&device.file).map_err(|source| HostError::DeviceUnreadable {
            device: device.id.clone(),
            source,
        })?;
        self.claim_drive(device)?;

        let target = self.peripheral_mut(peripheral)?;
        target.drive = Some(device.clone());
        let kind = target.kind.clone();
        self.events.push(HostEvent::DriveBound(kind, device.id.clone()));
        Ok(())
    }
}

impl KernelLoader for MockHost {
    fn load(&mut self, processor: ProcessorHandle, params: &BootParameters) {
        self.loads.push((processor, params.clone()));
        self.events.push(HostEvent::KernelLoaded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::FLASH_GEOMETRY;

    fn drive(id: &str, file: &std::path::Path) -> BackingDevice {
        BackingDevice {
            id: id.into(),
            file: file.to_path_buf(),
            read_only: false,
        }
    }

    #[test]
    fn test_handles_are_unique() {
        let mut host = MockHost::new();

        let soc = host.create_soc("sa1110", true).unwrap();
        let bridge = host.create_peripheral(BRIDGE_TYPE).unwrap();
        let card = host.create_peripheral(CARD_TYPE).unwrap();

        let mut ids = vec![soc.processor.0, soc.serial_bus.0, bridge.0, card.0];
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_unknown_peripheral_type() {
        let mut host = MockHost::new();
        let result = host.create_peripheral("usb-storage");
        assert!(matches!(result, Err(HostError::UnknownPeripheral { .. })));
    }

    #[test]
    fn test_flags_rejected_after_realize() {
        let mut host = MockHost::new();
        let soc = host.create_soc("sa1100", false).unwrap();
        let bridge = host.create_peripheral(BRIDGE_TYPE).unwrap();
        host.attach(soc.serial_bus, bridge).unwrap();

        let result = host.set_mode_flag(bridge, "spi", true);
        assert!(matches!(result, Err(HostError::AlreadyRealized { .. })));

        let result = host.attach(soc.serial_bus, bridge);
        assert!(matches!(result, Err(HostError::AlreadyRealized { .. })));
    }

    #[test]
    fn test_drive_cannot_be_bound_twice() {
        let image = tempfile::NamedTempFile::new().unwrap();
        let mut host = MockHost::new();
        let first = host.create_peripheral(CARD_TYPE).unwrap();
        let second = host.create_peripheral(CARD_TYPE).unwrap();
        let sd = drive("sd0-0", image.path());

        host.bind_backing_device(first, DRIVE_PROPERTY, Some(&sd)).unwrap();
        let result = host.bind_backing_device(second, DRIVE_PROPERTY, Some(&sd));

        assert!(matches!(result, Err(HostError::DeviceInUse { ref device }) if device == "sd0-0"));
        assert!(host.peripheral(second).unwrap().drive.is_none());
    }

    #[test]
    fn test_unknown_property() {
        let mut host = MockHost::new();
        let card = host.create_peripheral(CARD_TYPE).unwrap();

        let result = host.bind_backing_device(card, "blk", None);
        assert!(matches!(result, Err(HostError::UnknownProperty { .. })));
    }

    #[test]
    fn test_read_only_flash_flags() {
        let image = tempfile::NamedTempFile::new().unwrap();
        let mut host = MockHost::new();
        let mut ro = drive("pflash0-0", image.path());
        ro.read_only = true;

        let region = host.map_backed_region(0, "moon3.fl1", &FLASH_GEOMETRY, Some(&ro)).unwrap();

        assert!(region.flags.contains(RegionFlags::ROM_DEVICE | RegionFlags::BACKED | RegionFlags::READ_ONLY));
        assert!(host.drive_in_use("pflash0-0"));
    }

    #[test]
    fn test_read_unmapped_address() {
        let mut host = MockHost::new();
        host.map_region(0xC000_0000, 0x1000, "ram").unwrap();

        assert_eq!(host.read_byte(0xC000_0FFF), Some(0));
        assert_eq!(host.read_byte(0xC000_1000), None);
    }
}
