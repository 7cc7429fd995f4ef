//! Storage Attachment - SD card on the SSP serial bus
//!
//! The card sits behind an SSI-to-SD bridge. The bridge is realized on the
//! SoC's SSP bus; the card is realized on the bridge's `sd-bus`. The card must
//! have its drive bound and its SPI mode flag set before it goes live.

use crate::host::{BackingDevice, BusHandle, PeripheralFactory, PeripheralHandle};
use crate::{Result, TopologyError};

/// SSI-to-SD bridge peripheral type
pub const BRIDGE_TYPE: &str = "ssi-sd";

/// SD card peripheral type
pub const CARD_TYPE: &str = "sd-card";

/// Child bus of the bridge the card is realized on
pub const CARD_BUS: &str = "sd-bus";

/// Card property receiving the backing drive
pub const DRIVE_PROPERTY: &str = "drive";

/// Card flag selecting SPI transfer mode
pub const SPI_MODE_FLAG: &str = "spi";

/// The attached SD card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePeripheral {
    bridge: PeripheralHandle,
    card: PeripheralHandle,
    card_bus: BusHandle,
    backing: Option<BackingDevice>,
}

impl StoragePeripheral {
    /// Bridge on the SSP bus
    pub fn bridge(&self) -> PeripheralHandle {
        self.bridge
    }

    pub fn card(&self) -> PeripheralHandle {
        self.card
    }

    /// Bus the card is realized on
    pub fn card_bus(&self) -> BusHandle {
        self.card_bus
    }

    pub fn backing(&self) -> Option<&BackingDevice> {
        self.backing.as_ref()
    }
}

/// Attach the SD card to `bus`
///
/// An absent drive leaves the card empty. A drive that is present but cannot
/// be bound is fatal.
///
/// # Errors
/// - [`TopologyError::StorageBinding`] if a configured drive cannot be bound
/// - [`TopologyError::Host`] if the host cannot create, wire or realize the peripherals
pub fn attach_removable_storage<P>(
    factory: &mut P,
    bus: BusHandle,
    backing: Option<BackingDevice>,
) -> Result<StoragePeripheral>
where
    P: PeripheralFactory + ?Sized,
{
    let bridge = factory.create_peripheral(BRIDGE_TYPE)?;
    factory.attach(bus, bridge)?;
    let card_bus = factory.child_bus(bridge, CARD_BUS)?;

    let card = factory.create_peripheral(CARD_TYPE)?;
    factory
        .bind_backing_device(card, DRIVE_PROPERTY, backing.as_ref())
        .map_err(|source| match &backing {
            Some(device) => TopologyError::StorageBinding {
                device: device.id.clone(),
                source,
            },
            None => TopologyError::Host(source),
        })?;
    factory.set_mode_flag(card, SPI_MODE_FLAG, true)?;
    factory.attach(card_bus, card)?;

    match &backing {
        Some(device) => log::info!("SD card attached (SPI mode), drive '{}'", device.id),
        None => log::info!("SD card attached (SPI mode), no drive"),
    }

    Ok(StoragePeripheral {
        bridge,
        card,
        card_bus,
        backing,
    })
}
