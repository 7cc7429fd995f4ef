//! Integration tests for full moon3 board bring-up
//!
//! These tests run the whole pipeline against the recording host:
//! - RAM validation
//! - SoC creation
//! - RAM and flash mapping
//! - SD card attachment
//! - Kernel loader handoff

use std::io::Write;
use std::path::PathBuf;

use moon3_board::mock::{HostEvent, MockHost, ERASED};
use moon3_board::platform::{KIB, MIB};
use moon3_board::storage::{BRIDGE_TYPE, CARD_TYPE, SPI_MODE_FLAG};
use moon3_board::*;

fn image_with(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create image");
    file.write_all(bytes).expect("Failed to write image");
    file
}

/// 512 MiB, no drives: two unbacked banks, an empty SD card, one handoff
#[test]
fn test_default_board_without_drives() {
    let mut host = MockHost::new();

    let topology = build(&mut host, PlatformConfig::new(512 * MIB)).expect("Failed to build topology");

    // One SoC
    assert_eq!(host.soc_count(), 1);
    assert_eq!(topology.soc().variant(), "sa1110");

    // RAM at the SDRAM base
    let ram = topology.ram_region();
    assert_eq!(ram.base, 0xC000_0000);
    assert_eq!(ram.size, 512 * MIB);
    assert!(ram.flags.contains(RegionFlags::RAM));

    // Exactly two flash banks with the fixed geometry
    let flash_regions = host
        .regions()
        .iter()
        .filter(|r| r.region.flags.contains(RegionFlags::ROM_DEVICE))
        .count();
    assert_eq!(flash_regions, 2);

    for (binding, base) in topology.flash_bindings().iter().zip([0x0000_0000, 0x0800_0000]) {
        assert_eq!(binding.base, base);
        assert_eq!(binding.geometry.region_size, 32 * MIB);
        assert_eq!(binding.geometry.sector_size, 64 * KIB);
        assert_eq!(binding.geometry.num_sectors, 4);
        assert!(!binding.is_backed());
        assert_eq!(host.read_byte(base), Some(ERASED));
    }

    // SD card behind the bridge on the SSP bus, SPI mode, no drive
    let storage = topology.storage_peripheral();
    let ssp = topology.soc().serial_bus();
    assert_eq!(host.peripherals_on(ssp).filter(|p| p.kind == BRIDGE_TYPE).count(), 1);
    let card = host.peripheral(storage.card()).expect("card missing");
    assert!(card.realized);
    assert_eq!(card.flag(SPI_MODE_FLAG), Some(true));
    assert!(card.drive.is_none());
    assert!(storage.backing().is_none());

    // One handoff with the validated parameters
    let loads = host.loads();
    assert_eq!(loads.len(), 1);
    let (processor, params) = &loads[0];
    assert_eq!(*processor, topology.soc().processor());
    assert_eq!(params.entry_region_base, 0xC000_0000);
    assert_eq!(params.ram_size, 512 * MIB);
    assert_eq!(params.board_id, 0x208);
}

/// 256 MiB is rejected before any device exists
#[test]
fn test_wrong_ram_size_is_fatal() {
    let mut host = MockHost::new();

    let err = build(&mut host, PlatformConfig::new(256 * MIB)).expect_err("build should fail");

    assert!(matches!(
        err,
        TopologyError::RamSizeMismatch {
            required: 0x2000_0000,
            requested: 0x1000_0000
        }
    ));
    assert!(err.to_string().contains("512 MiB"));
    assert_ne!(err.exit_code(), 0);

    assert_eq!(host.soc_count(), 0);
    assert!(host.regions().is_empty());
    assert!(host.events().is_empty());
    assert!(host.loads().is_empty());
}

/// Every RAM size other than 512 MiB fails the same way
#[test]
fn test_only_one_ram_size_accepted() {
    for size in [0, 64 * MIB, 512 * MIB - 1, 512 * MIB + 1, 1024 * MIB] {
        let mut host = MockHost::new();
        let result = build(&mut host, PlatformConfig::new(size));
        assert!(matches!(result, Err(TopologyError::RamSizeMismatch { .. })), "size {:#x}", size);
        assert_eq!(host.soc_count(), 0);
    }
}

/// Drives resolved from the registry back the flash banks and the SD card
#[test]
fn test_board_with_drives() {
    let flash0 = image_with(&[0x13, 0x00, 0xA0, 0xE3]);
    let flash1 = image_with(&[0x42; 16]);
    let card = image_with(&[0u8; 512]);

    let registry = DriveRegistry::new()
        .with(DriveSpec::new(DriveKind::Pflash, 0, 0, flash0.path()))
        .with(DriveSpec::new(DriveKind::Pflash, 0, 1, flash1.path()))
        .with(DriveSpec::new(DriveKind::Sd, 0, 0, card.path()));
    let mut host = MockHost::with_drives(registry);

    let topology = build(&mut host, PlatformConfig::default()).expect("Failed to build topology");

    let bank0 = topology.flash_bank(FlashBank::Bank0);
    assert_eq!(bank0.backing.as_ref().map(|d| d.id.as_str()), Some("pflash0-0"));
    assert_eq!(host.read_byte(0x0), Some(0x13));
    assert_eq!(host.read_byte(0x3), Some(0xE3));

    let bank1 = topology.flash_bank(FlashBank::Bank1);
    assert!(bank1.is_backed());
    assert_eq!(host.read_byte(0x0800_000F), Some(0x42));
    assert_eq!(host.read_byte(0x0800_0010), Some(ERASED));

    let storage = topology.storage_peripheral();
    assert_eq!(storage.backing().map(|d| d.file.clone()), Some(card.path().to_path_buf()));
    assert!(host.drive_in_use("sd0-0"));
}

/// Only one flash bank configured: the other stays unbacked and the build succeeds
#[test]
fn test_partial_flash_configuration() {
    let flash1 = image_with(&[0xAA]);
    let registry = DriveRegistry::new().with(DriveSpec::new(DriveKind::Pflash, 0, 1, flash1.path()));
    let mut host = MockHost::with_drives(registry);

    let topology = build(&mut host, PlatformConfig::default()).expect("Failed to build topology");

    assert!(!topology.flash_bank(FlashBank::Bank0).is_backed());
    assert!(topology.flash_bank(FlashBank::Bank1).is_backed());
    assert_eq!(host.loads().len(), 1);
}

/// An SD drive that cannot be opened stops the build before handoff
#[test]
fn test_unbindable_sd_drive_prevents_handoff() {
    let registry = DriveRegistry::new().with(DriveSpec::new(
        DriveKind::Sd,
        0,
        0,
        PathBuf::from("/nonexistent/moon3/sd.img"),
    ));
    let mut host = MockHost::with_drives(registry);

    let err = build(&mut host, PlatformConfig::default()).expect_err("build should fail");

    match err {
        TopologyError::StorageBinding { device, source } => {
            assert_eq!(device, "sd0-0");
            assert!(matches!(source, HostError::DeviceUnreadable { .. }));
        }
        other => panic!("expected StorageBinding, got {:?}", other),
    }
    assert!(host.loads().is_empty());
    assert!(!host.events().contains(&HostEvent::KernelLoaded));
}

/// Boot images are forwarded to the loader untouched
#[test]
fn test_boot_images_forwarded() {
    let images = BootImages {
        kernel: Some(PathBuf::from("zImage")),
        initrd: Some(PathBuf::from("initrd.gz")),
        cmdline: Some("console=ttySA0 root=/dev/mmcblk0p1".into()),
    };
    let mut host = MockHost::new();

    let topology = build(&mut host, PlatformConfig::default().with_images(images.clone()))
        .expect("Failed to build topology");

    assert_eq!(topology.boot_parameters().images, images);
    assert_eq!(host.loads()[0].1.images, images);
}

/// The SA-1100 variant builds the same board
#[test]
fn test_sa1100_variant() {
    let mut host = MockHost::new();

    let topology = build(&mut host, PlatformConfig::default().with_processor_type("sa1100"))
        .expect("Failed to build topology");

    assert_eq!(topology.soc().variant(), "sa1100");
    assert!(host.events().contains(&HostEvent::SocCreated("sa1100".into())));
    assert_eq!(host.peripherals_of_kind(CARD_TYPE).count(), 1);
}
