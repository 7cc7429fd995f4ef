//! Platform configuration and drive registry
//!
//! [`PlatformConfig`] is what the operator asked for. [`DriveRegistry`] is the
//! storage configuration: drives keyed by (kind, bus, unit), served to the
//! builder through [`BlockDeviceResolver`].

use std::fmt;
use std::path::PathBuf;

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

use crate::boot::BootImages;
use crate::host::{BackingDevice, BlockDeviceResolver, DriveKind};
use crate::platform::MOON3;

/// Requested machine configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfig {
    /// RAM size in bytes; must match the platform exactly
    #[serde(rename = "ram", default = "default_ram_size", deserialize_with = "deserialize_size")]
    pub requested_ram_size: u64,

    /// Processor variant
    #[serde(rename = "cpu", default = "default_processor_type")]
    pub processor_type: String,

    #[serde(rename = "boot", default)]
    pub images: BootImages,
}

fn default_ram_size() -> u64 {
    MOON3.required_ram_size
}

fn default_processor_type() -> String {
    MOON3.default_processor_type.into()
}

impl PlatformConfig {
    /// Configuration with the platform's default processor and no boot images
    pub fn new(requested_ram_size: u64) -> Self {
        Self {
            requested_ram_size,
            processor_type: default_processor_type(),
            images: BootImages::default(),
        }
    }

    pub fn with_processor_type(mut self, processor_type: impl Into<String>) -> Self {
        self.processor_type = processor_type.into();
        self
    }

    pub fn with_images(mut self, images: BootImages) -> Self {
        self.images = images;
        self
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::new(default_ram_size())
    }
}

/// One configured drive
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriveSpec {
    #[serde(rename = "if")]
    pub kind: DriveKind,

    #[serde(default)]
    pub bus: u32,

    #[serde(default)]
    pub unit: u32,

    /// Host image file
    pub file: PathBuf,

    #[serde(default)]
    pub read_only: bool,
}

impl DriveSpec {
    pub fn new(kind: DriveKind, bus: u32, unit: u32, file: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            bus,
            unit,
            file: file.into(),
            read_only: false,
        }
    }

    /// Drive id, e.g. `pflash0-1` for pflash bus 0 unit 1
    pub fn id(&self) -> String {
        format!("{}{}-{}", self.kind, self.bus, self.unit)
    }
}

/// Drives configured by the operator
#[derive(Debug, Clone, Default)]
pub struct DriveRegistry {
    drives: Vec<DriveSpec>,
}

impl DriveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a drive; a later drive at the same (kind, bus, unit) replaces the earlier one
    pub fn add(&mut self, spec: DriveSpec) {
        self.drives
            .retain(|d| !(d.kind == spec.kind && d.bus == spec.bus && d.unit == spec.unit));
        self.drives.push(spec);
    }

    pub fn with(mut self, spec: DriveSpec) -> Self {
        self.add(spec);
        self
    }

    pub fn len(&self) -> usize {
        self.drives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drives.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DriveSpec> {
        self.drives.iter()
    }
}

impl FromIterator<DriveSpec> for DriveRegistry {
    fn from_iter<I: IntoIterator<Item = DriveSpec>>(iter: I) -> Self {
        let mut registry = Self::new();
        for spec in iter {
            registry.add(spec);
        }
        registry
    }
}

impl BlockDeviceResolver for DriveRegistry {
    fn resolve(&self, kind: DriveKind, bus: u32, unit: u32) -> Option<BackingDevice> {
        self.drives
            .iter()
            .find(|d| d.kind == kind && d.bus == bus && d.unit == unit)
            .map(|d| BackingDevice {
                id: d.id(),
                file: d.file.clone(),
                read_only: d.read_only,
            })
    }
}

/// Parse a size such as `512M`, `512 MiB`, `64k`, `0x20000000` or `1048576`
///
/// Suffixes are binary (`K` = 1024). A bare number is a byte count.
pub fn parse_size(input: &str) -> Option<u64> {
    let s = input.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }

    let digits_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (number, suffix) = s.split_at(digits_end);
    let value: u64 = number.parse().ok()?;

    let shift = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 0,
        "k" | "kb" | "kib" => 10,
        "m" | "mb" | "mib" => 20,
        "g" | "gb" | "gib" => 30,
        "t" | "tb" | "tib" => 40,
        _ => return None,
    };

    value.checked_mul(1u64 << shift)
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct SizeVisitor;

    impl Visitor<'_> for SizeVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a byte count or a size string such as \"512M\"")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(|_| E::custom("size must not be negative"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            parse_size(v).ok_or_else(|| E::custom(format!("invalid size '{}'", v)))
        }
    }

    deserializer.deserialize_any(SizeVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{KIB, MIB};

    #[test]
    fn test_parse_size_suffixes() {
        assert_eq!(parse_size("512M"), Some(512 * MIB));
        assert_eq!(parse_size("512 MiB"), Some(512 * MIB));
        assert_eq!(parse_size("64k"), Some(64 * KIB));
        assert_eq!(parse_size("1G"), Some(1024 * MIB));
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("0x20000000"), Some(512 * MIB));
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("M"), None);
        assert_eq!(parse_size("12 parsecs"), None);
        assert_eq!(parse_size("0xZZ"), None);
        assert_eq!(parse_size("99999999999T"), None);
    }

    #[test]
    fn test_default_config() {
        let config = PlatformConfig::default();
        assert_eq!(config.requested_ram_size, 512 * MIB);
        assert_eq!(config.processor_type, "sa1110");
        assert_eq!(config.images, BootImages::default());
    }

    #[test]
    fn test_registry_resolves_by_kind_bus_unit() {
        let registry = DriveRegistry::new()
            .with(DriveSpec::new(DriveKind::Pflash, 0, 1, "flash1.img"))
            .with(DriveSpec::new(DriveKind::Sd, 0, 0, "card.img"));

        let flash = registry.resolve(DriveKind::Pflash, 0, 1).unwrap();
        assert_eq!(flash.id, "pflash0-1");
        assert_eq!(flash.file, PathBuf::from("flash1.img"));

        assert_eq!(registry.resolve(DriveKind::Sd, 0, 0).unwrap().id, "sd0-0");
        assert!(registry.resolve(DriveKind::Pflash, 0, 0).is_none());
        assert!(registry.resolve(DriveKind::Sd, 1, 0).is_none());
    }

    #[test]
    fn test_registry_replaces_same_slot() {
        let registry: DriveRegistry = vec![
            DriveSpec::new(DriveKind::Sd, 0, 0, "old.img"),
            DriveSpec::new(DriveKind::Sd, 0, 0, "new.img"),
        ]
        .into_iter()
        .collect();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve(DriveKind::Sd, 0, 0).unwrap().file, PathBuf::from("new.img"));
    }
}
