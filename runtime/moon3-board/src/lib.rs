//! moon3 Board - Static hardware topology composer for the moon3 (SA-1110) board
//!
//! # Purpose
//! Builds the one-time physical layout of the moon3 machine: the SA-1110
//! processor-and-peripheral package, SDRAM, two CFI flash banks and an SD card
//! on the SSP serial bus. The assembled topology and the boot parameters are
//! then handed to the kernel loader.
//!
//! # Integration Points
//! - Depends on: a host runtime implementing the collaborator traits in [`host`]
//! - Provides to: the emulator entry point (see `moon3-compose`)
//! - Runs: exactly once, synchronously, before any simulated execution
//!
//! # Architecture
//! [`TopologyBuilder`] walks a fixed list of [`BuildStep`]s over a build context.
//! Each step consumes what its predecessors produced, so running a step early is
//! reported as [`TopologyError::StepOutOfOrder`] instead of misbehaving.
//! Unrecoverable misconfiguration is returned as a [`TopologyError`]; the
//! process entry point decides to exit.
//!
//! # Testing Strategy
//! - Unit tests: per-module, against the recording host in [`mock`]
//! - Integration tests: full build scenarios in `tests/integration_test.rs`

pub mod address_space;
pub mod boot;
pub mod builder;
pub mod config;
pub mod host;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod platform;
pub mod soc;
pub mod storage;

pub use address_space::{AddressSpaceComposer, FlashBank, FlashBinding, MappedRegion, RegionFlags, RegionSpec};
pub use boot::{handoff, BootImages, BootParameters};
pub use builder::{build, BuildStep, MachineTopology, TopologyBuilder, BUILD_ORDER};
pub use config::{parse_size, DriveRegistry, DriveSpec, PlatformConfig};
pub use host::{
    BackingDevice, BlockDeviceResolver, BusHandle, DriveKind, HostRuntime, KernelLoader, MemoryRegistrar,
    PeripheralFactory, PeripheralHandle, ProcessorHandle, SocFactory, SocParts,
};
pub use platform::{format_size, FlashGeometry, PlatformDescriptor, MOON3};
pub use soc::SocInstance;
pub use storage::{attach_removable_storage, StoragePeripheral};

use thiserror::Error;

/// Failures reported by host runtime collaborators
#[derive(Debug, Error)]
pub enum HostError {
    #[error("unknown processor type '{name}'")]
    UnknownProcessorType { name: String },

    #[error("unknown peripheral type '{kind}'")]
    UnknownPeripheral { kind: String },

    #[error("peripheral {handle:?} has no child bus named '{name}'")]
    NoSuchChildBus { handle: PeripheralHandle, name: String },

    #[error("peripheral {handle:?} has no property named '{name}'")]
    UnknownProperty { handle: PeripheralHandle, name: String },

    #[error("invalid handle {0}")]
    InvalidHandle(u32),

    #[error("peripheral {handle:?} is already realized")]
    AlreadyRealized { handle: PeripheralHandle },

    #[error("drive '{device}' is already in use")]
    DeviceInUse { device: String },

    #[error("could not open drive '{device}'")]
    DeviceUnreadable {
        device: String,
        #[source]
        source: std::io::Error,
    },
}

/// Error types for topology construction
///
/// Every variant is fatal: the board has exactly one valid configuration and
/// partial bring-up is not supported.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Invalid RAM size, should be {}", format_size(*.required))]
    RamSizeMismatch { required: u64, requested: u64 },

    #[error("failed to bind drive '{device}' to the SD card")]
    StorageBinding {
        device: String,
        #[source]
        source: HostError,
    },

    #[error("build step {step:?} ran before {missing} was available")]
    StepOutOfOrder { step: BuildStep, missing: &'static str },

    #[error("build step {step:?} already ran")]
    StepRepeated { step: BuildStep },

    #[error("build step {step:?} refused: build aborted after {failed:?} failed")]
    BuildAborted { step: BuildStep, failed: BuildStep },

    #[error(transparent)]
    Host(#[from] HostError),
}

impl TopologyError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}

pub type Result<T> = core::result::Result<T, TopologyError>;
