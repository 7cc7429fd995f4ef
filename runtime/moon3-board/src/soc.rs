//! SoC Instantiator
//!
//! Creates the single SA-11x0 processor-and-peripheral package. The SoC's
//! clocks, DMA controller and UARTs are internal to the host and never seen
//! here; only the processor handle and the SSP bus come back.

use crate::host::{BusHandle, ProcessorHandle, SocFactory};
use crate::platform::PlatformDescriptor;
use crate::Result;

/// The processor-and-peripheral package of the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocInstance {
    variant: String,
    processor: ProcessorHandle,
    serial_bus: BusHandle,
}

impl SocInstance {
    /// Create the SoC for `processor_type`
    ///
    /// # Errors
    /// Unknown processor types are rejected by the factory; the error is
    /// propagated unchanged.
    pub fn create<F>(factory: &mut F, platform: &PlatformDescriptor, processor_type: &str) -> Result<Self>
    where
        F: SocFactory + ?Sized,
    {
        let parts = factory.create_soc(processor_type, platform.ignore_memory_transaction_failures)?;
        log::info!("created {} SoC (processor {:?})", processor_type, parts.processor);

        Ok(Self {
            variant: processor_type.into(),
            processor: parts.processor,
            serial_bus: parts.serial_bus,
        })
    }

    /// Processor variant this SoC was built for
    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn processor(&self) -> ProcessorHandle {
        self.processor
    }

    /// SSP serial peripheral bus
    pub fn serial_bus(&self) -> BusHandle {
        self.serial_bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHost;
    use crate::platform::MOON3;
    use crate::{HostError, TopologyError};

    #[test]
    fn test_create_sa1110() {
        let mut host = MockHost::new();

        let soc = SocInstance::create(&mut host, &MOON3, "sa1110").unwrap();

        assert_eq!(soc.variant(), "sa1110");
        assert_eq!(host.soc_count(), 1);
        assert!(host.is_bus(soc.serial_bus()));
        assert!(host.ignores_memory_transaction_failures());
    }

    #[test]
    fn test_unknown_processor_type() {
        let mut host = MockHost::new();

        let result = SocInstance::create(&mut host, &MOON3, "cortex-a9");

        assert!(matches!(
            result,
            Err(TopologyError::Host(HostError::UnknownProcessorType { ref name })) if name == "cortex-a9"
        ));
        assert_eq!(host.soc_count(), 0);
    }
}
