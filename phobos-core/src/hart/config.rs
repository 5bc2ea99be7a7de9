use crate::vector::ELEN;
use crate::xlen::WordWidth;
use crate::SimError;

/// Static configuration of a simulated hart.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    /// Base integer ISA width.
    pub xlen: WordWidth,
    /// Address of the first fetched instruction.
    pub reset_vector: u64,
    /// Physical address of the first byte of RAM.
    pub memory_base: u64,
    /// RAM size in bytes.
    pub memory_size: usize,
    /// Width of a vector register in bits. Must be a power of two of at least 64.
    pub vlen: u32,
    /// Number of ticks [`run_quantum`](crate::Simulator::run_quantum) performs at most.
    pub quantum: u64,
    /// Maximum number of vector elements processed by one invocation of a vector step.
    pub vector_chunk: u64,
    /// Stop after this many retired instructions.
    pub ilimit: Option<u64>,
    /// Stop when a `wfi` retires instead of treating it as a no-op.
    pub stop_on_wfi: bool,
    /// Physical address of the `tohost` word. A store to it stops the simulation with exit code
    /// `value >> 1`.
    pub tohost: Option<u64>,
    /// Set the A and D bits of page table entries on access instead of raising a page fault.
    pub hardware_ad_update: bool,
    pub hart_id: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            xlen: WordWidth::W64,
            reset_vector: 0x8000_0000,
            memory_base: 0x8000_0000,
            memory_size: 16 * 1024 * 1024,
            vlen: 128,
            quantum: 100,
            vector_chunk: 8,
            ilimit: None,
            stop_on_wfi: false,
            tohost: None,
            hardware_ad_update: true,
            hart_id: 0,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), SimError> {
        if !self.vlen.is_power_of_two() || self.vlen < ELEN {
            return Err(SimError::InvalidConfig(format!(
                "vlen must be a power of two of at least {ELEN} bits, got {}",
                self.vlen
            )));
        }
        if self.quantum == 0 {
            return Err(SimError::InvalidConfig("quantum must be nonzero".into()));
        }
        if self.vector_chunk == 0 {
            return Err(SimError::InvalidConfig("vector_chunk must be nonzero".into()));
        }
        if self.memory_size == 0 {
            return Err(SimError::InvalidConfig("memory_size must be nonzero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());
        let config = Config {
            vlen: 96,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(SimError::InvalidConfig(_))));
        let config = Config {
            vlen: 32,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        let config = Config {
            quantum: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        let config = Config {
            vector_chunk: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
