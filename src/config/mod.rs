//! Command line configuration of the benchmark binaries.

pub mod set;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(target_os = "linux")]
    #[error("jemalloc stats unavailable: {0}")]
    Jemalloc(#[from] tikv_jemalloc_ctl::Error),
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        /// Reads jemalloc's `stats.allocated`.
        pub struct MemSampler {
            epoch_mib: tikv_jemalloc_ctl::epoch_mib,
            allocated_mib: tikv_jemalloc_ctl::stats::allocated_mib,
        }

        impl MemSampler {
            pub fn new() -> Result<Self, ConfigError> {
                Ok(MemSampler {
                    epoch_mib: tikv_jemalloc_ctl::epoch::mib()?,
                    allocated_mib: tikv_jemalloc_ctl::stats::allocated::mib()?,
                })
            }

            /// Bytes currently allocated by the process.
            pub fn sample(&self) -> Result<usize, ConfigError> {
                self.epoch_mib.advance()?;
                Ok(self.allocated_mib.read()?)
            }
        }
    } else {
        pub struct MemSampler {}

        impl MemSampler {
            pub fn new() -> Result<Self, ConfigError> {
                tracing::warn!("memory usage benchmark is supported only for linux");
                Ok(MemSampler {})
            }

            pub fn sample(&self) -> Result<usize, ConfigError> {
                Ok(0)
            }
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::MemSampler;

    #[test]
    fn samples_allocated_bytes() {
        // Test binaries keep the system allocator, so only check that the
        // controls answer.
        let sampler = MemSampler::new().unwrap();
        assert!(sampler.sample().is_ok());
    }
}
