//! Last-spike detection
//!
//! Finds the most recent contiguous run of samples above entitlement by
//! scanning a time-ordered series from its end.

use crate::models::{InstanceData, Spike};

/// Usage ratio at which an instance uses exactly its entitlement
pub const ENTITLEMENT_THRESHOLD: f64 = 1.0;

/// Detects the latest window spent over a usage threshold
#[derive(Debug, Clone, Copy)]
pub struct SpikeDetector {
    /// Samples strictly above this ratio are spiking
    pub threshold: f64,
}

impl SpikeDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Detect the most recent spike in `data`, which must be ordered by time.
    ///
    /// # Returns
    /// * `Some(Spike)` spanning the first and last sample of the latest run
    /// * `None` if no sample exceeds the threshold
    pub fn detect(&self, data: &[InstanceData]) -> Option<Spike> {
        let mut spike: Option<Spike> = None;

        for sample in data.iter().rev() {
            if sample.value > self.threshold {
                spike = Some(match spike {
                    Some(spike) => Spike {
                        from: sample.time,
                        to: spike.to,
                    },
                    None => Spike {
                        from: sample.time,
                        to: sample.time,
                    },
                });
            } else if spike.is_some() {
                break;
            }
        }

        spike
    }
}

impl Default for SpikeDetector {
    fn default() -> Self {
        Self::new(ENTITLEMENT_THRESHOLD)
    }
}
