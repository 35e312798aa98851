//! Mount configuration.

use serde::{Deserialize, Serialize};

use super::MountError;
use crate::disc::BURST_SIZE;

/// Device name used when none is configured; paths look like `fst:/0/...`.
pub const DEFAULT_DEVICE_NAME: &str = "fst";

/// Default size of the region the scratch read buffer is carved from.
pub const DEFAULT_SCRATCH_BUDGET: usize = 0x10000;

/// Options controlling how a disc is mounted.
///
/// Deserializable so it can sit in a `[mount]` table of a TOML config file;
/// every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MountOptions {
    /// Name the filesystem is registered under.
    pub device_name: String,

    /// Bytes available for the scratch read buffer. Must hold one burst
    /// read (0x8000 bytes).
    pub scratch_budget: usize,

    /// Whether each partition gets an `N_metadata` directory.
    pub expose_metadata: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            scratch_budget: DEFAULT_SCRATCH_BUDGET,
            expose_metadata: true,
        }
    }
}

impl MountOptions {
    #[must_use]
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    #[must_use]
    pub fn with_scratch_budget(mut self, budget: usize) -> Self {
        self.scratch_budget = budget;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, expose: bool) -> Self {
        self.expose_metadata = expose;
        self
    }

    /// Check the device name and the scratch budget.
    pub fn validate(&self) -> Result<(), MountError> {
        let name = &self.device_name;
        if name.is_empty() || name.contains([':', '/']) {
            return Err(MountError::InvalidDeviceName(name.clone()));
        }
        if self.scratch_budget < BURST_SIZE {
            return Err(MountError::ScratchTooSmall {
                budget: self.scratch_budget,
                needed: BURST_SIZE,
            });
        }
        Ok(())
    }
}
