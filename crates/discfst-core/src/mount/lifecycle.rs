//! `mount() -> id` / `unmount() -> bool` on top of [`MountedDisc`].

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::MountError;
use super::device::{DeviceTable, RejectedDevice};
use super::disc::MountedDisc;
use super::options::MountOptions;
use crate::crypto::ClusterCipher;
use crate::disc::{AccessClock, BURST_SIZE, BlockSource};

/// Alignment of the scratch buffer inside its budget.
pub const SCRATCH_ALIGN: usize = 32;

/// Where the scratch read buffer sits in the scratch budget: carved from the
/// top and aligned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchRegion {
    pub offset: usize,
    pub len: usize,
}

impl ScratchRegion {
    /// Reserve `len` bytes at the top of a `budget`-byte region. `align` must
    /// be a power of two.
    pub fn reserve_top(budget: usize, len: usize, align: usize) -> Result<Self, MountError> {
        debug_assert!(align.is_power_of_two());
        let offset = budget
            .checked_sub(len)
            .map(|top| top & !(align - 1))
            .ok_or(MountError::ScratchTooSmall {
                budget,
                needed: len,
            })?;
        Ok(Self { offset, len })
    }

    pub fn allocate(&self) -> Vec<u8> {
        vec![0u8; self.len]
    }
}

/// Owns the mount lifecycle of one device name.
///
/// The scratch region is reserved on the first mount and reused after that.
/// A new mount always unmounts the previous one first.
pub struct DiscMounter {
    options: MountOptions,
    scratch: Option<ScratchRegion>,
    clock: Arc<AccessClock>,
    mounted: Option<String>,
}

impl DiscMounter {
    pub fn new(options: MountOptions) -> Self {
        Self {
            options,
            scratch: None,
            clock: Arc::new(AccessClock::new()),
            mounted: None,
        }
    }

    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    pub fn scratch(&self) -> Option<ScratchRegion> {
        self.scratch
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    /// Time of the last raw block read, if anything is mounted.
    pub fn last_access(&self) -> Option<Instant> {
        self.clock.last()
    }

    /// Mount and register the disc. Returns its 8-byte identifier, or 0 if
    /// the mount failed, in which case nothing is left registered.
    pub fn mount<S, C>(&mut self, devices: &mut DeviceTable, source: S, cipher: C) -> u64
    where
        S: BlockSource + 'static,
        C: ClusterCipher + 'static,
    {
        match self.try_mount(devices, source, cipher) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, device = %self.options.device_name, "Mount failed");
                0
            }
        }
    }

    /// Like [`mount`](Self::mount), with the failure reason.
    pub fn try_mount<S, C>(
        &mut self,
        devices: &mut DeviceTable,
        source: S,
        cipher: C,
    ) -> Result<u64, MountError>
    where
        S: BlockSource + 'static,
        C: ClusterCipher + 'static,
    {
        self.options.validate()?;
        let scratch = match self.scratch {
            Some(scratch) => scratch,
            None => {
                let scratch = ScratchRegion::reserve_top(
                    self.options.scratch_budget,
                    BURST_SIZE,
                    SCRATCH_ALIGN,
                )?;
                self.scratch = Some(scratch);
                scratch
            }
        };

        self.unmount(devices);

        let disc = MountedDisc::mount_with(
            source,
            cipher,
            &self.options,
            scratch.allocate(),
            Arc::clone(&self.clock),
        )?;
        let id = disc.disc_id();

        if let Err(RejectedDevice { error, mut device }) = devices.add_device(Box::new(disc)) {
            device.release();
            return Err(error);
        }
        self.mounted = Some(self.options.device_name.clone());
        info!(
            device = %self.options.device_name,
            disc_id = %hex::encode(id.to_be_bytes()),
            "Registered disc"
        );
        Ok(id)
    }

    /// Deregister and release the mounted disc. Unmounting with nothing
    /// mounted succeeds; this only fails if the device disappeared from the
    /// table behind our back.
    pub fn unmount(&mut self, devices: &mut DeviceTable) -> bool {
        let Some(name) = self.mounted.take() else {
            return true;
        };
        match devices.remove_device(&name) {
            Some(mut device) => {
                device.release();
                true
            }
            None => {
                warn!(device = %name, "Mounted device missing from device table");
                self.clock.reset();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Aes128Cbc;
    use crate::disc::DISC_MAGIC;
    use crate::testing::DiscImageBuilder;

    #[test]
    fn test_reserve_top_aligns_down() {
        let region = ScratchRegion::reserve_top(0x10000, 0x8000, 32).unwrap();
        assert_eq!(region, ScratchRegion { offset: 0x8000, len: 0x8000 });

        let region = ScratchRegion::reserve_top(0x8010, 0x8000, 32).unwrap();
        assert_eq!(region.offset, 0);

        let region = ScratchRegion::reserve_top(0x9031, 0x8000, 32).unwrap();
        assert_eq!(region.offset, 0x1020);
    }

    #[test]
    fn test_reserve_top_too_small() {
        assert!(matches!(
            ScratchRegion::reserve_top(0x7fff, 0x8000, 32),
            Err(MountError::ScratchTooSmall { budget: 0x7fff, needed: 0x8000 })
        ));
    }

    #[test]
    fn test_mount_registers_and_returns_id() {
        let image = DiscImageBuilder::new().build().unwrap();
        let mut devices = DeviceTable::new();
        let mut mounter = DiscMounter::new(MountOptions::default());

        let id = mounter.mount(&mut devices, image.source(), Aes128Cbc::new());
        assert_eq!(&id.to_be_bytes()[..4], b"RFST");
        assert!(devices.contains("fst"));
        assert!(mounter.is_mounted());
        assert!(mounter.last_access().is_some());
        assert_eq!(mounter.scratch().unwrap().len, BURST_SIZE);
    }

    #[test]
    fn test_bad_magic_returns_zero() {
        let image = DiscImageBuilder::new().with_magic([0; 4]).build().unwrap();
        assert_ne!(DISC_MAGIC, [0; 4]);
        let mut devices = DeviceTable::new();
        let mut mounter = DiscMounter::new(MountOptions::default());

        assert_eq!(mounter.mount(&mut devices, image.source(), Aes128Cbc::new()), 0);
        assert!(devices.is_empty());
        assert!(!mounter.is_mounted());
        assert!(mounter.last_access().is_none());
    }

    #[test]
    fn test_small_budget_fails_before_touching_source() {
        let image = DiscImageBuilder::new().build().unwrap();
        let mut devices = DeviceTable::new();
        let options = MountOptions::default().with_scratch_budget(0x4000);
        let mut mounter = DiscMounter::new(options);
        assert!(matches!(
            mounter.try_mount(&mut devices, image.source(), Aes128Cbc::new()),
            Err(MountError::ScratchTooSmall { .. })
        ));
        assert!(mounter.scratch().is_none());
    }

    #[test]
    fn test_remount_replaces_previous() {
        let first = DiscImageBuilder::new().build().unwrap();
        let second = DiscImageBuilder::new()
            .with_game_code(*b"RSEC")
            .build()
            .unwrap();
        let mut devices = DeviceTable::new();
        let mut mounter = DiscMounter::new(MountOptions::default());

        assert_ne!(mounter.mount(&mut devices, first.source(), Aes128Cbc::new()), 0);
        let id = mounter.mount(&mut devices, second.source(), Aes128Cbc::new());
        assert_eq!(&id.to_be_bytes()[..4], b"RSEC");
        assert_eq!(devices.len(), 1);
    }

    #[test]
    fn test_unmount_is_idempotent() {
        let image = DiscImageBuilder::new().build().unwrap();
        let mut devices = DeviceTable::new();
        let mut mounter = DiscMounter::new(MountOptions::default());
        mounter.mount(&mut devices, image.source(), Aes128Cbc::new());

        assert!(mounter.unmount(&mut devices));
        assert!(mounter.unmount(&mut devices));
        assert!(devices.is_empty());
        assert!(mounter.last_access().is_none());
    }

    #[test]
    fn test_name_taken_by_foreign_device() {
        let image = DiscImageBuilder::new().build().unwrap();
        let other = DiscImageBuilder::new().build().unwrap();
        let mut devices = DeviceTable::new();
        let foreign =
            MountedDisc::mount(other.source(), Aes128Cbc::new(), &MountOptions::default())
                .unwrap();
        devices.add_device(Box::new(foreign)).unwrap();

        let mut mounter = DiscMounter::new(MountOptions::default());
        assert!(matches!(
            mounter.try_mount(&mut devices, image.source(), Aes128Cbc::new()),
            Err(MountError::DeviceExists(_))
        ));
        assert!(!mounter.is_mounted());
        assert_eq!(devices.len(), 1);
    }
}
