//! Permission-checked access to simulation memory.
//!
//! Reads are always allowed and run inside an [`InspectionGuard`], which
//! raises the simulation's side-effect suppression flag for the duration
//! of the access and lowers it on drop, including during unwinding.
//! Writes are checked against a [`RegionTable`] before the first byte is
//! touched: a range write either passes for every address or mutates
//! nothing.

use serde::{Deserialize, Serialize};

use tickgate_core::{Address, BridgeError, Feature, Simulation, ADDRESS_SPACE_LEN, MAX_RANGE_LEN};

use crate::config::{validate_regions, ConfigError};

// ── Regions ────────────────────────────────────────────────────

/// A session property a conditional region depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// The loaded session has battery-backed save RAM.
    BatteryBacked,
}

impl Condition {
    fn feature(self) -> Feature {
        match self {
            Condition::BatteryBacked => Feature::BatteryBacked,
        }
    }
}

/// Write permission of a region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Writes are always rejected.
    ReadOnly,
    /// Writes are always allowed.
    ReadWrite,
    /// Writes are allowed while the condition holds for the loaded session.
    Conditional(Condition),
}

/// A contiguous, inclusive address range with a write permission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardedRegion {
    /// Label used in diagnostics.
    pub name: String,
    /// First address.
    pub start: Address,
    /// Last address, inclusive.
    pub end: Address,
    /// What writes to this region require.
    pub permission: Permission,
}

impl GuardedRegion {
    /// Create a region covering `start..=end`.
    pub fn new(name: impl Into<String>, start: Address, end: Address, permission: Permission) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            permission,
        }
    }

    /// Whether `address` falls inside the region.
    pub fn contains(&self, address: Address) -> bool {
        self.start <= address && address <= self.end
    }
}

/// Static map of write permissions, loaded once at startup.
///
/// Addresses not covered by any region are read-only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionTable {
    /// Sorted by `start`, pairwise disjoint.
    regions: Vec<GuardedRegion>,
}

impl RegionTable {
    /// Build a table from disjoint, non-empty regions.
    pub fn new(mut regions: Vec<GuardedRegion>) -> Result<Self, ConfigError> {
        validate_regions(&regions)?;
        regions.sort_by_key(|r| r.start);
        Ok(Self { regions })
    }

    /// The regions, sorted by start address.
    pub fn regions(&self) -> &[GuardedRegion] {
        &self.regions
    }

    /// The region containing `address`, if any.
    pub fn region_at(&self, address: Address) -> Option<&GuardedRegion> {
        let idx = self.regions.partition_point(|r| r.end < address);
        self.regions.get(idx).filter(|r| r.contains(address))
    }

    /// Permission for `address`.
    pub fn permission(&self, address: Address) -> Permission {
        self.region_at(address)
            .map_or(Permission::ReadOnly, |r| r.permission)
    }

    /// Reject writes that no session state could ever allow.
    ///
    /// Used at submission time: read-only addresses fail here, while
    /// conditional ones pass and are re-checked by the executor.
    pub fn check_static(&self, start: Address, len: usize) -> Result<(), BridgeError> {
        self.check(start, len, |_| true)
    }

    /// Full write check against the current session.
    pub fn check_write(
        &self,
        start: Address,
        len: usize,
        satisfied: impl Fn(Condition) -> bool,
    ) -> Result<(), BridgeError> {
        self.check(start, len, satisfied)
    }

    fn check(
        &self,
        start: Address,
        len: usize,
        satisfied: impl Fn(Condition) -> bool,
    ) -> Result<(), BridgeError> {
        check_range(start, len)?;
        for offset in 0..len {
            let address = Address((start.as_usize() + offset) as u16);
            let allowed = match self.permission(address) {
                Permission::ReadOnly => false,
                Permission::ReadWrite => true,
                Permission::Conditional(cond) => satisfied(cond),
            };
            if !allowed {
                return Err(BridgeError::PermissionDenied { address });
            }
        }
        Ok(())
    }
}

/// Validate a byte range: `1..=4096` bytes, all inside the address space.
pub fn check_range(start: Address, len: usize) -> Result<(), BridgeError> {
    if len == 0 {
        return Err(BridgeError::invalid("length must be greater than 0"));
    }
    if len > MAX_RANGE_LEN {
        return Err(BridgeError::invalid(format!(
            "length {len} exceeds maximum of {MAX_RANGE_LEN}"
        )));
    }
    if start.as_usize() + len > ADDRESS_SPACE_LEN {
        return Err(BridgeError::invalid(format!(
            "range {start}+{len} exceeds address space"
        )));
    }
    Ok(())
}

// ── InspectionGuard ────────────────────────────────────────────

/// Holds the simulation's inspection flag raised while alive.
pub struct InspectionGuard<'a, S: Simulation + ?Sized> {
    sim: &'a mut S,
}

impl<'a, S: Simulation + ?Sized> InspectionGuard<'a, S> {
    /// Raise the flag.
    pub fn new(sim: &'a mut S) -> Self {
        sim.set_inspection(true);
        Self { sim }
    }

    /// Read one byte without side effects.
    pub fn peek(&mut self, address: Address) -> u8 {
        self.sim.peek(address)
    }
}

impl<S: Simulation + ?Sized> Drop for InspectionGuard<'_, S> {
    fn drop(&mut self) {
        self.sim.set_inspection(false);
    }
}

// ── GuardedStateAccessor ───────────────────────────────────────

/// Reads and permission-checked writes against a borrowed simulation.
///
/// Constructed by the executor for each memory command; borrows the
/// simulation mutably so no other access can interleave.
pub struct GuardedStateAccessor<'a, S: Simulation + ?Sized> {
    sim: &'a mut S,
    regions: &'a RegionTable,
}

impl<'a, S: Simulation + ?Sized> GuardedStateAccessor<'a, S> {
    /// Wrap `sim` with the given permission table.
    pub fn new(sim: &'a mut S, regions: &'a RegionTable) -> Self {
        Self { sim, regions }
    }

    /// Read one byte.
    pub fn read(&mut self, address: Address) -> u8 {
        InspectionGuard::new(&mut *self.sim).peek(address)
    }

    /// Read `len` bytes starting at `start`.
    pub fn read_range(&mut self, start: Address, len: usize) -> Result<Vec<u8>, BridgeError> {
        check_range(start, len)?;
        let mut guard = InspectionGuard::new(&mut *self.sim);
        Ok((0..len)
            .map(|offset| guard.peek(Address((start.as_usize() + offset) as u16)))
            .collect())
    }

    /// Write one byte if its region allows it.
    pub fn write(&mut self, address: Address, value: u8) -> Result<(), BridgeError> {
        self.write_range(address, &[value]).map(|_| ())
    }

    /// Write `data` starting at `start` if every target address allows
    /// it. Returns the number of bytes written.
    pub fn write_range(&mut self, start: Address, data: &[u8]) -> Result<usize, BridgeError> {
        let sim = &*self.sim;
        self.regions
            .check_write(start, data.len(), |cond| sim.feature_enabled(cond.feature()))?;
        for (offset, &value) in data.iter().enumerate() {
            self.sim
                .poke(Address((start.as_usize() + offset) as u16), value);
        }
        Ok(data.len())
    }
}
