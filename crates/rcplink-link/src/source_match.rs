//! Software source-address match tables.
//!
//! Emulates radio hardware address filtering for RCPs that lack it: bounded
//! per-interface-instance tables of short and extended addresses, keyed by a
//! checksum folded with the instance's PAN id. Collaborator surface only —
//! nothing in the link layer consults these tables.

use tracing::debug;

/// Errors returned by source-match table operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SourceMatchError {
    /// The instance's table is full.
    #[error("source match table full")]
    NoBufs,

    /// The address has no entry in the instance's table.
    #[error("address not found")]
    NotFound,

    /// The instance id is outside the configured range.
    #[error("invalid interface instance {0}")]
    InvalidInstance(u8),
}

pub type Result<T> = std::result::Result<T, SourceMatchError>;

/// An IEEE-style 8-byte extended address.
pub type ExtAddress = [u8; 8];

/// Default number of interface instances.
pub const DEFAULT_INSTANCES: usize = 4;
/// Default short-address entries per instance.
pub const DEFAULT_SHORT_ENTRIES: usize = 16;
/// Default extended-address entries per instance.
pub const DEFAULT_EXT_ENTRIES: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    checksum: u16,
    allocated: bool,
}

#[derive(Debug, Clone)]
struct InstanceTable {
    pan_id: u16,
    short: Vec<Entry>,
    ext: Vec<Entry>,
}

/// Bounded source-match tables, one per interface instance.
#[derive(Debug, Clone)]
pub struct SourceMatchTable {
    instances: Vec<InstanceTable>,
}

impl SourceMatchTable {
    /// Create tables with default dimensions.
    pub fn new() -> Self {
        Self::with_dimensions(DEFAULT_INSTANCES, DEFAULT_SHORT_ENTRIES, DEFAULT_EXT_ENTRIES)
    }

    /// Create tables for `instances` interface instances with the given
    /// per-instance capacities.
    pub fn with_dimensions(instances: usize, short_entries: usize, ext_entries: usize) -> Self {
        Self {
            instances: (0..instances)
                .map(|_| InstanceTable {
                    pan_id: 0,
                    short: vec![Entry::default(); short_entries],
                    ext: vec![Entry::default(); ext_entries],
                })
                .collect(),
        }
    }

    /// Set the PAN id folded into this instance's checksums.
    pub fn set_pan_id(&mut self, instance: u8, pan_id: u16) -> Result<()> {
        self.instance_mut(instance)?.pan_id = pan_id;
        Ok(())
    }

    /// Add a short address entry. Returns `NoBufs` when the table is full.
    pub fn add_short_entry(&mut self, instance: u8, short_address: u16) -> Result<()> {
        let table = self.instance_mut(instance)?;
        let checksum = short_address.wrapping_add(table.pan_id);

        let slot = table
            .short
            .iter_mut()
            .find(|entry| !entry.allocated)
            .ok_or(SourceMatchError::NoBufs)?;
        slot.checksum = checksum;
        slot.allocated = true;
        debug!(instance, short_address, "short source match entry added");
        Ok(())
    }

    /// Clear a short address entry. Returns `NotFound` on a lookup miss.
    pub fn clear_short_entry(&mut self, instance: u8, short_address: u16) -> Result<()> {
        let table = self.instance_mut(instance)?;
        let checksum = short_address.wrapping_add(table.pan_id);

        let slot = table
            .short
            .iter_mut()
            .find(|entry| entry.allocated && entry.checksum == checksum)
            .ok_or(SourceMatchError::NotFound)?;
        *slot = Entry::default();
        debug!(instance, short_address, "short source match entry cleared");
        Ok(())
    }

    /// Clear every short address entry for one instance.
    pub fn clear_short_entries(&mut self, instance: u8) -> Result<()> {
        let table = self.instance_mut(instance)?;
        table.short.fill(Entry::default());
        debug!(instance, "short source match entries cleared");
        Ok(())
    }

    /// Add an extended address entry. Returns `NoBufs` when the table is
    /// full.
    pub fn add_ext_entry(&mut self, instance: u8, ext_address: &ExtAddress) -> Result<()> {
        let table = self.instance_mut(instance)?;
        let checksum = ext_checksum(table.pan_id, ext_address);

        let slot = table
            .ext
            .iter_mut()
            .find(|entry| !entry.allocated)
            .ok_or(SourceMatchError::NoBufs)?;
        slot.checksum = checksum;
        slot.allocated = true;
        debug!(instance, ?ext_address, "extended source match entry added");
        Ok(())
    }

    /// Clear an extended address entry. Returns `NotFound` on a lookup miss.
    pub fn clear_ext_entry(&mut self, instance: u8, ext_address: &ExtAddress) -> Result<()> {
        let table = self.instance_mut(instance)?;
        let checksum = ext_checksum(table.pan_id, ext_address);

        let slot = table
            .ext
            .iter_mut()
            .find(|entry| entry.allocated && entry.checksum == checksum)
            .ok_or(SourceMatchError::NotFound)?;
        *slot = Entry::default();
        debug!(instance, ?ext_address, "extended source match entry cleared");
        Ok(())
    }

    /// Clear every extended address entry for one instance.
    pub fn clear_ext_entries(&mut self, instance: u8) -> Result<()> {
        let table = self.instance_mut(instance)?;
        table.ext.fill(Entry::default());
        debug!(instance, "extended source match entries cleared");
        Ok(())
    }

    /// Whether a short address currently matches for the instance.
    pub fn has_short_entry(&self, instance: u8, short_address: u16) -> Result<bool> {
        let table = self.instance(instance)?;
        let checksum = short_address.wrapping_add(table.pan_id);
        Ok(table
            .short
            .iter()
            .any(|entry| entry.allocated && entry.checksum == checksum))
    }

    /// Whether an extended address currently matches for the instance.
    pub fn has_ext_entry(&self, instance: u8, ext_address: &ExtAddress) -> Result<bool> {
        let table = self.instance(instance)?;
        let checksum = ext_checksum(table.pan_id, ext_address);
        Ok(table
            .ext
            .iter()
            .any(|entry| entry.allocated && entry.checksum == checksum))
    }

    fn instance(&self, instance: u8) -> Result<&InstanceTable> {
        self.instances
            .get(instance as usize)
            .ok_or(SourceMatchError::InvalidInstance(instance))
    }

    fn instance_mut(&mut self, instance: u8) -> Result<&mut InstanceTable> {
        self.instances
            .get_mut(instance as usize)
            .ok_or(SourceMatchError::InvalidInstance(instance))
    }
}

impl Default for SourceMatchTable {
    fn default() -> Self {
        Self::new()
    }
}

fn ext_checksum(pan_id: u16, ext_address: &ExtAddress) -> u16 {
    ext_address
        .chunks_exact(2)
        .fold(pan_id, |sum, pair| {
            sum.wrapping_add(u16::from_le_bytes([pair[0], pair[1]]))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_find_short_entry() {
        let mut table = SourceMatchTable::new();
        table.set_pan_id(0, 0x1234).unwrap();
        table.add_short_entry(0, 0xBEEF).unwrap();

        assert!(table.has_short_entry(0, 0xBEEF).unwrap());
        assert!(!table.has_short_entry(0, 0xDEAD).unwrap());
    }

    #[test]
    fn clear_short_entry_then_miss() {
        let mut table = SourceMatchTable::new();
        table.add_short_entry(0, 0x0001).unwrap();
        table.clear_short_entry(0, 0x0001).unwrap();

        assert_eq!(
            table.clear_short_entry(0, 0x0001),
            Err(SourceMatchError::NotFound)
        );
        assert!(!table.has_short_entry(0, 0x0001).unwrap());
    }

    #[test]
    fn short_table_capacity_is_bounded() {
        let mut table = SourceMatchTable::with_dimensions(1, 2, 2);
        table.add_short_entry(0, 1).unwrap();
        table.add_short_entry(0, 2).unwrap();
        assert_eq!(table.add_short_entry(0, 3), Err(SourceMatchError::NoBufs));

        // Clearing frees a slot for reuse.
        table.clear_short_entry(0, 1).unwrap();
        table.add_short_entry(0, 3).unwrap();
    }

    #[test]
    fn instances_are_isolated() {
        let mut table = SourceMatchTable::new();
        table.add_short_entry(0, 0x00AA).unwrap();

        assert!(table.has_short_entry(0, 0x00AA).unwrap());
        assert!(!table.has_short_entry(1, 0x00AA).unwrap());

        table.clear_short_entries(0).unwrap();
        assert!(!table.has_short_entry(0, 0x00AA).unwrap());
    }

    #[test]
    fn ext_entry_roundtrip() {
        let addr: ExtAddress = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut table = SourceMatchTable::new();
        table.set_pan_id(0, 0xFACE).unwrap();

        table.add_ext_entry(0, &addr).unwrap();
        assert!(table.has_ext_entry(0, &addr).unwrap());

        table.clear_ext_entry(0, &addr).unwrap();
        assert_eq!(
            table.clear_ext_entry(0, &addr),
            Err(SourceMatchError::NotFound)
        );
    }

    #[test]
    fn ext_table_capacity_is_bounded() {
        let mut table = SourceMatchTable::with_dimensions(1, 1, 1);
        table.add_ext_entry(0, &[0; 8]).unwrap();
        assert_eq!(
            table.add_ext_entry(0, &[1; 8]),
            Err(SourceMatchError::NoBufs)
        );
    }

    #[test]
    fn clear_all_ext_entries() {
        let mut table = SourceMatchTable::new();
        table.add_ext_entry(0, &[1; 8]).unwrap();
        table.add_ext_entry(0, &[2; 8]).unwrap();

        table.clear_ext_entries(0).unwrap();
        assert!(!table.has_ext_entry(0, &[1; 8]).unwrap());
        assert!(!table.has_ext_entry(0, &[2; 8]).unwrap());
    }

    #[test]
    fn out_of_range_instance_is_rejected() {
        let mut table = SourceMatchTable::with_dimensions(2, 4, 4);
        assert_eq!(
            table.add_short_entry(5, 1),
            Err(SourceMatchError::InvalidInstance(5))
        );
        assert_eq!(
            table.set_pan_id(9, 0),
            Err(SourceMatchError::InvalidInstance(9))
        );
    }

    #[test]
    fn pan_id_participates_in_lookup() {
        let mut table = SourceMatchTable::new();
        table.set_pan_id(0, 0x0001).unwrap();
        table.add_short_entry(0, 0x0010).unwrap();

        // Changing the PAN id invalidates prior checksums.
        table.set_pan_id(0, 0x0002).unwrap();
        assert!(!table.has_short_entry(0, 0x0010).unwrap());
    }
}
