//! DIR-16-8-8 ("DXR"): three-stride direct-index LPM table.
//!
//! Like DIR-24-8 but with strides at /16, /24 and /32, trading one more
//! dependent load on long-prefix lookups for a much smaller resident
//! footprint: the always-allocated level is 2^16 cells instead of 2^24,
//! and deeper levels exist only where prefixes of that length range live.

use crate::key_pool::KeyId;
use crate::prefix::{Prefix, PrefixRecord};
use crate::Cell;

/// Number of cells (and sub-table slots) at the /16 level.
pub const L1_SIZE: usize = 1 << 16;

/// Stride width of the /24 and /32 levels.
pub const STRIDE: usize = 256;

type LeafTable = [Cell; STRIDE];
type MidTable = [Option<Box<LeafTable>>; STRIDE];

/// Static DIR-16-8-8 direct-index table.
pub struct Dxr {
    l1: Vec<Cell>,
    l2: Vec<Option<Box<LeafTable>>>,
    l3: Vec<Option<Box<MidTable>>>,
    counts: [u64; 3],
    l2_tables: usize,
    l3_mids: usize,
    l3_leaves: usize,
}

impl Default for Dxr {
    fn default() -> Self {
        Self::new()
    }
}

impl Dxr {
    /// Allocate the empty table.
    pub fn new() -> Self {
        let mut l2 = Vec::new();
        l2.resize_with(L1_SIZE, || None);
        let mut l3 = Vec::new();
        l3.resize_with(L1_SIZE, || None);
        Dxr {
            l1: vec![Cell::EMPTY; L1_SIZE],
            l2,
            l3,
            counts: [0; 3],
            l2_tables: 0,
            l3_mids: 0,
            l3_leaves: 0,
        }
    }

    /// Build from a batch of records sorted by descending prefix length
    /// (the same write-if-empty contract as [`crate::dir24_8::Dir24_8::build`]).
    pub fn build(records: &[PrefixRecord]) -> Self {
        let mut table = Self::new();
        for rec in records {
            table.insert_record(rec.prefix, rec.key);
        }
        table
    }

    fn insert_record(&mut self, prefix: Prefix, key: KeyId) {
        let net = prefix.net();
        let len = prefix.len();
        let cell = Cell::new(key, len);

        if len <= 16 {
            let start = (net >> 16) as usize;
            let count = 1usize << (16 - len);
            for slot in &mut self.l1[start..start + count] {
                if slot.is_empty() {
                    *slot = cell;
                    self.counts[0] += 1;
                }
            }
        } else if len <= 24 {
            let top = (net >> 16) as usize;
            let mid_start = ((net >> 8) & 0xFF) as usize;
            let count = 1usize << (24 - len);
            if self.l2[top].is_none() {
                self.l2[top] = Some(Box::new([Cell::EMPTY; STRIDE]));
                self.l2_tables += 1;
            }
            let table = self.l2[top].as_mut().unwrap();
            for slot in &mut table[mid_start..mid_start + count] {
                if slot.is_empty() {
                    *slot = cell;
                    self.counts[1] += 1;
                }
            }
        } else {
            let top = (net >> 16) as usize;
            let mid = ((net >> 8) & 0xFF) as usize;
            let low_start = (net & 0xFF) as usize;
            let count = 1usize << (32 - len);
            if self.l3[top].is_none() {
                self.l3[top] = Some(Box::new(std::array::from_fn(|_| None)));
                self.l3_mids += 1;
            }
            let mids = self.l3[top].as_mut().unwrap();
            if mids[mid].is_none() {
                mids[mid] = Some(Box::new([Cell::EMPTY; STRIDE]));
                self.l3_leaves += 1;
            }
            let leaf = mids[mid].as_mut().unwrap();
            for slot in &mut leaf[low_start..low_start + count] {
                if slot.is_empty() {
                    *slot = cell;
                    self.counts[2] += 1;
                }
            }
        }
    }

    /// Longest-prefix match, most specific level first.
    #[inline]
    pub fn lookup(&self, ip: u32) -> Option<KeyId> {
        let top = (ip >> 16) as usize;
        let mid = ((ip >> 8) & 0xFF) as usize;
        let low = (ip & 0xFF) as usize;

        if let Some(mids) = &self.l3[top] {
            if let Some(leaf) = &mids[mid] {
                let cell = leaf[low];
                if !cell.is_empty() {
                    return cell.get();
                }
            }
        }
        if let Some(l2) = &self.l2[top] {
            let cell = l2[mid];
            if !cell.is_empty() {
                return cell.get();
            }
        }
        self.l1[top].get()
    }

    pub(crate) fn l3_cell(&self, top: usize, mid: usize, low: usize) -> Cell {
        match &self.l3[top] {
            Some(mids) => match &mids[mid] {
                Some(leaf) => leaf[low],
                None => Cell::EMPTY,
            },
            None => Cell::EMPTY,
        }
    }

    pub(crate) fn l2_cell(&self, top: usize, mid: usize) -> Cell {
        match &self.l2[top] {
            Some(table) => table[mid],
            None => Cell::EMPTY,
        }
    }

    pub(crate) fn l1_cell(&self, top: usize) -> Cell {
        self.l1[top]
    }

    /// Visit every populated coordinate, level by level (used to seed the
    /// Bloom overlay after a build).
    pub(crate) fn for_each_populated(
        &self,
        mut on_l1: impl FnMut(u32),
        mut on_l2: impl FnMut(u32, u32),
        mut on_l3: impl FnMut(u32, u32, u32),
    ) {
        for top in 0..L1_SIZE {
            if !self.l1[top].is_empty() {
                on_l1(top as u32);
            }
            if let Some(l2) = &self.l2[top] {
                for (mid, cell) in l2.iter().enumerate() {
                    if !cell.is_empty() {
                        on_l2(top as u32, mid as u32);
                    }
                }
            }
            if let Some(mids) = &self.l3[top] {
                for (mid, leaf) in mids.iter().enumerate() {
                    if let Some(leaf) = leaf {
                        for (low, cell) in leaf.iter().enumerate() {
                            if !cell.is_empty() {
                                on_l3(top as u32, mid as u32, low as u32);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Distinct populated cells per level `(l1, l2, l3)`.
    pub fn populated_counts(&self) -> (u64, u64, u64) {
        (self.counts[0], self.counts[1], self.counts[2])
    }

    /// Approximate heap usage.
    pub fn memory_usage(&self) -> usize {
        self.l1.capacity() * std::mem::size_of::<Cell>()
            + self.l2.capacity() * std::mem::size_of::<Option<Box<LeafTable>>>()
            + self.l3.capacity() * std::mem::size_of::<Option<Box<MidTable>>>()
            + (self.l2_tables + self.l3_leaves) * std::mem::size_of::<LeafTable>()
            + self.l3_mids * std::mem::size_of::<MidTable>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_pool::KeyPool;

    fn rec(pool: &mut KeyPool, s: &str, fill: u8) -> PrefixRecord {
        PrefixRecord {
            prefix: s.parse().unwrap(),
            key: pool.intern_bytes([fill; 64]),
        }
    }

    fn ip(s: &str) -> u32 {
        crate::prefix::parse_ipv4(s).unwrap()
    }

    #[test]
    fn three_levels_resolve_most_specific_first() {
        let mut pool = KeyPool::new();
        let records = [
            rec(&mut pool, "10.1.2.192/26", 4),
            rec(&mut pool, "10.1.2.0/24", 3),
            rec(&mut pool, "10.1.0.0/16", 2),
            rec(&mut pool, "10.0.0.0/8", 1),
        ];
        let table = Dxr::build(&records);

        assert_eq!(table.lookup(ip("10.1.2.200")), Some(records[0].key));
        assert_eq!(table.lookup(ip("10.1.2.3")), Some(records[1].key));
        assert_eq!(table.lookup(ip("10.1.5.6")), Some(records[2].key));
        assert_eq!(table.lookup(ip("10.2.0.1")), Some(records[3].key));
        assert_eq!(table.lookup(ip("11.0.0.1")), None);
    }

    #[test]
    fn counts_track_populated_cells() {
        let mut pool = KeyPool::new();
        let records = [
            rec(&mut pool, "203.0.113.7/32", 9),
            rec(&mut pool, "192.168.1.0/24", 1),
            rec(&mut pool, "172.16.0.0/12", 2),
        ];
        let table = Dxr::build(&records);

        // /12 fills 2^4 /16 cells; /24 one L2 cell; /32 one L3 cell.
        assert_eq!(table.populated_counts(), (16, 1, 1));

        let mut seen = (0u64, 0u64, 0u64);
        table.for_each_populated(
            |_| seen.0 += 1,
            |_, _| seen.1 += 1,
            |_, _, _| seen.2 += 1,
        );
        assert_eq!(seen, table.populated_counts());
    }

    #[test]
    fn empty_l2_cell_falls_through_to_l1() {
        let mut pool = KeyPool::new();
        let records = [
            rec(&mut pool, "10.1.2.0/24", 2),
            rec(&mut pool, "10.1.0.0/16", 1),
        ];
        let table = Dxr::build(&records);

        // Same /16, different /24: the L2 table exists but that mid cell
        // is empty, so the L1 fallback answers.
        assert_eq!(table.lookup(ip("10.1.3.9")), Some(records[1].key));
    }

    #[test]
    fn default_route_alone() {
        let mut pool = KeyPool::new();
        let records = [rec(&mut pool, "0.0.0.0/0", 0xD)];
        let table = Dxr::build(&records);

        assert_eq!(table.lookup(ip("8.8.8.8")), Some(records[0].key));
        assert_eq!(table.lookup(ip("255.255.255.255")), Some(records[0].key));
        assert_eq!(table.populated_counts(), (1 << 16, 0, 0));
    }
}
