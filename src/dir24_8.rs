//! DIR-24-8: two-stride direct-index LPM table.
//!
//! A flat array of 2^24 cells answers every prefix of length <= 24 in one
//! probe; prefixes of length 25..=32 spill into 256-entry sub-tables
//! allocated on demand under their /24. Lookup is two dependent loads in
//! the worst case, at the price of expanding each prefix over every cell
//! it covers at build time.

use crate::key_pool::KeyId;
use crate::prefix::{Prefix, PrefixRecord};
use crate::Cell;

/// Number of cells in the main (/24) table.
pub const MAIN_TABLE_SIZE: usize = 1 << 24;

/// Number of cells in one on-demand sub-table.
pub const SUB_TABLE_SIZE: usize = 256;

pub(crate) type SubTable = [Cell; SUB_TABLE_SIZE];

/// Static DIR-24-8 direct-index table.
pub struct Dir24_8 {
    main: Vec<Cell>,
    sub: Vec<Option<Box<SubTable>>>,
    sub_tables: usize,
}

impl Default for Dir24_8 {
    fn default() -> Self {
        Self::new()
    }
}

impl Dir24_8 {
    /// Allocate the empty table (the 2^24-cell main array plus the
    /// sub-table slot array; sub-tables themselves come on demand).
    pub fn new() -> Self {
        let mut sub = Vec::new();
        sub.resize_with(MAIN_TABLE_SIZE, || None);
        Dir24_8 {
            main: vec![Cell::EMPTY; MAIN_TABLE_SIZE],
            sub,
            sub_tables: 0,
        }
    }

    /// Build from a batch of records sorted by descending prefix length.
    ///
    /// The builder writes each covered cell only if it is still empty,
    /// which yields the longest covering prefix per cell exactly when
    /// longer prefixes are installed first. `io::load_prefixes` sorts
    /// accordingly; callers supplying their own records must keep that
    /// ordering or the table will resolve some addresses to a shorter
    /// prefix than it should.
    pub fn build(records: &[PrefixRecord]) -> Self {
        let mut table = Self::new();
        for rec in records {
            table.fill(rec.prefix, rec.key, |_| false);
        }
        table
    }

    /// Write `key` into every cell covered by `prefix`. Empty cells are
    /// always written; populated ones only when `replace` says so.
    ///
    /// This is the one cell-update primitive shared by the batch builder
    /// (`replace` = never) and the dynamic table (`replace` = length
    /// comparison).
    pub(crate) fn fill(&mut self, prefix: Prefix, key: KeyId, replace: impl Fn(Cell) -> bool) {
        let net = prefix.net();
        let len = prefix.len();
        let cell = Cell::new(key, len);

        if len <= 24 {
            let start = (net >> 8) as usize;
            let count = 1usize << (24 - len);
            for slot in &mut self.main[start..start + count] {
                if slot.is_empty() || replace(*slot) {
                    *slot = cell;
                }
            }
        } else {
            let count = 1u32 << (32 - len);
            for off in 0..count {
                let addr = net + off;
                let main_idx = (addr >> 8) as usize;
                let sub_idx = (addr & 0xFF) as usize;
                let slot = &mut self.ensure_sub(main_idx)[sub_idx];
                if slot.is_empty() || replace(*slot) {
                    *slot = cell;
                }
            }
        }
    }

    /// Sub-table under `/24` index `main_idx`, allocating it if absent.
    pub(crate) fn ensure_sub(&mut self, main_idx: usize) -> &mut SubTable {
        let slot = &mut self.sub[main_idx];
        if slot.is_none() {
            *slot = Some(Box::new([Cell::EMPTY; SUB_TABLE_SIZE]));
            self.sub_tables += 1;
        }
        slot.as_mut().unwrap()
    }

    pub(crate) fn main_cell_mut(&mut self, main_idx: usize) -> &mut Cell {
        &mut self.main[main_idx]
    }

    /// Longest-prefix match: sub-table cell first, then the main cell.
    #[inline]
    pub fn lookup(&self, ip: u32) -> Option<KeyId> {
        let main_idx = (ip >> 8) as usize;
        if let Some(sub) = &self.sub[main_idx] {
            let cell = sub[(ip & 0xFF) as usize];
            if !cell.is_empty() {
                return cell.get();
            }
        }
        self.main[main_idx].get()
    }

    /// Number of sub-tables allocated so far.
    pub fn sub_table_count(&self) -> usize {
        self.sub_tables
    }

    /// Approximate heap usage.
    pub fn memory_usage(&self) -> usize {
        self.main.capacity() * std::mem::size_of::<Cell>()
            + self.sub.capacity() * std::mem::size_of::<Option<Box<SubTable>>>()
            + self.sub_tables * std::mem::size_of::<SubTable>()
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
    fn nested_prefixes_longest_wins() {
        let mut pool = KeyPool::new();
        // Descending length, as the loader provides.
        let records = [
            rec(&mut pool, "10.1.2.0/24", 3),
            rec(&mut pool, "10.1.0.0/16", 2),
            rec(&mut pool, "10.0.0.0/8", 1),
        ];
        let table = Dir24_8::build(&records);

        assert_eq!(table.lookup(ip("10.1.2.3")), Some(records[0].key));
        assert_eq!(table.lookup(ip("10.1.5.6")), Some(records[1].key));
        assert_eq!(table.lookup(ip("10.2.0.1")), Some(records[2].key));
        assert_eq!(table.lookup(ip("11.0.0.1")), None);
        assert_eq!(table.sub_table_count(), 0);
    }

    #[test]
    fn long_prefixes_use_sub_tables() {
        let mut pool = KeyPool::new();
        let records = [
            rec(&mut pool, "203.0.113.7/32", 9),
            rec(&mut pool, "192.168.1.128/25", 2),
            rec(&mut pool, "192.168.1.0/24", 1),
        ];
        let table = Dir24_8::build(&records);

        // /32 forces a sub-table under its /24.
        assert_eq!(table.sub_table_count(), 2);
        assert_eq!(table.lookup(ip("203.0.113.7")), Some(records[0].key));
        assert_eq!(table.lookup(ip("203.0.113.8")), None);

        // Sub-cells shadow the main cell only where the /25 reaches;
        // the low half falls back to the /24 in the main table.
        assert_eq!(table.lookup(ip("192.168.1.10")), Some(records[2].key));
        assert_eq!(table.lookup(ip("192.168.1.200")), Some(records[1].key));
    }

    #[test]
    fn default_route_fills_every_cell() {
        let mut pool = KeyPool::new();
        let records = [rec(&mut pool, "0.0.0.0/0", 0xD)];
        let table = Dir24_8::build(&records);

        assert_eq!(table.lookup(ip("8.8.8.8")), Some(records[0].key));
        assert_eq!(table.lookup(ip("255.255.255.255")), Some(records[0].key));
    }

    #[test]
    fn write_if_empty_keeps_longer_prefix() {
        let mut pool = KeyPool::new();
        let records = [
            rec(&mut pool, "172.16.0.0/12", 1),
            rec(&mut pool, "0.0.0.0/0", 2),
        ];
        let table = Dir24_8::build(&records);

        assert_eq!(table.lookup(ip("172.31.255.255")), Some(records[0].key));
        assert_eq!(table.lookup(ip("172.32.0.0")), Some(records[1].key));
    }
}
