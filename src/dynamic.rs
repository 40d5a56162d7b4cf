//! DIR-24-8 under incremental insert and delete.
//!
//! The direct-index table alone cannot answer "what is now the next
//! longest prefix covering this cell?" once an entry disappears, so the
//! table is shadowed by two binary radix tries partitioned by stride:
//! `t24` for lengths <= 24 and `t32` for the rest. Inserts update trie
//! and table cells directly; deletes remove from the trie and then ask it
//! for the correct new occupant of every affected cell, O(32) per cell.
//!
//! Unlike the batch builder, updates may arrive in any order: a cell is
//! replaced whenever the incoming length is >= the stored one, which also
//! lets a same-length re-insert refresh its value.

use crate::dir24_8::Dir24_8;
use crate::key_pool::KeyId;
use crate::prefix::{Prefix, PrefixRecord};
use crate::radix::RadixTrie;
use crate::Cell;

/// DIR-24-8 that maintains LPM correctness under insert and delete.
pub struct DynamicDir24_8 {
    table: Dir24_8,
    t24: RadixTrie,
    t32: RadixTrie,
}

impl Default for DynamicDir24_8 {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicDir24_8 {
    /// Allocate the empty engine.
    pub fn new() -> Self {
        DynamicDir24_8 {
            table: Dir24_8::new(),
            t24: RadixTrie::new(),
            t32: RadixTrie::new(),
        }
    }

    /// Build from records in any order (no sorting contract here).
    pub fn build(records: &[PrefixRecord]) -> Self {
        let mut engine = Self::new();
        for rec in records {
            engine.insert(rec.prefix, rec.key);
        }
        engine
    }

    /// Insert or overwrite a prefix.
    pub fn insert(&mut self, prefix: Prefix, key: KeyId) {
        let len = prefix.len();
        if len <= 24 {
            self.t24.insert(prefix, key);
        } else {
            self.t32.insert(prefix, key);
        }
        self.table
            .fill(prefix, key, |cell| len >= cell.plen());
    }

    /// Remove an exact prefix, restoring every affected cell to the next
    /// longest covering prefix (or empty). Returns `false` when the
    /// prefix was not present; nothing changes in that case.
    pub fn remove(&mut self, prefix: Prefix) -> bool {
        let net = prefix.net();
        let len = prefix.len();

        if len <= 24 {
            if !self.t24.remove(prefix) {
                return false;
            }
            let start = (net >> 8) as usize;
            let count = 1usize << (24 - len);
            for main_idx in start..start + count {
                // Any address inside the /24 works as a representative.
                let rep = (main_idx as u32) << 8;
                let cell = self.recompute(rep, rep);
                *self.table.main_cell_mut(main_idx) = cell;
            }
        } else {
            if !self.t32.remove(prefix) {
                return false;
            }
            let count = 1u32 << (32 - len);
            for off in 0..count {
                let addr = net + off;
                let main_idx = (addr >> 8) as usize;
                let sub_idx = (addr & 0xFF) as usize;
                let rep = (main_idx as u32) << 8;
                let cell = self.recompute(addr, rep);
                self.table.ensure_sub(main_idx)[sub_idx] = cell;
            }
        }
        true
    }

    /// Correct occupant for a cell: the long-prefix trie at the exact
    /// address first, then the short-prefix trie at the /24
    /// representative, else empty.
    fn recompute(&self, addr: u32, rep: u32) -> Cell {
        if let Some(e) = self.t32.lookup_entry(addr) {
            return Cell::new(e.key, e.plen);
        }
        match self.t24.lookup_entry(rep) {
            Some(e) => Cell::new(e.key, e.plen),
            None => Cell::EMPTY,
        }
    }

    /// Longest-prefix match (same probe sequence as the static table).
    #[inline]
    pub fn lookup(&self, ip: u32) -> Option<KeyId> {
        self.table.lookup(ip)
    }

    /// Number of installed prefixes.
    pub fn len(&self) -> usize {
        self.t24.len() + self.t32.len()
    }

    /// Whether no prefix is installed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate heap usage of table plus shadow tries.
    pub fn memory_usage(&self) -> usize {
        self.table.memory_usage() + self.t24.memory_usage() + self.t32.memory_usage()
    }
}
