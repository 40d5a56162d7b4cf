//! The common contract the benchmark driver programs against.
//!
//! Every structure answers the same two questions: build yourself from a
//! batch of records, and resolve an address to a value reference. The
//! driver stays generic over this trait; the dynamic engine's extra
//! insert/remove surface is its own inherent API.

use crate::bloom::DxrBloom;
use crate::dir24_8::Dir24_8;
use crate::dxr::Dxr;
use crate::dynamic::DynamicDir24_8;
use crate::key_pool::KeyId;
use crate::patricia::PatriciaTrie;
use crate::prefix::{Prefix, PrefixRecord};
use crate::radix::RadixTrie;

/// A longest-prefix-match engine.
pub trait LpmEngine {
    /// Algorithm name as written into the results CSV.
    const NAME: &'static str;

    /// Build from a batch of records. The direct-index engines require
    /// descending-length order (see their `build` docs); the trie engines
    /// and the dynamic engine accept any order.
    fn build(records: &[PrefixRecord]) -> Self
    where
        Self: Sized;

    /// Resolve `ip` to the value of its longest covering prefix.
    fn lookup(&self, ip: u32) -> Option<KeyId>;

    /// Approximate heap usage of the built structure.
    fn memory_usage(&self) -> usize;
}

/// The update surface of engines that stay correct under incremental
/// insert and delete, driven by the mixed-workload simulators.
pub trait DynamicLpmEngine: LpmEngine {
    /// Insert or overwrite a prefix.
    fn insert(&mut self, prefix: Prefix, key: KeyId);

    /// Remove an exact prefix; `false` when absent.
    fn remove(&mut self, prefix: Prefix) -> bool;
}

impl DynamicLpmEngine for RadixTrie {
    fn insert(&mut self, prefix: Prefix, key: KeyId) {
        RadixTrie::insert(self, prefix, key);
    }

    fn remove(&mut self, prefix: Prefix) -> bool {
        RadixTrie::remove(self, prefix)
    }
}

impl DynamicLpmEngine for DynamicDir24_8 {
    fn insert(&mut self, prefix: Prefix, key: KeyId) {
        DynamicDir24_8::insert(self, prefix, key);
    }

    fn remove(&mut self, prefix: Prefix) -> bool {
        DynamicDir24_8::remove(self, prefix)
    }
}

impl LpmEngine for RadixTrie {
    const NAME: &'static str = "BinaryRadixTrie";

    fn build(records: &[PrefixRecord]) -> Self {
        let mut trie = RadixTrie::new();
        for rec in records {
            trie.insert(rec.prefix, rec.key);
        }
        trie
    }

    fn lookup(&self, ip: u32) -> Option<KeyId> {
        RadixTrie::lookup(self, ip)
    }

    fn memory_usage(&self) -> usize {
        RadixTrie::memory_usage(self)
    }
}

impl LpmEngine for PatriciaTrie {
    const NAME: &'static str = "PatriciaTrie";

    fn build(records: &[PrefixRecord]) -> Self {
        let mut trie = PatriciaTrie::new();
        for rec in records {
            trie.insert(rec.prefix, rec.key);
        }
        trie
    }

    fn lookup(&self, ip: u32) -> Option<KeyId> {
        PatriciaTrie::lookup(self, ip)
    }

    fn memory_usage(&self) -> usize {
        PatriciaTrie::memory_usage(self)
    }
}

impl LpmEngine for Dir24_8 {
    const NAME: &'static str = "DIR-24-8";

    fn build(records: &[PrefixRecord]) -> Self {
        Dir24_8::build(records)
    }

    fn lookup(&self, ip: u32) -> Option<KeyId> {
        Dir24_8::lookup(self, ip)
    }

    fn memory_usage(&self) -> usize {
        Dir24_8::memory_usage(self)
    }
}

impl LpmEngine for Dxr {
    const NAME: &'static str = "DXR-16-8-8";

    fn build(records: &[PrefixRecord]) -> Self {
        Dxr::build(records)
    }

    fn lookup(&self, ip: u32) -> Option<KeyId> {
        Dxr::lookup(self, ip)
    }

    fn memory_usage(&self) -> usize {
        Dxr::memory_usage(self)
    }
}

impl LpmEngine for DxrBloom {
    const NAME: &'static str = "DXR-16-8-8+Bloom";

    fn build(records: &[PrefixRecord]) -> Self {
        DxrBloom::build(records)
    }

    fn lookup(&self, ip: u32) -> Option<KeyId> {
        DxrBloom::lookup(self, ip)
    }

    fn memory_usage(&self) -> usize {
        DxrBloom::memory_usage(self)
    }
}

impl LpmEngine for DynamicDir24_8 {
    const NAME: &'static str = "DIR-24-8-dyn";

    fn build(records: &[PrefixRecord]) -> Self {
        DynamicDir24_8::build(records)
    }

    fn lookup(&self, ip: u32) -> Option<KeyId> {
        DynamicDir24_8::lookup(self, ip)
    }

    fn memory_usage(&self) -> usize {
        DynamicDir24_8::memory_usage(self)
    }
}
