//! Variant Cache
//!
//! Bounded in-memory store of fully built [`ShaderVariant`]s.
//!
//! # Eviction
//!
//! Slots form a ring with a single insertion cursor. A new variant always lands
//! at the cursor, evicting whatever was inserted there `capacity` insertions ago.
//! Eviction is therefore strictly in insertion order; hits do not reorder
//! entries. An evicted variant is released through the registrar before its
//! slot is reused.
//!
//! Lookup is a linear scan over the occupied slots comparing keys. The capacity
//! is small and fixed, and keys are canonical, so plain equality is exact.

use std::fmt;

use crate::backend::ProgramRegistrar;
use crate::mask::VariantKey;
use crate::variant::ShaderVariant;

/// Handle to an occupied cache slot.
///
/// Only valid until the slot is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheSlot(pub(crate) u32);

impl CacheSlot {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lookups={} hits={} misses={} insertions={} evictions={}",
            self.lookups, self.hits, self.misses, self.insertions, self.evictions
        )
    }
}

/// Result of [`VariantCache::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inserted {
    pub slot: CacheSlot,
    /// Key of the variant that was evicted to make room, if any.
    pub evicted: Option<VariantKey>,
}

pub struct VariantCache {
    slots: Vec<Option<ShaderVariant>>,
    cursor: usize,
    stats: CacheStats,
}

impl VariantCache {
    /// Creates a cache with `capacity` slots (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            cursor: 0,
            stats: CacheStats::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Finds the slot holding `key`.
    pub fn lookup(&mut self, key: &VariantKey) -> Option<CacheSlot> {
        self.stats.lookups += 1;
        let found = self
            .slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|variant| variant.key() == *key))
            .map(|index| CacheSlot(index as u32));

        if found.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        found
    }

    /// Side-effect free membership test.
    #[must_use]
    pub fn contains(&self, key: &VariantKey) -> bool {
        self.keys().any(|k| k == *key)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, slot: CacheSlot) -> Option<&ShaderVariant> {
        self.slots.get(slot.index())?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, slot: CacheSlot) -> Option<&mut ShaderVariant> {
        self.slots.get_mut(slot.index())?.as_mut()
    }

    /// Inserts a fully built variant, evicting the oldest entry when full.
    ///
    /// The caller guarantees the key is not already cached.
    pub fn insert<R: ProgramRegistrar + ?Sized>(
        &mut self,
        variant: ShaderVariant,
        registrar: &mut R,
    ) -> Inserted {
        debug_assert!(
            !self.contains(&variant.key()),
            "variant {} inserted twice",
            variant.key()
        );

        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.slots.len();

        let evicted = self.slots[index].take().map(|old| {
            let key = old.key();
            log::debug!("Evicting variant {key} from slot {index}");
            old.release(registrar);
            self.stats.evictions += 1;
            key
        });

        self.slots[index] = Some(variant);
        self.stats.insertions += 1;

        Inserted {
            slot: CacheSlot(index as u32),
            evicted,
        }
    }

    /// Releases every cached variant.
    pub fn clear<R: ProgramRegistrar + ?Sized>(&mut self, registrar: &mut R) {
        for variant in self.slots.iter_mut().filter_map(Option::take) {
            variant.release(registrar);
        }
        self.cursor = 0;
    }

    /// Keys of the cached variants, in slot order.
    pub fn keys(&self) -> impl Iterator<Item = VariantKey> + '_ {
        self.slots.iter().flatten().map(ShaderVariant::key)
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl fmt::Debug for VariantCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantCache")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("cursor", &self.cursor)
            .field("stats", &self.stats)
            .finish()
    }
}
