//! Cache entries and sizing.
//!
//! Keys and values report their footprint through [`SizedItem`]; byte pools
//! charge the sum of both. Timestamps are logical ticks handed out by the
//! owning tier, which keeps eviction order deterministic.

use std::fmt::Debug;
use std::hash::Hash;

/// Approximate in-memory footprint of a key or value.
///
/// # Example
///
/// ```
/// use tiered_cache::SizedItem;
///
/// #[derive(Clone, Debug)]
/// struct Blob { data: Vec<u8> }
///
/// impl SizedItem for Blob {
///     fn size_bytes(&self) -> usize { self.data.len() }
/// }
///
/// assert_eq!(Blob { data: vec![0; 16] }.size_bytes(), 16);
/// assert_eq!("hello".to_string().size_bytes(), 5);
/// ```
pub trait SizedItem {
    fn size_bytes(&self) -> usize;
}

impl SizedItem for String {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

impl SizedItem for Vec<u8> {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

impl<T: SizedItem + ?Sized> SizedItem for std::sync::Arc<T> {
    fn size_bytes(&self) -> usize {
        (**self).size_bytes()
    }
}

macro_rules! fixed_size {
    ($($t:ty),*) => {
        $(impl SizedItem for $t {
            #[inline]
            fn size_bytes(&self) -> usize {
                std::mem::size_of::<$t>()
            }
        })*
    };
}

fixed_size!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, usize, isize);

/// Bound for cache keys.
pub trait CacheKey: Eq + Hash + Clone + Debug + SizedItem + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Eq + Hash + Clone + Debug + SizedItem + Send + Sync + 'static {}

/// Bound for cache values.
pub trait CacheValue: Clone + SizedItem + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + SizedItem + Send + Sync + 'static {}

/// A value resident in one local tier, with the metadata eviction needs.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    /// Key + value footprint at insertion time
    pub size_bytes: usize,
    /// Tick of the most recent read or write
    pub last_access: u64,
    /// Tick at insertion; never changes on access
    pub inserted_seq: u64,
    pub access_count: u64,
    /// Name of the tier holding this entry
    pub tier: std::sync::Arc<str>,
    /// Exact amount charged to each of the tier's pools, in pool order
    pub(crate) charges: Vec<u64>,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(
        value: V,
        size_bytes: usize,
        tick: u64,
        tier: std::sync::Arc<str>,
        charges: Vec<u64>,
    ) -> Self {
        Self {
            value,
            size_bytes,
            last_access: tick,
            inserted_seq: tick,
            access_count: 0,
            tier,
            charges,
        }
    }

    pub fn record_access(&mut self, tick: u64) {
        self.last_access = tick;
        self.access_count = self.access_count.saturating_add(1);
    }

    /// Charges recorded against each pool when the entry was admitted.
    #[must_use]
    pub fn charges(&self) -> &[u64] {
        &self.charges
    }
}

/// Footprint of a key/value pair as charged to byte pools.
#[must_use]
#[inline]
pub fn entry_size<K: SizedItem, V: SizedItem>(key: &K, value: &V) -> usize {
    key.size_bytes() + value.size_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_entry_size_of_long_and_string() {
        let size = entry_size(&42i64, &"0123456789".to_string());
        assert_eq!(size, 8 + 10);
    }

    #[test]
    fn test_arc_delegates_size() {
        let shared: Arc<String> = Arc::new("abcd".into());
        assert_eq!(shared.size_bytes(), 4);
    }

    #[test]
    fn test_record_access_keeps_insertion_order() {
        let mut entry = CacheEntry::new("v".to_string(), 9, 3, Arc::from("heap"), vec![1]);
        entry.record_access(7);
        entry.record_access(11);

        assert_eq!(entry.inserted_seq, 3);
        assert_eq!(entry.last_access, 11);
        assert_eq!(entry.access_count, 2);
        assert_eq!(entry.charges(), &[1]);
    }
}
