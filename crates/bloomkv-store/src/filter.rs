//! Counting Bloom filter
//!
//! Each hashed position holds an 8-bit counter instead of a bit, so keys can be
//! removed again. Counters stick at `u8::MAX`: once saturated a counter is
//! never decremented, which can only leave positive bias behind.

use bloomkv_common::config::MIN_FALSE_POSITIVE_RATE;
use xxhash_rust::xxh64::xxh64;

const SEED_PRIMARY: u64 = 0x9E37_79B9_7F4A_7C15;
const SEED_SECONDARY: u64 = 0xC2B2_AE3D_27D4_EB4F;

/// Approximate multiset of byte keys with a bounded false-positive rate
#[derive(Clone, Debug)]
pub struct CountingBloomFilter {
    counters: Vec<u8>,
    hashes: u32,
}

impl CountingBloomFilter {
    /// Size a filter for `capacity` keys at the given false-positive rate.
    ///
    /// Rates below [`MIN_FALSE_POSITIVE_RATE`] are sized as that minimum.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn with_rate(capacity: usize, false_positive_rate: f64) -> Self {
        let n = capacity.max(1) as f64;
        let p = false_positive_rate.clamp(MIN_FALSE_POSITIVE_RATE, 0.999_999);
        let ln2 = std::f64::consts::LN_2;

        let slots = (-(n * p.ln()) / (ln2 * ln2)).ceil().max(1.0);
        let hashes = ((slots / n) * ln2).round().max(1.0);

        Self {
            counters: vec![0; slots as usize],
            hashes: hashes as u32,
        }
    }

    /// Number of counters
    #[must_use]
    pub fn slots(&self) -> usize {
        self.counters.len()
    }

    /// Number of hashed positions per key
    #[must_use]
    pub const fn hashes(&self) -> u32 {
        self.hashes
    }

    pub fn add(&mut self, key: &[u8]) {
        for idx in self.positions(key) {
            let counter = &mut self.counters[idx];
            *counter = counter.saturating_add(1);
        }
    }

    /// Undo one `add` of `key`. Removing a key that was never added corrupts
    /// the counts of other keys; callers only remove what they inserted.
    pub fn remove(&mut self, key: &[u8]) {
        for idx in self.positions(key) {
            let counter = &mut self.counters[idx];
            if *counter != 0 && *counter != u8::MAX {
                *counter -= 1;
            }
        }
    }

    /// `false` means `key` was certainly never added (or fully removed).
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.positions(key).all(|idx| self.counters[idx] != 0)
    }

    pub fn clear(&mut self) {
        self.counters.fill(0);
    }

    /// Number of non-zero counters
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.counters.iter().filter(|c| **c != 0).count()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn positions(&self, key: &[u8]) -> impl Iterator<Item = usize> + use<> {
        let h1 = xxh64(key, SEED_PRIMARY);
        // Odd step so the position sequence never collapses onto one slot.
        let h2 = xxh64(key, SEED_SECONDARY) | 1;
        let slots = self.counters.len() as u64;
        (0..u64::from(self.hashes))
            .map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % slots) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_sizing_follows_rate() {
        let filter = CountingBloomFilter::with_rate(1000, 0.01);
        // m = ceil(-1000 * ln(0.01) / ln(2)^2) = 9586, k = round(9.586 * ln 2) = 7
        assert_eq!(filter.slots(), 9586);
        assert_eq!(filter.hashes(), 7);

        let tiny = CountingBloomFilter::with_rate(0, 0.5);
        assert!(tiny.slots() >= 1);
        assert!(tiny.hashes() >= 1);
    }

    #[test]
    fn test_tiny_rate_is_sized_at_floor() {
        let floor = CountingBloomFilter::with_rate(1000, MIN_FALSE_POSITIVE_RATE);
        let tiny = CountingBloomFilter::with_rate(1000, 1e-300);
        assert_eq!(tiny.slots(), floor.slots());
        assert_eq!(tiny.hashes(), floor.hashes());
        // m = ceil(-1000 * ln(1e-9) / ln(2)^2)
        assert_eq!(floor.slots(), 43_133);
        assert_eq!(floor.hashes(), 30);
    }

    #[test]
    fn test_add_contains_remove() {
        let mut filter = CountingBloomFilter::with_rate(100, 0.01);
        assert!(!filter.contains(b"alpha"));

        filter.add(b"alpha");
        assert!(filter.contains(b"alpha"));

        filter.remove(b"alpha");
        assert!(!filter.contains(b"alpha"));
        assert_eq!(filter.occupied(), 0);
    }

    #[test]
    fn test_double_add_needs_double_remove() {
        let mut filter = CountingBloomFilter::with_rate(100, 0.01);
        filter.add(b"k");
        filter.add(b"k");
        filter.remove(b"k");
        assert!(filter.contains(b"k"));
        filter.remove(b"k");
        assert!(!filter.contains(b"k"));
    }

    #[test]
    fn test_saturated_counters_stick() {
        let mut filter = CountingBloomFilter::with_rate(10, 0.01);
        for _ in 0..300 {
            filter.add(b"hot");
        }
        for _ in 0..300 {
            filter.remove(b"hot");
        }
        assert!(filter.contains(b"hot"));
    }

    #[test]
    fn test_removal_keeps_other_keys() {
        let mut filter = CountingBloomFilter::with_rate(500, 0.01);
        let keys: Vec<Vec<u8>> = (0..500).map(|i| format!("key-{i}").into_bytes()).collect();
        for key in &keys {
            filter.add(key);
        }
        for key in keys.iter().step_by(2) {
            filter.remove(key);
        }
        for key in keys.iter().skip(1).step_by(2) {
            assert!(filter.contains(key), "lost {}", String::from_utf8_lossy(key));
        }
    }

    #[test]
    fn test_false_positive_rate_is_bounded() {
        let capacity = 5_000;
        let mut filter = CountingBloomFilter::with_rate(capacity, 0.01);
        let mut rng = rand::thread_rng();
        for _ in 0..capacity {
            let key: [u8; 16] = rng.r#gen();
            filter.add(&key);
        }

        let trials = 20_000;
        let mut false_positives = 0;
        for i in 0..trials {
            // Absent by construction: inserted keys are 16 bytes long.
            let absent = format!("absent-{i}");
            if filter.contains(absent.as_bytes()) {
                false_positives += 1;
            }
        }
        let rate = f64::from(false_positives) / f64::from(trials);
        assert!(rate < 0.03, "false positive rate too high: {rate}");
    }

    #[test]
    fn test_clear() {
        let mut filter = CountingBloomFilter::with_rate(100, 0.01);
        filter.add(b"a");
        filter.add(b"b");
        filter.clear();
        assert!(!filter.contains(b"a"));
        assert!(!filter.contains(b"b"));
        assert_eq!(filter.occupied(), 0);
    }
}
