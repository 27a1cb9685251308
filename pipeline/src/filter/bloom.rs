use std::f64::consts::LN_2;
use std::fmt;

use config::shared::FilterConfig;
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::bail;
use crate::error::{ErrorKind, PipelineResult};

/// Number of bits in one storage word.
const WORD_BITS: u64 = u64::BITS as u64;

/// Fixed-size probabilistic set of strings.
///
/// [`BloomFilter::check`] never returns `false` for a key that was added, but may return
/// `true` for a key that never was. Bits are only ever set, so once a key is reported as
/// possibly present it stays that way for the life of the filter.
#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    size: u64,
    hash_count: u32,
    bits: Vec<u64>,
}

impl BloomFilter {
    /// Bit count of the default filter, about 0.1% false positives at one million keys.
    pub const DEFAULT_SIZE: u64 = 15_000_000;

    /// Hash count of the default filter.
    pub const DEFAULT_HASH_COUNT: u32 = 9;

    /// Creates an empty filter with `size` bits and `hash_count` hash functions.
    pub fn new(size: u64, hash_count: u32) -> PipelineResult<Self> {
        if size == 0 {
            bail!(
                ErrorKind::InvalidConfiguration,
                "Bloom filter size must be greater than zero"
            );
        }

        if hash_count == 0 {
            bail!(
                ErrorKind::InvalidConfiguration,
                "Bloom filter hash count must be greater than zero"
            );
        }

        let words = size.div_ceil(WORD_BITS) as usize;

        Ok(Self {
            size,
            hash_count,
            bits: vec![0; words],
        })
    }

    /// Creates a filter sized for `expected_items` keys at `false_positive_rate`.
    pub fn with_rate(expected_items: u64, false_positive_rate: f64) -> PipelineResult<Self> {
        let (size, hash_count) = Self::optimal_parameters(expected_items, false_positive_rate)?;
        Self::new(size, hash_count)
    }

    /// Creates a filter from its configuration.
    pub fn from_config(config: &FilterConfig) -> PipelineResult<Self> {
        config.validate()?;
        Self::with_rate(config.expected_items, config.false_positive_rate)
    }

    /// Computes `(size, hash_count)` for `n` expected keys and target rate `p`.
    ///
    /// `size = ceil(-n ln p / ln² 2)` and `hash_count = round(size / n · ln 2)`, never below one.
    pub fn optimal_parameters(n: u64, p: f64) -> PipelineResult<(u64, u32)> {
        if n == 0 {
            bail!(
                ErrorKind::InvalidConfiguration,
                "Expected item count must be greater than zero"
            );
        }

        if !(p > 0.0 && p < 1.0) {
            bail!(
                ErrorKind::InvalidConfiguration,
                "False positive rate must be strictly between 0 and 1",
                format!("got {p}")
            );
        }

        let n = n as f64;
        let size = (-n * p.ln() / (LN_2 * LN_2)).ceil();
        let hash_count = (size / n * LN_2).round().max(1.0);

        Ok((size as u64, hash_count as u32))
    }

    /// Adds a key by setting every one of its derived bits.
    pub fn add(&mut self, key: &str) {
        for position in self.positions(key) {
            self.bits[(position / WORD_BITS) as usize] |= 1u64 << (position % WORD_BITS);
        }
    }

    /// Returns `true` if the key is possibly present, `false` if it is definitely absent.
    pub fn check(&self, key: &str) -> bool {
        self.positions(key)
            .all(|position| self.bits[(position / WORD_BITS) as usize] & (1u64 << (position % WORD_BITS)) != 0)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    /// Expected false positive probability once `items` distinct keys were added.
    pub fn estimated_false_positive_rate(&self, items: u64) -> f64 {
        let k = f64::from(self.hash_count);
        let exponent = -k * items as f64 / self.size as f64;

        (1.0 - exponent.exp()).powf(k)
    }

    /// Bit positions of `key`, one per hash function.
    ///
    /// Each hash function is xxh3 seeded with its index, reduced modulo the filter size.
    fn positions<'a>(&self, key: &'a str) -> impl Iterator<Item = u64> + 'a {
        let size = self.size;
        (0..u64::from(self.hash_count)).map(move |seed| xxh3_64_with_seed(key.as_bytes(), seed) % size)
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self {
            size: Self::DEFAULT_SIZE,
            hash_count: Self::DEFAULT_HASH_COUNT,
            bits: vec![0; Self::DEFAULT_SIZE.div_ceil(WORD_BITS) as usize],
        }
    }
}

impl fmt::Display for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BloomFilter(size={}, hash_count={})",
            self.size, self.hash_count
        )
    }
}

impl fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BloomFilter")
            .field("size", &self.size)
            .field("hash_count", &self.hash_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rand::distributions::Alphanumeric;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn random_keys(rng: &mut StdRng, count: usize) -> Vec<String> {
        (0..count)
            .map(|_| {
                (0..24)
                    .map(|_| rng.sample(Alphanumeric) as char)
                    .collect::<String>()
            })
            .collect()
    }

    #[test]
    fn zero_size_is_rejected() {
        let err = BloomFilter::new(0, 3).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        assert_eq!(
            BloomFilter::new(64, 0).unwrap_err().kind(),
            ErrorKind::InvalidConfiguration
        );
    }

    #[test]
    fn added_keys_are_always_found() {
        let mut filter = BloomFilter::new(10_000, 5).unwrap();
        let keys = (0..500).map(|i| format!("example.com:/p/{i}:")).collect::<Vec<_>>();

        for key in &keys {
            filter.add(key);
            assert!(filter.check(key));
        }

        // Later additions never clear earlier bits.
        assert!(keys.iter().all(|key| filter.check(key)));
    }

    #[test]
    fn empty_filter_contains_nothing() {
        let filter = BloomFilter::new(1, 1).unwrap();

        assert!(!filter.check("anything"));
    }

    #[test]
    fn single_bit_filter_saturates() {
        let mut filter = BloomFilter::new(1, 4).unwrap();
        filter.add("a");

        assert!(filter.check("b"));
    }

    #[test]
    fn optimal_parameters_follow_the_sizing_formula() {
        let (size, hash_count) = BloomFilter::optimal_parameters(1_000_000, 0.001).unwrap();

        assert_eq!(size, 14_377_588);
        assert_eq!(hash_count, 10);
    }

    #[test]
    fn smaller_rates_need_more_bits() {
        let mut previous = 0;
        for rate in [0.5, 0.1, 0.01, 0.001, 0.0001] {
            let (size, hash_count) = BloomFilter::optimal_parameters(1000, rate).unwrap();

            assert!(size > previous);
            assert!(hash_count >= 1);
            previous = size;
        }
    }

    #[test]
    fn optimal_parameters_reject_invalid_input() {
        assert!(BloomFilter::optimal_parameters(0, 0.01).is_err());
        assert!(BloomFilter::optimal_parameters(10, 0.0).is_err());
        assert!(BloomFilter::optimal_parameters(10, 1.0).is_err());
        assert!(BloomFilter::optimal_parameters(10, f64::NAN).is_err());
    }

    #[test]
    fn tiny_item_counts_still_get_one_hash() {
        let (size, hash_count) = BloomFilter::optimal_parameters(1, 0.9).unwrap();

        assert!(size >= 1);
        assert_eq!(hash_count, 1);
    }

    #[test]
    fn empirical_false_positive_rate_stays_near_target() {
        let mut rng = StdRng::seed_from_u64(42);
        let target = 0.01;
        let mut filter = BloomFilter::with_rate(10_000, target).unwrap();

        for key in random_keys(&mut rng, 10_000) {
            filter.add(&key);
        }

        let candidates = random_keys(&mut rng, 20_000);
        let false_positives = candidates.iter().filter(|key| filter.check(key)).count();
        let rate = false_positives as f64 / candidates.len() as f64;

        assert!(rate < target * 10.0, "false positive rate {rate} too high");
        assert!(filter.estimated_false_positive_rate(10_000) < target * 1.5);
    }

    #[test]
    fn default_filter_is_sized_for_a_million_keys() {
        let filter = BloomFilter::default();

        insta::assert_snapshot!(filter.to_string(), @"BloomFilter(size=15000000, hash_count=9)");
        assert!(filter.estimated_false_positive_rate(1_000_000) < 0.002);
    }

    #[test]
    fn config_is_validated() {
        let config = FilterConfig {
            expected_items: 0,
            ..FilterConfig::default()
        };

        assert_eq!(
            BloomFilter::from_config(&config).unwrap_err().kind(),
            ErrorKind::InvalidConfiguration
        );

        let filter = BloomFilter::from_config(&FilterConfig::default()).unwrap();
        assert_eq!(filter.hash_count(), 10);
    }
}
