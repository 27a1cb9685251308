//! Probabilistic membership used to skip work already recorded by earlier runs.

mod bloom;
mod dedup;

pub use bloom::BloomFilter;
pub use dedup::{load_seen_filter, unseen, url_dedup_key, url_record_key};
