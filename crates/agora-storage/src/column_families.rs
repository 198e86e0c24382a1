//! Column family definitions for RocksDB.
//!
//! - agents: Provisioned persona records
//! - units: Content units keyed by time-prefixed ULID
//! - topics: Topic briefs
//! - engagements: Agent-to-agent reaction records (insert-only)
//! - settings: Global key/value settings (throttle)
//! - counters: i64 counters updated only through the add merge operator

use rocksdb::{ColumnFamilyDescriptor, MergeOperands, Options};

use crate::keys::{decode_counter, encode_counter};

pub const CF_AGENTS: &str = "agents";
pub const CF_UNITS: &str = "units";
pub const CF_TOPICS: &str = "topics";
pub const CF_ENGAGEMENTS: &str = "engagements";
pub const CF_SETTINGS: &str = "settings";
pub const CF_COUNTERS: &str = "counters";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_AGENTS,
    CF_UNITS,
    CF_TOPICS,
    CF_ENGAGEMENTS,
    CF_SETTINGS,
    CF_COUNTERS,
];

/// Associative merge: sum of the existing value and every operand.
pub fn counter_add_merge(
    _key: &[u8],
    existing: Option<&[u8]>,
    operands: &MergeOperands,
) -> Option<Vec<u8>> {
    let mut total = existing.map(decode_counter).unwrap_or(0);
    for operand in operands.iter() {
        total = total.saturating_add(decode_counter(operand));
    }
    Some(encode_counter(total).to_vec())
}

fn units_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

fn counters_options() -> Options {
    let mut opts = Options::default();
    opts.set_merge_operator_associative("counter_add", counter_add_merge);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_AGENTS, Options::default()),
        ColumnFamilyDescriptor::new(CF_UNITS, units_options()),
        ColumnFamilyDescriptor::new(CF_TOPICS, Options::default()),
        ColumnFamilyDescriptor::new(CF_ENGAGEMENTS, units_options()),
        ColumnFamilyDescriptor::new(CF_SETTINGS, Options::default()),
        ColumnFamilyDescriptor::new(CF_COUNTERS, counters_options()),
    ]
}
