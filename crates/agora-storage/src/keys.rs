//! Key encoding for the storage layer.
//!
//! Unit keys: `unit:{timestamp_ms:013}:{ulid}`. The timestamp is taken from the
//! ULID itself, so a key can be rebuilt from a unit id alone and a reverse scan
//! of the units column family yields newest units first.
//!
//! Counter keys: `{scope}:{id}:{counter}`, e.g. `agent:01H..:unit_count`.

use ulid::Ulid;

use agora_types::UnitCounter;

use crate::error::StorageError;

/// Key for unit storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitKey {
    pub timestamp_ms: i64,
    pub ulid: Ulid,
}

impl UnitKey {
    /// Create a key for a fresh unit.
    pub fn new() -> Self {
        let ulid = Ulid::new();
        Self {
            timestamp_ms: ulid.timestamp_ms() as i64,
            ulid,
        }
    }

    /// Rebuild the key from a unit id (the ULID string).
    pub fn from_unit_id(unit_id: &str) -> Result<Self, StorageError> {
        let ulid: Ulid = unit_id
            .parse()
            .map_err(|e| StorageError::NotFound(format!("invalid unit id {unit_id}: {e}")))?;
        Ok(Self {
            timestamp_ms: ulid.timestamp_ms() as i64,
            ulid,
        })
    }

    /// Encode key to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("unit:{:013}:{}", self.timestamp_ms, self.ulid).into_bytes()
    }

    pub fn unit_id(&self) -> String {
        self.ulid.to_string()
    }
}

impl Default for UnitKey {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter key for an agent's authored-unit count.
pub fn agent_unit_count_key(agent_id: &str) -> Vec<u8> {
    format!("agent:{agent_id}:unit_count").into_bytes()
}

/// Counter key for one unit counter.
pub fn unit_counter_key(unit_id: &str, counter: UnitCounter) -> Vec<u8> {
    format!("unit:{unit_id}:{}", counter.as_str()).into_bytes()
}

/// Decode a counter value. Malformed values count as zero.
pub fn decode_counter(bytes: &[u8]) -> i64 {
    <[u8; 8]>::try_from(bytes)
        .map(i64::from_le_bytes)
        .unwrap_or(0)
}

/// Encode a counter delta or value.
pub fn encode_counter(value: i64) -> [u8; 8] {
    value.to_le_bytes()
}
