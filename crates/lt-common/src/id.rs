//! Alarm identity types.
//!
//! Every live alarm holds a process-wide-unique identity so that concurrent
//! alarms registered against the same timer capability never collide. Ids
//! are allocated from an [`AlarmIdSource`] owned by the tracer rather than a
//! bare static, so two tracer instances (or a test harness) can each carry
//! their own source.
//!
//! Format: `alarm-<seq>-<suffix>`
//! Example: `alarm-3-k7qx`

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identity of one alarm registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmId(pub String);

impl AlarmId {
    /// Parse and validate an alarm id string.
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("alarm-")?;
        let (seq, suffix) = rest.split_once('-')?;
        if seq.is_empty() || seq.chars().any(|c| !c.is_ascii_digit()) {
            return None;
        }
        if suffix.len() != 4 || !suffix.chars().all(|c| matches!(c, 'a'..='z' | '2'..='7')) {
            return None;
        }
        Some(AlarmId(s.to_string()))
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocates unique [`AlarmId`]s.
///
/// A monotonic sequence number makes ids unique within the source; a short
/// random suffix keeps ids from two sources apart when both register against
/// one shared timer capability.
#[derive(Debug, Default)]
pub struct AlarmIdSource {
    sequence: AtomicU64,
}

impl AlarmIdSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> AlarmId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        AlarmId(format!("alarm-{}-{}", seq, generate_base32_suffix()))
    }
}

fn generate_base32_suffix() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    let mut value = ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32);
    value &= 0x000F_FFFF;
    let alphabet = b"abcdefghijklmnopqrstuvwxyz234567";
    let mut out = String::with_capacity(4);
    for shift in [15_u32, 10, 5, 0] {
        let idx = ((value >> shift) & 0x1F) as usize;
        out.push(alphabet[idx] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let source = AlarmIdSource::new();
        let a = source.next_id();
        let b = source.next_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_format_round_trips() {
        let source = AlarmIdSource::new();
        let id = source.next_id();
        assert!(id.0.starts_with("alarm-0-"));
        assert_eq!(AlarmId::parse(&id.0), Some(id));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(AlarmId::parse("alarm-x-abcd").is_none());
        assert!(AlarmId::parse("alarm-1-ABCD").is_none());
        assert!(AlarmId::parse("alarm-1-toolong").is_none());
        assert!(AlarmId::parse("timer-1-abcd").is_none());
    }

    #[test]
    fn test_sources_do_not_share_sequences() {
        let a = AlarmIdSource::new();
        let b = AlarmIdSource::new();
        a.next_id();
        let second = a.next_id();
        let first = b.next_id();
        assert!(second.0.starts_with("alarm-1-"));
        assert!(first.0.starts_with("alarm-0-"));
    }

    #[test]
    fn test_id_serde_transparent() {
        let id = AlarmId("alarm-7-abcd".to_string());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"alarm-7-abcd\"");
        let back: AlarmId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
