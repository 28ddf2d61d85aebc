//! Shard id scheme.
//!
//! Maps an entity id plus a shard ordinal to the external document id and
//! back. The format is `{entity_id}_{ordinal}`; the ordinal is the digits
//! after the *last* underscore, so entity ids containing underscores stay
//! unambiguous. Every component that reasons about "which shards belong to
//! this entity" goes through these two functions.

use anyhow::{bail, Result};

/// External document id for one shard of an entity.
pub fn shard_id(entity_id: &str, ordinal: i64) -> String {
    format!("{}_{}", entity_id, ordinal)
}

/// Recover `(entity_id, ordinal)` from an external document id.
pub fn parse_shard_id(id: &str) -> Result<(String, i64)> {
    let split = match id.rfind('_') {
        Some(pos) => pos,
        None => bail!("shard id '{}' has no ordinal suffix", id),
    };
    let (entity_id, suffix) = (&id[..split], &id[split + 1..]);
    if entity_id.is_empty() {
        bail!("shard id '{}' has an empty entity id", id);
    }
    let ordinal: i64 = suffix
        .parse()
        .map_err(|_| anyhow::anyhow!("shard id '{}' has a non-numeric ordinal", id))?;
    if ordinal < 0 {
        bail!("shard id '{}' has a negative ordinal", id);
    }
    Ok((entity_id.to_string(), ordinal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for id in ["abc123", "with_underscore", "a_b_c"] {
            for ordinal in [0i64, 1, 7, 1024] {
                let external = shard_id(id, ordinal);
                let (back_id, back_ord) = parse_shard_id(&external).unwrap();
                assert_eq!(back_id, id);
                assert_eq!(back_ord, ordinal);
            }
        }
    }

    #[test]
    fn format_is_stable() {
        assert_eq!(shard_id("p1", 0), "p1_0");
        assert_eq!(shard_id("p1", 12), "p1_12");
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(parse_shard_id("nounderscore").is_err());
        assert!(parse_shard_id("_0").is_err());
        assert!(parse_shard_id("abc_").is_err());
        assert!(parse_shard_id("abc_x1").is_err());
        assert!(parse_shard_id("abc_-1").is_err());
    }

    #[test]
    fn ordinal_is_last_suffix() {
        let (id, ord) = parse_shard_id("a_b_3").unwrap();
        assert_eq!(id, "a_b");
        assert_eq!(ord, 3);
    }
}
