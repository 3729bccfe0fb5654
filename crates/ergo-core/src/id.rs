//! Short human-typeable IDs.

use crate::error::ValidationError;
use crate::graph::Graph;
use std::collections::BTreeSet;
use uuid::Uuid;

pub const ID_LEN: usize = 6;

/// Crockford-style alphabet: no I, L, O, U.
pub const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

const MAX_ATTEMPTS: usize = 64;

/// Draw a fresh ID not used by any live entity, any tombstone, or `reserved`.
pub fn allocate(graph: &Graph, reserved: &BTreeSet<String>) -> Result<String, ValidationError> {
    for _ in 0..MAX_ATTEMPTS {
        let candidate = draw(Uuid::new_v4());
        if !graph.contains(&candidate)
            && !graph.is_tombstoned(&candidate)
            && !reserved.contains(&candidate)
        {
            return Ok(candidate);
        }
        tracing::trace!(candidate = %candidate, "id collision, redrawing");
    }
    Err(ValidationError::IdSpaceExhausted)
}

fn draw(uuid: Uuid) -> String {
    uuid.as_bytes()
        .iter()
        .take(ID_LEN)
        .map(|byte| ALPHABET[(*byte & 0x1f) as usize] as char)
        .collect()
}

/// Canonical form of a user-typed ID.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

pub fn is_well_formed(id: &str) -> bool {
    id.len() == ID_LEN && id.bytes().all(|b| ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_ids_use_the_alphabet() {
        let graph = Graph::default();
        for _ in 0..100 {
            let id = allocate(&graph, &BTreeSet::new()).expect("allocate");
            assert!(is_well_formed(&id), "bad id {id}");
        }
    }

    #[test]
    fn reserved_ids_are_never_returned() {
        let graph = Graph::default();
        let mut reserved = BTreeSet::new();
        for _ in 0..50 {
            let id = allocate(&graph, &reserved).expect("allocate");
            assert!(reserved.insert(id));
        }
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize("  ab12cd\n"), "AB12CD");
    }
}
