//! Content hash of an index definition
//!
//! The hash decides whether an index must be dropped and recreated at
//! startup. It covers the index name, settings and every field mapping with
//! all its options. Field and type declaration order never changes the hash
//! (`TypeMapping` keeps fields in a `BTreeMap` and types are sorted here);
//! any addition, removal or option change does.

use crate::schema::definition::IndexDefinition;
use sha2::{Digest, Sha256};

/// Deterministic hex hash of a definition's content
pub fn definition_hash(definition: &IndexDefinition) -> String {
    let mut canonical = definition.clone();
    canonical.types.sort_by(|a, b| a.name.cmp(&b.name));
    // serde_json on BTreeMap-backed structures is canonical for our shapes
    let serialized =
        serde_json::to_vec(&canonical).expect("index definition serialization cannot fail");
    let digest = Sha256::digest(&serialized);
    format!("{:x}", digest)
}
