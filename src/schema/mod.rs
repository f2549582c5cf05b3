//! Index schema definitions and their startup lifecycle
//!
//! Declares indices and type mappings in-process, hashes them, and reconciles
//! the backend with the declarations at startup: create what is missing,
//! recreate what changed (unless blue/green mode forbids it), and report which
//! types need a full rebuild.

mod creator;
mod definition;
mod hash;
mod metadata;

pub use creator::{
    plan_recreations, CreatorResult, IndexAction, IndexCreator, RecreatePlan, RecreateReason,
};
pub use definition::{FieldType, IndexDefinition, IndexSettingsDef, IndexType, TypeMapping};
pub use hash::definition_hash;
pub use metadata::{InMemoryMetadataStore, MetadataStore, SledMetadataStore};
