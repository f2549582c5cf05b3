//! Index schema lifecycle
//!
//! At startup every declared [`IndexDefinition`] is hashed and compared with
//! the hash persisted by the previous run. The decision of what to (re)create
//! is a pure function ([`plan_recreations`]) so it is testable without a
//! backend; [`IndexCreator`] executes the plan and maintains the metadata.

use crate::backend::{IndexSettings, SearchClient};
use crate::error::{AppError, Result};
use crate::schema::definition::{IndexDefinition, IndexSettingsDef, IndexType};
use crate::schema::hash::definition_hash;
use crate::schema::metadata::MetadataStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Why an index is dropped and recreated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreateReason {
    /// The definition hash differs from the persisted one
    DefinitionChanged,
    /// The system-of-record fingerprint changed; all indices are rebuilt
    DbVendorChanged,
}

/// Planned action for one index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexAction {
    /// Index missing from the backend; create it
    Create,
    /// Definition unchanged; keep data, ensure mappings
    Keep,
    /// Destructive: drop and redefine
    Recreate(RecreateReason),
}

/// Ordered plan over all declared indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecreatePlan {
    pub actions: Vec<(String, IndexAction)>,
}

impl RecreatePlan {
    pub fn action_for(&self, index: &str) -> Option<&IndexAction> {
        self.actions
            .iter()
            .find(|(name, _)| name == index)
            .map(|(_, action)| action)
    }
}

/// Decide what to do with each declared index. Pure: no backend access.
///
/// `db_vendor_changed` forces a rebuild of every existing index, except when
/// the backend holds no indices at all (nothing to reconcile against). Under
/// blue/green mode any destructive action fails instead, naming the first
/// offending index.
pub fn plan_recreations(
    definitions: &[IndexDefinition],
    previous_hashes: &HashMap<String, String>,
    existing_indices: &HashSet<String>,
    db_vendor_changed: bool,
    blue_green: bool,
) -> Result<RecreatePlan> {
    let vendor_rebuild = db_vendor_changed && !existing_indices.is_empty();

    let mut actions = Vec::with_capacity(definitions.len());
    for definition in definitions {
        let name = definition.name.clone();
        let action = if !existing_indices.contains(&name) {
            IndexAction::Create
        } else if vendor_rebuild {
            IndexAction::Recreate(RecreateReason::DbVendorChanged)
        } else {
            let current = definition_hash(definition);
            match previous_hashes.get(&name) {
                Some(previous) if *previous != current => {
                    IndexAction::Recreate(RecreateReason::DefinitionChanged)
                }
                _ => IndexAction::Keep,
            }
        };

        if blue_green {
            if let IndexAction::Recreate(_) = action {
                return Err(AppError::SchemaIncompatible { index: name });
            }
        }
        actions.push((name, action));
    }

    Ok(RecreatePlan { actions })
}

fn backend_settings(def: &IndexSettingsDef) -> IndexSettings {
    let mut settings = IndexSettings {
        shards: def.shards,
        replicas: def.replicas,
        ..Default::default()
    };
    if let Some(secs) = def.refresh_interval_secs {
        settings
            .extra
            .insert("refresh_interval".to_string(), format!("{}s", secs));
    }
    settings
}

/// Types left uninitialized by a creator run; each needs a full rebuild via
/// `ResilientIndexer::index_on_startup`
#[derive(Debug, Default)]
pub struct CreatorResult {
    pub uninitialized_types: HashSet<IndexType>,
}

/// Executes a [`RecreatePlan`] against the backend and keeps the metadata
/// store consistent with what the backend actually holds.
pub struct IndexCreator {
    client: Arc<dyn SearchClient>,
    metadata: Arc<dyn MetadataStore>,
}

impl IndexCreator {
    pub fn new(client: Arc<dyn SearchClient>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { client, metadata }
    }

    /// Reconcile the backend with the declared definitions.
    ///
    /// Hashes are persisted only after the index and its mappings are
    /// confirmed present, so a crash mid-creation repeats the work instead of
    /// recording a lie.
    pub async fn run(
        &self,
        definitions: &[IndexDefinition],
        db_fingerprint: &str,
        blue_green: bool,
    ) -> Result<CreatorResult> {
        let existing: HashSet<String> = self.client.list_indices().await?.into_iter().collect();

        let mut previous_hashes = HashMap::new();
        for definition in definitions {
            if let Some(hash) = self.metadata.hash(&definition.name).await? {
                previous_hashes.insert(definition.name.clone(), hash);
            }
        }

        let previous_vendor = self.metadata.db_vendor().await?;
        let db_vendor_changed = previous_vendor
            .as_deref()
            .map(|previous| previous != db_fingerprint)
            .unwrap_or(false);
        if db_vendor_changed && !existing.is_empty() {
            warn!(
                previous = previous_vendor.as_deref().unwrap_or(""),
                current = db_fingerprint,
                "Database fingerprint changed, all indices will be dropped and rebuilt"
            );
        }

        let plan = plan_recreations(
            definitions,
            &previous_hashes,
            &existing,
            db_vendor_changed,
            blue_green,
        )?;

        let mut result = CreatorResult::default();
        for definition in definitions {
            let action = plan
                .action_for(&definition.name)
                .expect("every definition is planned");
            match action {
                IndexAction::Create => {
                    info!(index = %definition.name, "Creating index");
                    self.create(definition, &mut result).await?;
                }
                IndexAction::Recreate(reason) => {
                    match reason {
                        RecreateReason::DefinitionChanged => {
                            info!(index = %definition.name, "Index definition changed, dropping and recreating")
                        }
                        RecreateReason::DbVendorChanged => {
                            info!(index = %definition.name, "Dropping and recreating index after database change")
                        }
                    }
                    self.client.delete_index(&definition.name).await?;
                    self.metadata.clear_hash(&definition.name).await?;
                    self.create(definition, &mut result).await?;
                }
                IndexAction::Keep => {
                    self.ensure_mappings(definition, &mut result).await?;
                }
            }
        }

        self.metadata.set_db_vendor(db_fingerprint).await?;
        Ok(result)
    }

    async fn create(&self, definition: &IndexDefinition, result: &mut CreatorResult) -> Result<()> {
        self.client
            .create_index(&definition.name, &backend_settings(&definition.settings))
            .await?;
        for index_type in definition.index_types() {
            let mapping = definition
                .types
                .iter()
                .find(|t| t.name == index_type.type_name())
                .expect("index_types derives from declared types");
            self.client.put_mapping(&index_type, mapping).await?;
            self.metadata.set_initialized(&index_type, false).await?;
            result.uninitialized_types.insert(index_type);
        }

        // confirm before persisting the new hash
        if !self.client.index_exists(&definition.name).await? {
            return Err(AppError::Backend(format!(
                "Index {} not present after creation",
                definition.name
            )));
        }
        self.metadata
            .set_hash(&definition.name, &definition_hash(definition))
            .await?;
        Ok(())
    }

    async fn ensure_mappings(
        &self,
        definition: &IndexDefinition,
        result: &mut CreatorResult,
    ) -> Result<()> {
        for index_type in definition.index_types() {
            let mapping = definition
                .types
                .iter()
                .find(|t| t.name == index_type.type_name())
                .expect("index_types derives from declared types");
            self.client.put_mapping(&index_type, mapping).await?;
            if !self.metadata.initialized(&index_type).await? {
                result.uninitialized_types.insert(index_type);
            }
        }
        self.metadata
            .set_hash(&definition.name, &definition_hash(definition))
            .await?;
        Ok(())
    }
}
