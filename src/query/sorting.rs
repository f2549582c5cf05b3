//! Named multi-field sort profiles
//!
//! A profile maps one logical sort key to an ordered list of physical fields.
//! The request supplies only the key and a single `ascending` flag; each
//! field's own `reverse`/`missing_last` markers combine with it to produce
//! the concrete clauses.

use crate::backend::{MissingPlacement, SortClause, SortOrder};
use crate::error::{AppError, Result};
use std::collections::HashMap;

/// One physical field inside a profile
#[derive(Debug, Clone)]
pub struct SortField {
    field: String,
    reverse: bool,
    missing_last: bool,
}

impl SortField {
    fn new(field: String) -> Self {
        Self {
            field,
            reverse: false,
            missing_last: false,
        }
    }

    /// Invert this field's direction relative to the requested one
    pub fn reverse(&mut self) -> &mut Self {
        self.reverse = true;
        self
    }

    /// Place documents missing this field after present ones
    pub fn missing_last(&mut self) -> &mut Self {
        self.missing_last = true;
        self
    }
}

/// Registry of sort profiles, immutable once handed to the read path
#[derive(Debug, Clone, Default)]
pub struct Sorting {
    profiles: HashMap<String, Vec<SortField>>,
    default_key: Option<String>,
}

impl Sorting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field to `key`'s profile and return its handle for chaining
    pub fn add(&mut self, key: impl Into<String>, field: impl Into<String>) -> &mut SortField {
        let fields = self.profiles.entry(key.into()).or_default();
        fields.push(SortField::new(field.into()));
        fields.last_mut().unwrap()
    }

    /// Like [`add`](Self::add), also marking `key` as the default profile
    pub fn add_default(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
    ) -> &mut SortField {
        let key = key.into();
        self.default_key = Some(key.clone());
        self.add(key, field)
    }

    /// Resolve a requested `(key, ascending)` pair into physical clauses.
    ///
    /// Effective order per field is `reverse ? !ascending : ascending`.
    /// Missing placement follows the requested direction: unmarked fields put
    /// missing values first when ascending and last when descending;
    /// `missing_last` fields do the opposite.
    pub fn fill(&self, key: &str, ascending: bool) -> Result<Vec<SortClause>> {
        let fields = self
            .profiles
            .get(key)
            .ok_or_else(|| AppError::Validation(format!("Bad sort field: {}", key)))?;
        Ok(fields
            .iter()
            .map(|f| {
                let effective_ascending = if f.reverse { !ascending } else { ascending };
                let missing = match (f.missing_last, ascending) {
                    (true, true) | (false, false) => MissingPlacement::Last,
                    (true, false) | (false, true) => MissingPlacement::First,
                };
                SortClause {
                    field: f.field.clone(),
                    order: if effective_ascending {
                        SortOrder::Ascending
                    } else {
                        SortOrder::Descending
                    },
                    missing,
                }
            })
            .collect())
    }

    /// Resolve the default profile
    pub fn fill_default(&self, ascending: bool) -> Result<Vec<SortClause>> {
        let key = self
            .default_key
            .as_deref()
            .ok_or_else(|| AppError::Validation("No default sort field".to_string()))?;
        self.fill(key, ascending)
    }
}
