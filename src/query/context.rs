//! Per-request paging and selection parameters

use crate::error::{AppError, Result};

/// Hard ceiling on page size; requests asking for more are clamped
pub const MAX_LIMIT: usize = 500;
/// Page size when the caller does not set one
pub const DEFAULT_LIMIT: usize = 10;

/// Paging, facet-selection and field-selection parameters of one query
#[derive(Debug, Clone)]
pub struct QueryContext {
    offset: usize,
    limit: usize,
    facets: Vec<String>,
    fields: Vec<String>,
    scroll: bool,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
            facets: Vec::new(),
            fields: Vec::new(),
            scroll: false,
        }
    }
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn set_offset(&mut self, offset: usize) -> &mut Self {
        self.offset = offset;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Clamped into `[0, MAX_LIMIT]`
    pub fn set_limit(&mut self, limit: usize) -> &mut Self {
        self.limit = limit.min(MAX_LIMIT);
        self
    }

    /// Position the context on a 1-based page of `page_size` rows
    pub fn set_page(&mut self, page: usize, page_size: usize) -> Result<&mut Self> {
        if page < 1 {
            return Err(AppError::Validation(
                "Page must be greater than or equal to 1".to_string(),
            ));
        }
        self.set_limit(page_size);
        self.offset = page * self.limit - self.limit;
        Ok(self)
    }

    /// The 1-based page implied by the current offset and limit
    pub fn page(&self) -> usize {
        if self.limit == 0 {
            1
        } else {
            self.offset / self.limit + 1
        }
    }

    pub fn facets(&self) -> &[String] {
        &self.facets
    }

    pub fn has_facet(&self, name: &str) -> bool {
        self.facets.iter().any(|f| f == name)
    }

    /// Append facet names, keeping the ones already requested
    pub fn add_facets<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.has_facet(&name) {
                self.facets.push(name);
            }
        }
        self
    }

    /// Replace the facet set entirely
    pub fn set_facets<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.facets.clear();
        self.add_facets(names)
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Append returned-field names; an empty set means all fields
    pub fn add_fields<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.fields.contains(&name) {
                self.fields.push(name);
            }
        }
        self
    }

    /// Replace the returned-field set entirely
    pub fn set_fields<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.clear();
        self.add_fields(names)
    }

    pub fn scroll(&self) -> bool {
        self.scroll
    }

    pub fn set_scroll(&mut self, scroll: bool) -> &mut Self {
        self.scroll = scroll;
        self
    }
}
