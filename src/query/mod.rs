//! Query-side helpers: paging context, sort profiles, sticky facets

mod context;
mod facets;
mod sorting;

pub use context::{QueryContext, DEFAULT_LIMIT, MAX_LIMIT};
pub use facets::{FacetValue, Facets, StickyFacetBuilder, DEFAULT_FACET_SIZE, SELECTED_SUFFIX};
pub use sorting::{SortField, Sorting};
