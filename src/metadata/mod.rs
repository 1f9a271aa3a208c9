//! Per-container metadata: tags, fields, decode policy and pod labels.

mod cache;
pub mod pod;

pub use cache::{MalformedFieldError, MetadataCache, ResolvedMetadata, parse_fields};
