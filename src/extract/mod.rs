//! Message-to-record extraction.
//!
//! 1. `PatternExtractor`: labeled-line regexes, always available
//! 2. `ModelExtractor`: text-understanding service, degrades to empty
//! 3. `merge`: model value first, pattern value as fallback
//! 4. `ContextEnricher`: organization, vendor, submission date
//! 5. `normalize_record`: canonical field forms

pub mod context;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod patterns;
pub mod schema;

pub use context::ContextEnricher;
pub use merge::merge;
pub use model::{ModelExtraction, ModelExtractor};
pub use normalize::normalize_record;
pub use patterns::PatternExtractor;
pub use schema::{ContextField, ExtractedRecord, SchemaField};
