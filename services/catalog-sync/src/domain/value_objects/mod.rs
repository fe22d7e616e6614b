//! 值对象模块

mod canonical_code;
mod content_hash;
mod ids;

pub use canonical_code::{CanonicalCode, canonicalize};
pub use content_hash::ContentHash;
pub use ids::{DownstreamId, MappingId, SourceProductId};
