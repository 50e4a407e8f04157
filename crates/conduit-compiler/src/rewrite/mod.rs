//! Pipeline rewrites
//!
//! A rewrite never edits the symbol table it reads from: it returns the
//! replacement transform together with a delta of new components.

pub mod group_by_key;
pub mod overrides;

pub use group_by_key::GroupByKeyReplacer;
pub use overrides::update_transform;

use crate::error::Result;
use conduit_core::{Components, PTransform};

/// A replacement transform plus the components it introduces
#[derive(Debug, Clone, PartialEq)]
pub struct MessageWithComponents {
    pub transform: PTransform,
    pub components: Components,
}

/// Produces the replacement for one transform of a pipeline
pub trait TransformReplacement {
    fn replacement(&self, transform_id: &str, components: &Components)
        -> Result<MessageWithComponents>;
}
