//! Process-wide services: projection/persistence metadata, computation
//! providers and custom operators. All are explicit `register` / `lookup` /
//! `clear` tables; nothing registers itself.

mod computation;
mod custom_ops;
mod metadata;

pub use computation::{ComputationProvider, ComputationRegistry, ComputeFn, FnComputationProvider};
pub use custom_ops::{CustomOperatorProvider, CustomOperators};
pub use metadata::{
    CollectionKind, CollectionType, ComputedDependency, ComputedMeta, EntityMeta,
    MetadataRegistry, PersistenceMeta, ProjectionFieldMeta, ProjectionMeta,
};
