use thiserror::Error;

/// Errors in the projection request itself: unknown DTO fields, malformed
/// paths, bad collection options.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionDefinitionError {
    #[error("unknown projection `{name}`")]
    UnknownProjection { name: String },

    #[error("projection `{projection}` has no field `{field}`")]
    UnknownField { projection: String, field: String },

    #[error("malformed projection path `{path}`: {reason}")]
    MalformedPath { path: String, reason: String },

    #[error("invalid collection option `{option}` on `{path}`: {reason}")]
    InvalidCollectionOption {
        path: String,
        option: String,
        reason: String,
    },

    #[error("collection options on `{path}` target a non-collection field")]
    OptionsOnScalar { path: String },
}

/// Fatal plan-construction failures: metadata lookups that miss, parent
/// references that cannot be discovered, sort fields that do not exist.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanConstructionError {
    #[error("no entity metadata registered for `{entity}`")]
    MissingEntity { entity: String },

    #[error("entity `{entity}` has no persistence metadata for field `{field}`")]
    MissingField { entity: String, field: String },

    #[error("no projection metadata registered for `{projection}`")]
    MissingProjection { projection: String },

    #[error(
        "cannot determine the parent reference field on `{element}` for parent `{parent}`"
    )]
    ParentReferenceUndiscoverable { element: String, parent: String },

    #[error("sort field `{field}` is not part of the collection `{path}` schema")]
    UnknownSortField { path: String, field: String },

    #[error("computed field `{field}` depends on `{dependency}` which is not projectable")]
    UnresolvableDependency { field: String, dependency: String },
}

/// A computed field whose computation method cannot be resolved; carries the
/// providers that were searched.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "no computation registered for `{dto}.{field}` with {arity} dependencies \
     (searched providers: {})", searched.join(", ")
)]
pub struct ComputationResolutionError {
    pub dto: String,
    pub field: String,
    pub arity: usize,
    pub searched: Vec<String>,
}

/// Data-source failures surface unmodified; the core never retries them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataSourceError {
    #[error("data source error: {message}")]
    Backend { message: String },

    #[error(
        "child row of `{entity}` references parent id {parent_key} which was never materialized"
    )]
    OrphanChildRow { entity: String, parent_key: String },

    #[error("data source returned {actual} columns, expected {expected}")]
    ColumnCountMismatch { expected: usize, actual: usize },
}

impl DataSourceError {
    pub fn backend(message: impl Into<String>) -> Self {
        DataSourceError::Backend {
            message: message.into(),
        }
    }
}
