//! Crate-level error aggregation. Each concern keeps its own enum; this type
//! exists so pipeline entry points can return one error surface.

use thiserror::Error;

use crate::dsl::errors::DslSyntaxError;
use crate::model::{FilterDefinitionError, FilterValidationError};
use crate::projection::errors::{
    ComputationResolutionError, DataSourceError, PlanConstructionError, ProjectionDefinitionError,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] DslSyntaxError),

    #[error(transparent)]
    Definition(#[from] FilterDefinitionError),

    #[error(transparent)]
    Validation(#[from] FilterValidationError),

    #[error(transparent)]
    Projection(#[from] ProjectionDefinitionError),

    #[error(transparent)]
    Plan(#[from] PlanConstructionError),

    #[error(transparent)]
    Computation(#[from] ComputationResolutionError),

    #[error(transparent)]
    Source(#[from] DataSourceError),

    #[error("request cancelled")]
    Cancelled,
}
