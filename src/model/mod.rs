//! Core data model: operators, values, property references, filter
//! definitions and requests.

mod definition;
mod errors;
mod operator;
mod property;
mod request;
mod value;

pub use definition::FilterDefinition;
pub use errors::{FilterDefinitionError, FilterValidationError};
pub use operator::{Operator, OperatorArity};
pub use property::{PropertyRef, PropertySpec};
pub use request::{FilterRequest, FilterRequestBuilder, Pagination, SortDirection, SortSpec};
pub use value::{FieldType, FilterValue};
