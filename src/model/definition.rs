use std::sync::Arc;

use crate::model::operator::Operator;
use crate::model::property::PropertyRef;
use crate::model::value::FilterValue;

/// A named atomic filter: property reference, operator and an advisory value.
///
/// The value is not validated against the property type here; coercion and
/// operator-support checks happen when the compiled condition is resolved.
#[derive(Debug, Clone)]
pub struct FilterDefinition {
    property: Arc<dyn PropertyRef>,
    operator: Operator,
    value: FilterValue,
}

impl FilterDefinition {
    pub fn new(
        property: Arc<dyn PropertyRef>,
        operator: Operator,
        value: impl Into<FilterValue>,
    ) -> Self {
        FilterDefinition {
            property,
            operator,
            value: value.into(),
        }
    }

    pub fn property(&self) -> &Arc<dyn PropertyRef> {
        &self.property
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    /// The `PROP:OP` token this definition contributes to structural keys.
    pub fn structural_token(&self) -> String {
        format!("{}:{}", self.property.name(), self.operator.code())
    }
}
