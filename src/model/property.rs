use std::fmt;
use std::sync::Arc;

use crate::model::operator::Operator;
use crate::model::value::FieldType;

/// A typed, enumerated reference to a filterable property of an entity.
///
/// Implementations form a closed set per entity (typically an enum generated
/// alongside the entity's schema). The operator set is validated when a
/// condition leaf is resolved, not when a definition is constructed.
pub trait PropertyRef: Send + Sync + fmt::Debug {
    /// Canonical property name used in structural cache keys.
    fn name(&self) -> &str;

    /// Logical entity type the property belongs to.
    fn entity(&self) -> &str;

    /// Declared value type of the property.
    fn value_type(&self) -> &FieldType;

    /// Operators this property supports.
    fn supported_operators(&self) -> &[Operator];

    /// Whether `op` is in the supported set. Custom codes compare
    /// case-insensitively.
    fn supports(&self, op: &Operator) -> bool {
        self.supported_operators().iter().any(|candidate| match (candidate, op) {
            (Operator::Custom(a), Operator::Custom(b)) => a.eq_ignore_ascii_case(b),
            (a, b) => a == b,
        })
    }
}

/// Plain-struct [`PropertyRef`] for dynamically assembled schemas and tests.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    name: String,
    entity: String,
    value_type: FieldType,
    operators: Vec<Operator>,
}

impl PropertySpec {
    pub fn new(
        name: impl Into<String>,
        entity: impl Into<String>,
        value_type: FieldType,
        operators: Vec<Operator>,
    ) -> Self {
        PropertySpec {
            name: name.into(),
            entity: entity.into(),
            value_type,
            operators,
        }
    }

    /// Convenience constructor with the full comparison operator set.
    pub fn comparable(
        name: impl Into<String>,
        entity: impl Into<String>,
        value_type: FieldType,
    ) -> Self {
        Self::new(
            name,
            entity,
            value_type,
            vec![
                Operator::Eq,
                Operator::Ne,
                Operator::Gt,
                Operator::Gte,
                Operator::Lt,
                Operator::Lte,
                Operator::In,
                Operator::NotIn,
                Operator::IsNull,
                Operator::NotNull,
                Operator::Range,
                Operator::NotRange,
            ],
        )
    }

    pub fn into_ref(self) -> Arc<dyn PropertyRef> {
        Arc::new(self)
    }
}

impl PropertyRef for PropertySpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn entity(&self) -> &str {
        &self.entity
    }

    fn value_type(&self) -> &FieldType {
        &self.value_type
    }

    fn supported_operators(&self) -> &[Operator] {
        &self.operators
    }
}
