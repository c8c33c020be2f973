use serde::{Deserialize, Serialize};

use crate::model::definition::FilterDefinition;
use crate::model::errors::FilterDefinitionError;

/// Sort direction for root-level and collection-level ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(token: &str) -> Option<SortDirection> {
        match token.to_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// A single sort key: DTO field name plus direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        SortSpec {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortSpec {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Root pagination. The default page size is unbounded: a request without
/// `size` materializes every matching root row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: Option<u64>,
    pub size: Option<u64>,
    pub sort: Vec<SortSpec>,
}

/// A complete filter request: named filter definitions (insertion order
/// preserved), a DSL expression combining them, an optional projection and
/// optional pagination.
#[derive(Debug, Clone)]
pub struct FilterRequest {
    filters: Vec<(String, FilterDefinition)>,
    combine_with: String,
    projection: Option<Vec<String>>,
    pagination: Option<Pagination>,
}

impl FilterRequest {
    pub fn builder() -> FilterRequestBuilder {
        FilterRequestBuilder::default()
    }

    /// Validated constructor. Invariants: filters present require a non-blank
    /// expression; an expression without filters is an error.
    pub fn new(
        filters: Vec<(String, FilterDefinition)>,
        combine_with: impl Into<String>,
        projection: Option<Vec<String>>,
        pagination: Option<Pagination>,
    ) -> Result<Self, FilterDefinitionError> {
        let combine_with = combine_with.into();
        if !filters.is_empty() && combine_with.trim().is_empty() {
            return Err(FilterDefinitionError::MissingExpression);
        }
        if filters.is_empty() && !combine_with.trim().is_empty() {
            return Err(FilterDefinitionError::ExpressionWithoutFilters);
        }
        let mut seen: Vec<&str> = Vec::with_capacity(filters.len());
        for (name, _) in &filters {
            if seen.contains(&name.as_str()) {
                return Err(FilterDefinitionError::DuplicateFilter { name: name.clone() });
            }
            seen.push(name);
        }
        Ok(FilterRequest {
            filters,
            combine_with,
            projection,
            pagination,
        })
    }

    pub fn filters(&self) -> &[(String, FilterDefinition)] {
        &self.filters
    }

    pub fn filter(&self, name: &str) -> Option<&FilterDefinition> {
        self.filters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, def)| def)
    }

    pub fn filter_names(&self) -> Vec<String> {
        self.filters.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn combine_with(&self) -> &str {
        &self.combine_with
    }

    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    pub fn pagination(&self) -> Option<&Pagination> {
        self.pagination.as_ref()
    }
}

/// Fluent assembly for [`FilterRequest`]; `build` enforces the request
/// invariants.
#[derive(Debug, Default)]
pub struct FilterRequestBuilder {
    filters: Vec<(String, FilterDefinition)>,
    combine_with: String,
    projection: Option<Vec<String>>,
    pagination: Option<Pagination>,
}

impl FilterRequestBuilder {
    pub fn filter(mut self, name: impl Into<String>, definition: FilterDefinition) -> Self {
        self.filters.push((name.into(), definition));
        self
    }

    pub fn combine_with(mut self, expression: impl Into<String>) -> Self {
        self.combine_with = expression.into();
        self
    }

    pub fn project(mut self, path: impl Into<String>) -> Self {
        self.projection.get_or_insert_with(Vec::new).push(path.into());
        self
    }

    pub fn projection(mut self, paths: Vec<String>) -> Self {
        self.projection = Some(paths);
        self
    }

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn build(self) -> Result<FilterRequest, FilterDefinitionError> {
        FilterRequest::new(
            self.filters,
            self.combine_with,
            self.projection,
            self.pagination,
        )
    }
}
