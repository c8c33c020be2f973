//! Projection planning: from requested DTO paths to a layered execution
//! plan. Metadata lookups resolve against the process-wide registry; a miss
//! is fatal to the request.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::ProjectionPolicy;
use crate::errors::Error;
use crate::model::Pagination;
use crate::projection::errors::{PlanConstructionError, ProjectionDefinitionError};
use crate::projection::fields::{self, CollectionOptions};
use crate::projection::plan::{
    AggregateSpec, CollectionPage, CollectionPlan, ComputedFieldPlan, DependencySlot,
    ExecutionPlan,
};
use crate::projection::schema::FieldSchemaBuilder;
use crate::projection::source::SortKey;
use crate::registry::{
    ComputationRegistry, ComputedMeta, EntityMeta, MetadataRegistry, ProjectionMeta,
};

/// One collection crossing discovered while resolving paths.
#[derive(Debug, Clone)]
struct CollectionEdge {
    path: String,
    parent_path: Option<String>,
    parent_entity: String,
    element_entity: String,
    element_projection: String,
    mapped_by: Option<String>,
    /// Declared default ordering of the collection field.
    order_by: Option<String>,
    depth: usize,
}

/// Classification of one expanded DTO path.
#[derive(Debug, Clone)]
enum ResolvedPath {
    Scalar {
        entity_path: String,
        dto_path: String,
    },
    Computed {
        dto_field: String,
        meta: ComputedMeta,
    },
    /// A scalar inside a collection; `collection` names the innermost edge.
    CollectionScalar {
        collection: String,
        entity_path: String,
        dto_path: String,
    },
    /// A bare collection path; expands to the element projection's scalars.
    CollectionWhole { collection: String },
}

pub struct ProjectionPlanner {
    policy: ProjectionPolicy,
}

impl ProjectionPlanner {
    pub fn new(policy: ProjectionPolicy) -> Self {
        ProjectionPlanner { policy }
    }

    /// Compute the execution plan for `dto` with the requested paths.
    pub fn plan(
        &self,
        dto: &str,
        paths: &[String],
        pagination: Option<&Pagination>,
    ) -> Result<ExecutionPlan, Error> {
        let expanded = fields::expand(paths)?;

        let root_projection = MetadataRegistry::projection(dto).ok_or_else(|| {
            PlanConstructionError::MissingProjection {
                projection: dto.to_string(),
            }
        })?;
        let root_entity = lookup_entity(&root_projection.entity)?;

        // Classify every path, collecting collection edges along the way.
        let mut edges: HashMap<String, CollectionEdge> = HashMap::new();
        let mut resolved: Vec<ResolvedPath> = Vec::new();
        for path in &expanded.paths {
            resolved.push(self.resolve_path(&root_projection, &root_entity, path, &mut edges)?);
        }

        // Bare collection paths project the element DTO's plain scalars.
        let mut flattened: Vec<ResolvedPath> = Vec::new();
        for entry in resolved {
            match entry {
                ResolvedPath::CollectionWhole { collection } => {
                    let edge = &edges[&collection];
                    let element_projection = lookup_projection(&edge.element_projection)?;
                    let element_entity = lookup_entity(&edge.element_entity)?;
                    for field in &element_projection.fields {
                        if field.computed.is_some() {
                            continue;
                        }
                        let meta = match element_entity.field_meta(&field.entity_field) {
                            Some(meta) => meta,
                            None => continue,
                        };
                        if meta.is_collection || meta.related_type.is_some() {
                            continue;
                        }
                        flattened.push(ResolvedPath::CollectionScalar {
                            collection: collection.clone(),
                            entity_path: field.entity_field.clone(),
                            dto_path: field.dto_name.clone(),
                        });
                    }
                }
                other => flattened.push(other),
            }
        }

        // Options must target a collection edge; re-key them under the
        // edge's canonical path so case-insensitive lookups line up.
        let mut options: HashMap<String, CollectionOptions> = HashMap::new();
        for (path, opts) in expanded.options {
            let canonical = edges
                .keys()
                .find(|edge_path| match self.policy.field_case {
                    crate::config::FieldCase::CaseSensitive => *edge_path == &path,
                    crate::config::FieldCase::CaseInsensitive => {
                        edge_path.eq_ignore_ascii_case(&path)
                    }
                })
                .cloned()
                .ok_or(ProjectionDefinitionError::OptionsOnScalar { path })?;
            options.insert(canonical, opts);
        }

        // Root schema: projected scalars and computed outputs in request
        // order, then hidden id slots.
        let mut root_builder = FieldSchemaBuilder::new();
        let mut computed_inputs: Vec<(String, ComputedMeta, usize)> = Vec::new();
        for entry in &flattened {
            match entry {
                ResolvedPath::Scalar {
                    entity_path,
                    dto_path,
                } => {
                    root_builder.scalar(entity_path, dto_path, false);
                }
                ResolvedPath::Computed { dto_field, meta } => {
                    let slot = root_builder.computed(dto_field);
                    computed_inputs.push((dto_field.clone(), meta.clone(), slot));
                }
                _ => {}
            }
        }
        for edge in edges.values().filter(|e| e.parent_path.is_none()) {
            root_builder.collection(&edge.path);
        }
        let mut root_id_slots = Vec::with_capacity(root_entity.id_fields.len());
        for id_field in &root_entity.id_fields {
            root_id_slots.push(root_builder.scalar(id_field, id_field, true));
        }

        // Computed-field descriptors: plain dependencies read root slots
        // (adding hidden ones as needed), reducer dependencies become batch
        // aggregates marked with slot -1.
        let mut dependency_only_slots: Vec<usize> = Vec::new();
        let mut computed_plans: Vec<ComputedFieldPlan> = Vec::new();
        for (dto_field, meta, output_slot) in computed_inputs {
            let mut dependencies = Vec::with_capacity(meta.dependencies.len());
            for dependency in &meta.dependencies {
                if let Some(reducer) = dependency.reducer {
                    let spec = self.resolve_aggregate(
                        &root_projection,
                        &root_entity,
                        &dependency.path,
                        reducer,
                        &dto_field,
                    )?;
                    dependencies.push(DependencySlot {
                        path: dependency.path.clone(),
                        slot: -1,
                        aggregate: Some(spec),
                    });
                } else {
                    let mut scratch_edges = HashMap::new();
                    let entry = self.resolve_path(
                        &root_projection,
                        &root_entity,
                        &dependency.path,
                        &mut scratch_edges,
                    )?;
                    let ResolvedPath::Scalar {
                        entity_path,
                        dto_path,
                    } = entry
                    else {
                        return Err(PlanConstructionError::UnresolvableDependency {
                            field: dto_field.clone(),
                            dependency: dependency.path.clone(),
                        }
                        .into());
                    };
                    let already = root_builder.contains_entity_path(&entity_path);
                    let slot = root_builder.scalar(&entity_path, &dto_path, true);
                    if !already {
                        dependency_only_slots.push(slot);
                    }
                    dependencies.push(DependencySlot {
                        path: dependency.path.clone(),
                        slot: slot as i64,
                        aggregate: None,
                    });
                }
            }
            let method = meta.method.as_deref().unwrap_or(&dto_field);
            let compute = ComputationRegistry::resolve(dto, method, dependencies.len())?;
            computed_plans.push(ComputedFieldPlan {
                dto_field,
                output_slot,
                dependencies,
                compute,
            });
        }

        let root_schema = Arc::new(root_builder.build());
        let root_sort = resolve_root_sort(&root_projection, pagination, self.policy)?;

        // Collection plans, grouped by depth.
        let mut collections: BTreeMap<usize, Vec<CollectionPlan>> = BTreeMap::new();
        let mut ordered_edges: Vec<&CollectionEdge> = edges.values().collect();
        ordered_edges.sort_by(|a, b| (a.depth, &a.path).cmp(&(b.depth, &b.path)));
        for edge in ordered_edges {
            let plan =
                self.build_collection_plan(edge, &edges, &flattened, options.get(&edge.path))?;
            collections.entry(edge.depth).or_default().push(plan);
        }

        let plan = ExecutionPlan {
            dto: dto.to_string(),
            root_entity: root_entity.name.clone(),
            root_schema,
            root_id_slots,
            root_sort,
            collections,
            computed: computed_plans,
            dependency_only_slots,
        };
        log::debug!("{}", plan.describe());
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("\n{}", plan.explain());
        }
        Ok(plan)
    }

    /// Walk one dot path through projection and persistence metadata.
    fn resolve_path(
        &self,
        root_projection: &Arc<ProjectionMeta>,
        root_entity: &Arc<EntityMeta>,
        dto_path: &str,
        edges: &mut HashMap<String, CollectionEdge>,
    ) -> Result<ResolvedPath, Error> {
        let segments: Vec<&str> = dto_path.split('.').collect();
        let mut projection = Arc::clone(root_projection);
        let mut entity = Arc::clone(root_entity);
        // Entity fields walked since the last collection edge (to-one hops).
        let mut entity_prefix: Vec<String> = Vec::new();
        let mut dto_prefix: Vec<String> = Vec::new();
        let mut walked: Vec<String> = Vec::new();
        let mut innermost: Option<String> = None;
        let mut depth = 0usize;

        for (index, segment) in segments.iter().enumerate() {
            let last = index == segments.len() - 1;
            let field = projection
                .lookup_field(segment, self.policy.field_case)
                .ok_or_else(|| ProjectionDefinitionError::UnknownField {
                    projection: projection.name.clone(),
                    field: (*segment).to_string(),
                })?
                .clone();
            walked.push(field.dto_name.clone());

            if let Some(meta) = field.computed.clone() {
                if segments.len() != 1 {
                    return Err(ProjectionDefinitionError::MalformedPath {
                        path: dto_path.to_string(),
                        reason: "computed fields project at the root level only".to_string(),
                    }
                    .into());
                }
                return Ok(ResolvedPath::Computed {
                    dto_field: field.dto_name,
                    meta,
                });
            }

            let persistence = entity.field_meta(&field.entity_field).ok_or_else(|| {
                PlanConstructionError::MissingField {
                    entity: entity.name.clone(),
                    field: field.entity_field.clone(),
                }
            })?;

            if persistence.is_collection {
                if !entity_prefix.is_empty() {
                    return Err(ProjectionDefinitionError::MalformedPath {
                        path: dto_path.to_string(),
                        reason: "collections must attach directly to their parent level"
                            .to_string(),
                    }
                    .into());
                }
                if persistence.collection_kind != crate::registry::CollectionKind::Entity {
                    return Err(ProjectionDefinitionError::MalformedPath {
                        path: dto_path.to_string(),
                        reason: "only entity collections are projectable".to_string(),
                    }
                    .into());
                }
                let element_entity = persistence.related_type.clone().ok_or_else(|| {
                    PlanConstructionError::MissingField {
                        entity: entity.name.clone(),
                        field: field.entity_field.clone(),
                    }
                })?;
                let element_projection = field.projection.clone().ok_or_else(|| {
                    PlanConstructionError::MissingProjection {
                        projection: format!("{}::{}", projection.name, field.dto_name),
                    }
                })?;

                let collection_path = walked.join(".");
                depth += 1;
                edges.entry(collection_path.clone()).or_insert(CollectionEdge {
                    path: collection_path.clone(),
                    parent_path: innermost.clone(),
                    parent_entity: entity.name.clone(),
                    element_entity: element_entity.clone(),
                    element_projection: element_projection.clone(),
                    mapped_by: persistence.mapped_by.clone(),
                    order_by: persistence.order_by.clone(),
                    depth,
                });

                if last {
                    return Ok(ResolvedPath::CollectionWhole {
                        collection: collection_path,
                    });
                }
                projection = lookup_projection(&element_projection)?;
                entity = lookup_entity(&element_entity)?;
                entity_prefix.clear();
                dto_prefix.clear();
                innermost = Some(collection_path);
                continue;
            }

            if let Some(related) = persistence.related_type.clone() {
                if last {
                    // A bare to-one reference projects as a single column.
                    entity_prefix.push(field.entity_field.clone());
                    dto_prefix.push(field.dto_name.clone());
                    break;
                }
                let nested_projection = field.projection.clone().ok_or_else(|| {
                    PlanConstructionError::MissingProjection {
                        projection: format!("{}::{}", projection.name, field.dto_name),
                    }
                })?;
                projection = lookup_projection(&nested_projection)?;
                // Embeddables stay addressed on the current entity through a
                // dotted path; real entities switch metadata.
                if let Some(related_entity) = MetadataRegistry::entity(&related) {
                    entity = related_entity;
                }
                entity_prefix.push(field.entity_field.clone());
                dto_prefix.push(field.dto_name.clone());
                continue;
            }

            if !last {
                return Err(ProjectionDefinitionError::MalformedPath {
                    path: dto_path.to_string(),
                    reason: format!("`{segment}` is a scalar and cannot be traversed"),
                }
                .into());
            }
            entity_prefix.push(field.entity_field.clone());
            dto_prefix.push(field.dto_name.clone());
        }

        let entity_path = entity_prefix.join(".");
        match innermost {
            None => Ok(ResolvedPath::Scalar {
                entity_path,
                dto_path: dto_prefix.join("."),
            }),
            Some(collection) => Ok(ResolvedPath::CollectionScalar {
                collection,
                entity_path,
                dto_path: dto_prefix.join("."),
            }),
        }
    }

    /// Resolve a reducer dependency such as `orders.amount` into its batch
    /// aggregate spec. Aggregates run one collection edge below the root.
    fn resolve_aggregate(
        &self,
        root_projection: &Arc<ProjectionMeta>,
        root_entity: &Arc<EntityMeta>,
        path: &str,
        reducer: crate::projection::plan::Reducer,
        dto_field: &str,
    ) -> Result<AggregateSpec, Error> {
        let mut edges = HashMap::new();
        let entry = self.resolve_path(root_projection, root_entity, path, &mut edges)?;
        let ResolvedPath::CollectionScalar {
            collection,
            entity_path,
            ..
        } = entry
        else {
            return Err(PlanConstructionError::UnresolvableDependency {
                field: dto_field.to_string(),
                dependency: path.to_string(),
            }
            .into());
        };
        let edge = &edges[&collection];
        if edge.depth != 1 {
            return Err(PlanConstructionError::UnresolvableDependency {
                field: dto_field.to_string(),
                dependency: path.to_string(),
            }
            .into());
        }
        let element_entity = lookup_entity(&edge.element_entity)?;
        let parent_reference_field = discover_parent_reference(edge, &element_entity)?;
        Ok(AggregateSpec {
            collection_path: collection,
            entity: edge.element_entity.clone(),
            parent_reference_field,
            parent_id_fields: root_entity.id_fields.clone(),
            value_field: entity_path,
            reducer,
        })
    }

    fn build_collection_plan(
        &self,
        edge: &CollectionEdge,
        edges: &HashMap<String, CollectionEdge>,
        resolved: &[ResolvedPath],
        options: Option<&CollectionOptions>,
    ) -> Result<CollectionPlan, Error> {
        let element_entity = lookup_entity(&edge.element_entity)?;
        let element_projection = lookup_projection(&edge.element_projection)?;
        let parent_entity = lookup_entity(&edge.parent_entity)?;
        let parent_reference_field = discover_parent_reference(edge, &element_entity)?;

        let mut builder = FieldSchemaBuilder::new();
        for entry in resolved {
            if let ResolvedPath::CollectionScalar {
                collection,
                entity_path,
                dto_path,
            } = entry
            {
                if collection == &edge.path {
                    builder.scalar(entity_path, dto_path, false);
                }
            }
        }

        let mut element_id_slots = Vec::with_capacity(element_entity.id_fields.len());
        for id_field in &element_entity.id_fields {
            element_id_slots.push(builder.scalar(id_field, id_field, true));
        }
        let mut parent_ref_slots = Vec::with_capacity(parent_entity.id_fields.len());
        for (index, parent_id) in parent_entity.id_fields.iter().enumerate() {
            let entity_path = format!("{parent_reference_field}.{parent_id}");
            let alias = format!("_i_pid_{index}");
            parent_ref_slots.push(builder.scalar(&entity_path, &alias, true));
        }
        for child_edge in edges.values() {
            if child_edge.parent_path.as_deref() == Some(edge.path.as_str()) {
                let child_name = child_edge
                    .path
                    .rsplit('.')
                    .next()
                    .unwrap_or(child_edge.path.as_str());
                builder.collection(child_name);
            }
        }

        let mut sort = Vec::new();
        let mut page = CollectionPage::default();
        if let Some(options) = options {
            page.limit = options.limit;
            page.offset = options.offset;
            for key in &options.sort {
                let field = element_projection
                    .lookup_field(&key.field, self.policy.field_case)
                    .ok_or_else(|| PlanConstructionError::UnknownSortField {
                        path: edge.path.clone(),
                        field: key.field.clone(),
                    })?;
                let slot = builder.scalar(&field.entity_field, &field.dto_name, true);
                sort.push((slot, key.direction));
            }
        }
        if sort.is_empty() {
            // Fall back to the collection field's declared ordering, which
            // names entity fields directly ("date desc, id").
            if let Some(clause) = &edge.order_by {
                for part in clause.split(',') {
                    let mut words = part.split_whitespace();
                    let Some(field) = words.next() else { continue };
                    let direction = words
                        .next()
                        .and_then(crate::model::SortDirection::parse)
                        .unwrap_or(crate::model::SortDirection::Asc);
                    let slot = builder.scalar(field, field, true);
                    sort.push((slot, direction));
                }
            }
        }

        Ok(CollectionPlan {
            depth: edge.depth,
            path: edge.path.clone(),
            entity: edge.element_entity.clone(),
            parent_entity: edge.parent_entity.clone(),
            parent_path: edge.parent_path.clone(),
            parent_reference_field,
            parent_id_fields: parent_entity.id_fields.clone(),
            element_id_fields: element_entity.id_fields.clone(),
            schema: Arc::new(builder.build()),
            parent_ref_slots,
            element_id_slots,
            page,
            sort,
        })
    }
}

fn lookup_projection(name: &str) -> Result<Arc<ProjectionMeta>, Error> {
    MetadataRegistry::projection(name).ok_or_else(|| {
        PlanConstructionError::MissingProjection {
            projection: name.to_string(),
        }
        .into()
    })
}

fn lookup_entity(name: &str) -> Result<Arc<EntityMeta>, Error> {
    MetadataRegistry::entity(name).ok_or_else(|| {
        PlanConstructionError::MissingEntity {
            entity: name.to_string(),
        }
        .into()
    })
}

/// Parent-reference discovery: the declared `mapped_by` back-reference, then
/// a scan for a to-one field typed as the parent entity, then the
/// lower-first naming convention.
fn discover_parent_reference(
    edge: &CollectionEdge,
    element_entity: &Arc<EntityMeta>,
) -> Result<String, Error> {
    if let Some(mapped_by) = &edge.mapped_by {
        return Ok(mapped_by.clone());
    }
    for (name, meta) in &element_entity.fields {
        if !meta.is_collection && meta.related_type.as_deref() == Some(edge.parent_entity.as_str())
        {
            return Ok(name.clone());
        }
    }
    let convention = lower_first(&edge.parent_entity);
    if element_entity.field_meta(&convention).is_some() {
        return Ok(convention);
    }
    Err(PlanConstructionError::ParentReferenceUndiscoverable {
        element: element_entity.name.clone(),
        parent: edge.parent_entity.clone(),
    }
    .into())
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Root ordering comes from the request's pagination sort; fields resolve
/// through the root projection so unprojected columns still order.
fn resolve_root_sort(
    root_projection: &Arc<ProjectionMeta>,
    pagination: Option<&Pagination>,
    policy: ProjectionPolicy,
) -> Result<Vec<SortKey>, Error> {
    let mut out = Vec::new();
    if let Some(pagination) = pagination {
        for key in &pagination.sort {
            let field = root_projection
                .lookup_field(&key.field, policy.field_case)
                .ok_or_else(|| PlanConstructionError::UnknownSortField {
                    path: root_projection.name.clone(),
                    field: key.field.clone(),
                })?;
            out.push(SortKey {
                entity_path: field.entity_field.clone(),
                direction: key.direction,
            });
        }
    }
    Ok(out)
}
