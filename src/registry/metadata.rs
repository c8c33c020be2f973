//! Projection and persistence metadata, plus the process-wide registry the
//! planner resolves against. In the full system this metadata is emitted by
//! a code generator; initialization is the caller's responsibility.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::config::FieldCase;
use crate::projection::plan::Reducer;

/// What a collection field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionKind {
    Scalar,
    Embeddable,
    Entity,
}

/// The container shape of a collection field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionType {
    List,
    Set,
    Map,
}

/// Persistence metadata for one entity field.
#[derive(Debug, Clone)]
pub struct PersistenceMeta {
    pub related_type: Option<String>,
    pub is_collection: bool,
    pub mapped_by: Option<String>,
    pub order_by: Option<String>,
    pub collection_kind: CollectionKind,
    pub collection_type: CollectionType,
}

impl PersistenceMeta {
    /// A plain scalar column.
    pub fn scalar() -> Self {
        PersistenceMeta {
            related_type: None,
            is_collection: false,
            mapped_by: None,
            order_by: None,
            collection_kind: CollectionKind::Scalar,
            collection_type: CollectionType::List,
        }
    }

    /// A to-one reference to another entity.
    pub fn to_one(related: impl Into<String>) -> Self {
        PersistenceMeta {
            related_type: Some(related.into()),
            ..Self::scalar()
        }
    }

    /// A to-many entity collection.
    pub fn collection(related: impl Into<String>) -> Self {
        PersistenceMeta {
            related_type: Some(related.into()),
            is_collection: true,
            mapped_by: None,
            order_by: None,
            collection_kind: CollectionKind::Entity,
            collection_type: CollectionType::List,
        }
    }

    pub fn mapped_by(mut self, field: impl Into<String>) -> Self {
        self.mapped_by = Some(field.into());
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }
}

/// Entity metadata: id fields plus per-field persistence descriptors, in
/// declaration order (parent-reference discovery scans in this order).
#[derive(Debug, Clone)]
pub struct EntityMeta {
    pub name: String,
    pub id_fields: Vec<String>,
    pub fields: Vec<(String, PersistenceMeta)>,
}

impl EntityMeta {
    pub fn new(name: impl Into<String>, id_fields: Vec<String>) -> Self {
        EntityMeta {
            name: name.into(),
            id_fields,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, meta: PersistenceMeta) -> Self {
        self.fields.push((name.into(), meta));
        self
    }

    pub fn field_meta(&self, name: &str) -> Option<&PersistenceMeta> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, meta)| meta)
    }
}

/// One dependency of a computed field; a reducer makes it an aggregate over
/// a collection path.
#[derive(Debug, Clone)]
pub struct ComputedDependency {
    pub path: String,
    pub reducer: Option<Reducer>,
}

impl ComputedDependency {
    pub fn plain(path: impl Into<String>) -> Self {
        ComputedDependency {
            path: path.into(),
            reducer: None,
        }
    }

    pub fn reduced(path: impl Into<String>, reducer: Reducer) -> Self {
        ComputedDependency {
            path: path.into(),
            reducer: Some(reducer),
        }
    }
}

/// Declaration of a computed DTO field.
#[derive(Debug, Clone)]
pub struct ComputedMeta {
    pub dependencies: Vec<ComputedDependency>,
    /// Explicit computation method name; defaults to the field name.
    pub method: Option<String>,
}

/// One projected DTO field: its DTO name, the entity field it reads, an
/// optional nested projection type, and computed-field metadata when the
/// value is derived rather than fetched.
#[derive(Debug, Clone)]
pub struct ProjectionFieldMeta {
    pub dto_name: String,
    pub entity_field: String,
    pub projection: Option<String>,
    pub computed: Option<ComputedMeta>,
}

impl ProjectionFieldMeta {
    pub fn scalar(dto_name: impl Into<String>, entity_field: impl Into<String>) -> Self {
        ProjectionFieldMeta {
            dto_name: dto_name.into(),
            entity_field: entity_field.into(),
            projection: None,
            computed: None,
        }
    }

    pub fn nested(
        dto_name: impl Into<String>,
        entity_field: impl Into<String>,
        projection: impl Into<String>,
    ) -> Self {
        ProjectionFieldMeta {
            dto_name: dto_name.into(),
            entity_field: entity_field.into(),
            projection: Some(projection.into()),
            computed: None,
        }
    }

    pub fn computed(dto_name: impl Into<String>, meta: ComputedMeta) -> Self {
        let dto_name = dto_name.into();
        ProjectionFieldMeta {
            entity_field: dto_name.clone(),
            dto_name,
            projection: None,
            computed: Some(meta),
        }
    }
}

/// Projection (DTO) metadata: the entity it reads and its ordered fields.
#[derive(Debug, Clone)]
pub struct ProjectionMeta {
    pub name: String,
    pub entity: String,
    pub fields: Vec<ProjectionFieldMeta>,
}

impl ProjectionMeta {
    pub fn new(name: impl Into<String>, entity: impl Into<String>) -> Self {
        ProjectionMeta {
            name: name.into(),
            entity: entity.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: ProjectionFieldMeta) -> Self {
        self.fields.push(field);
        self
    }

    pub fn lookup_field(&self, name: &str, case: FieldCase) -> Option<&ProjectionFieldMeta> {
        match case {
            FieldCase::CaseSensitive => self.fields.iter().find(|f| f.dto_name == name),
            FieldCase::CaseInsensitive => self
                .fields
                .iter()
                .find(|f| f.dto_name.eq_ignore_ascii_case(name)),
        }
    }
}

lazy_static! {
    static ref PROJECTIONS: RwLock<HashMap<String, Arc<ProjectionMeta>>> =
        RwLock::new(HashMap::new());
    static ref ENTITIES: RwLock<HashMap<String, Arc<EntityMeta>>> = RwLock::new(HashMap::new());
}

/// Process-wide metadata service with `register` / `lookup` / `clear`.
pub struct MetadataRegistry;

impl MetadataRegistry {
    pub fn register_projection(meta: ProjectionMeta) {
        PROJECTIONS
            .write()
            .unwrap()
            .insert(meta.name.clone(), Arc::new(meta));
    }

    pub fn register_entity(meta: EntityMeta) {
        ENTITIES
            .write()
            .unwrap()
            .insert(meta.name.clone(), Arc::new(meta));
    }

    pub fn projection(name: &str) -> Option<Arc<ProjectionMeta>> {
        PROJECTIONS.read().unwrap().get(name).cloned()
    }

    pub fn entity(name: &str) -> Option<Arc<EntityMeta>> {
        ENTITIES.read().unwrap().get(name).cloned()
    }

    pub fn clear() {
        PROJECTIONS.write().unwrap().clear();
        ENTITIES.write().unwrap().clear();
    }
}
