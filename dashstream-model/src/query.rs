use crate::entity::{EntityId, EntityInfo, EntityType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Direction of relation traversal relative to the root entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitySearchDirection {
    From,
    To,
}

/// Relation predicate used by relation-query filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationEntityTypeFilter {
    pub relation_type: String,
    #[serde(default)]
    pub entity_types: Vec<EntityType>,
}

/// Concrete query filter produced by alias resolution. Unlike
/// [`crate::alias::EntityAliasFilter`] every root reference here is a real
/// entity id; the backend can execute it without further context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EntityFilter {
    #[serde(rename_all = "camelCase")]
    SingleEntity { entity: EntityId },
    #[serde(rename_all = "camelCase")]
    EntityList {
        entity_type: EntityType,
        entity_list: Vec<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    EntityName {
        entity_type: EntityType,
        entity_name_filter: String,
    },
    #[serde(rename_all = "camelCase")]
    EntityByType { entity_type: EntityType },
    #[serde(rename_all = "camelCase")]
    AssetType {
        #[serde(default)]
        asset_types: Vec<String>,
        #[serde(default)]
        asset_name_filter: String,
    },
    #[serde(rename_all = "camelCase")]
    DeviceType {
        #[serde(default)]
        device_types: Vec<String>,
        #[serde(default)]
        device_name_filter: String,
    },
    #[serde(rename_all = "camelCase")]
    EdgeType {
        #[serde(default)]
        edge_types: Vec<String>,
        #[serde(default)]
        edge_name_filter: String,
    },
    #[serde(rename_all = "camelCase")]
    EntityViewType {
        #[serde(default)]
        entity_view_types: Vec<String>,
        #[serde(default)]
        entity_view_name_filter: String,
    },
    #[serde(rename_all = "camelCase")]
    RelationsQuery {
        root_entity: EntityId,
        direction: EntitySearchDirection,
        #[serde(default)]
        max_level: i32,
        #[serde(default)]
        fetch_last_level_only: bool,
        #[serde(default)]
        filters: Vec<RelationEntityTypeFilter>,
    },
    #[serde(rename_all = "camelCase")]
    AssetSearchQuery {
        root_entity: EntityId,
        direction: EntitySearchDirection,
        #[serde(default)]
        max_level: i32,
        #[serde(default)]
        fetch_last_level_only: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        relation_type: Option<String>,
        #[serde(default)]
        asset_types: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    DeviceSearchQuery {
        root_entity: EntityId,
        direction: EntitySearchDirection,
        #[serde(default)]
        max_level: i32,
        #[serde(default)]
        fetch_last_level_only: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        relation_type: Option<String>,
        #[serde(default)]
        device_types: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    EdgeSearchQuery {
        root_entity: EntityId,
        direction: EntitySearchDirection,
        #[serde(default)]
        max_level: i32,
        #[serde(default)]
        fetch_last_level_only: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        relation_type: Option<String>,
        #[serde(default)]
        edge_types: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    EntityViewSearchQuery {
        root_entity: EntityId,
        direction: EntitySearchDirection,
        #[serde(default)]
        max_level: i32,
        #[serde(default)]
        fetch_last_level_only: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        relation_type: Option<String>,
        #[serde(default)]
        entity_view_types: Vec<String>,
    },
}

/// Key classes addressable by an entity data query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKeyType {
    Attribute,
    TimeSeries,
    EntityField,
    AlarmField,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityKey {
    #[serde(rename = "type")]
    pub key_type: EntityKeyType,
    pub key: String,
}

impl EntityKey {
    pub fn new(key_type: EntityKeyType, key: impl Into<String>) -> Self {
        Self {
            key_type,
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLink {
    pub page_size: usize,
    pub page: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_search: Option<String>,
}

impl PageLink {
    pub fn new(page_size: usize, page: usize) -> Self {
        Self {
            page_size,
            page,
            text_search: None,
        }
    }
}

/// Paged query executed by the backend query collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDataQuery {
    pub entity_filter: EntityFilter,
    pub page_link: PageLink,
    #[serde(default)]
    pub entity_fields: Vec<EntityKey>,
    #[serde(default)]
    pub latest_values: Vec<EntityKey>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub key_filters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData<T> {
    pub data: Vec<T>,
    pub total_pages: usize,
    pub total_elements: usize,
    pub has_next: bool,
}

impl<T> PageData<T> {
    pub fn single_page(data: Vec<T>) -> Self {
        let total = data.len();
        Self {
            data,
            total_pages: 1,
            total_elements: total,
            has_next: false,
        }
    }
}

impl<T> Default for PageData<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            total_pages: 0,
            total_elements: 0,
            has_next: false,
        }
    }
}

/// One row of an executed entity data query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityData {
    pub entity_id: EntityId,
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub latest: HashMap<String, serde_json::Value>,
}

impl EntityData {
    pub fn entity_info(&self) -> EntityInfo {
        EntityInfo {
            id: self.entity_id,
            name: self.name.clone(),
            label: self.label.clone(),
        }
    }
}

/// Available data keys grouped by class, as reported by the key query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeysByType {
    #[serde(default)]
    pub timeseries: Vec<String>,
    #[serde(default)]
    pub attribute: Vec<String>,
}

/// Relation traversal query executed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRelationsQuery {
    pub root_entity: EntityId,
    pub direction: EntitySearchDirection,
    pub max_level: i32,
    #[serde(default)]
    pub fetch_last_level_only: bool,
    #[serde(default)]
    pub filters: Vec<RelationEntityTypeFilter>,
}

/// Typed search query (assets/devices/edges/entity views related to a root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySearchQuery {
    pub root_entity: EntityId,
    pub direction: EntitySearchDirection,
    pub max_level: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<String>,
    pub entity_type: EntityType,
    #[serde(default)]
    pub types: Vec<String>,
}

impl EntityFilter {
    /// Same-tag check used by the tag-preservation tests.
    pub fn kind(&self) -> crate::alias::AliasFilterKind {
        use crate::alias::AliasFilterKind as K;
        match self {
            EntityFilter::SingleEntity { .. } => K::SingleEntity,
            EntityFilter::EntityList { .. } => K::EntityList,
            EntityFilter::EntityName { .. } => K::EntityName,
            EntityFilter::EntityByType { .. } => K::EntityByType,
            EntityFilter::AssetType { .. } => K::AssetType,
            EntityFilter::DeviceType { .. } => K::DeviceType,
            EntityFilter::EdgeType { .. } => K::EdgeType,
            EntityFilter::EntityViewType { .. } => K::EntityViewType,
            EntityFilter::RelationsQuery { .. } => K::RelationsQuery,
            EntityFilter::AssetSearchQuery { .. } => K::AssetSearchQuery,
            EntityFilter::DeviceSearchQuery { .. } => K::DeviceSearchQuery,
            EntityFilter::EdgeSearchQuery { .. } => K::EdgeSearchQuery,
            EntityFilter::EntityViewSearchQuery { .. } => K::EntityViewSearchQuery,
        }
    }
}
