use crate::entity::{AliasEntityId, EntityType};
use crate::query::{EntitySearchDirection, RelationEntityTypeFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entity alias as declared in a dashboard definition. Aliases are owned by
/// the dashboard and looked up by `id`; widgets reference them through their
/// datasource configs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityAlias {
    pub id: String,
    pub alias: String,
    pub filter: EntityAliasFilter,
    #[serde(default)]
    pub resolve_multiple: bool,
}

/// Root entity reference shared by the query-rooted filter variants. The
/// root is either a fixed entity or the entity bound in navigation state
/// (optionally under a named parameter, with a declared fallback).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRoot {
    #[serde(default)]
    pub root_state_entity: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_entity_param_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_state_entity: Option<AliasEntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_entity: Option<AliasEntityId>,
}

/// Declarative alias filter. Exactly one variant is active per value; an
/// invalid or unresolvable declaration resolves to "no result", never to a
/// different variant's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EntityAliasFilter {
    #[serde(rename_all = "camelCase")]
    SingleEntity { entity: AliasEntityId },
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
    StateEntity {
        #[serde(skip_serializing_if = "Option::is_none")]
        state_entity_param_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        default_state_entity: Option<AliasEntityId>,
    },
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
        #[serde(flatten)]
        root: QueryRoot,
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
        #[serde(flatten)]
        root: QueryRoot,
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
        #[serde(flatten)]
        root: QueryRoot,
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
        #[serde(flatten)]
        root: QueryRoot,
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
        #[serde(flatten)]
        root: QueryRoot,
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

/// Fieldless mirror of [`EntityAliasFilter`] used by classification logic
/// (which filter kinds are offered for a given allowed-entity-type set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AliasFilterKind {
    SingleEntity,
    EntityList,
    EntityName,
    EntityByType,
    StateEntity,
    AssetType,
    DeviceType,
    EdgeType,
    EntityViewType,
    RelationsQuery,
    AssetSearchQuery,
    DeviceSearchQuery,
    EdgeSearchQuery,
    EntityViewSearchQuery,
}

impl AliasFilterKind {
    pub const ALL: [AliasFilterKind; 14] = [
        AliasFilterKind::SingleEntity,
        AliasFilterKind::EntityList,
        AliasFilterKind::EntityName,
        AliasFilterKind::EntityByType,
        AliasFilterKind::StateEntity,
        AliasFilterKind::AssetType,
        AliasFilterKind::DeviceType,
        AliasFilterKind::EdgeType,
        AliasFilterKind::EntityViewType,
        AliasFilterKind::RelationsQuery,
        AliasFilterKind::AssetSearchQuery,
        AliasFilterKind::DeviceSearchQuery,
        AliasFilterKind::EdgeSearchQuery,
        AliasFilterKind::EntityViewSearchQuery,
    ];
}

impl EntityAliasFilter {
    pub fn kind(&self) -> AliasFilterKind {
        match self {
            EntityAliasFilter::SingleEntity { .. } => AliasFilterKind::SingleEntity,
            EntityAliasFilter::EntityList { .. } => AliasFilterKind::EntityList,
            EntityAliasFilter::EntityName { .. } => AliasFilterKind::EntityName,
            EntityAliasFilter::EntityByType { .. } => AliasFilterKind::EntityByType,
            EntityAliasFilter::StateEntity { .. } => AliasFilterKind::StateEntity,
            EntityAliasFilter::AssetType { .. } => AliasFilterKind::AssetType,
            EntityAliasFilter::DeviceType { .. } => AliasFilterKind::DeviceType,
            EntityAliasFilter::EdgeType { .. } => AliasFilterKind::EdgeType,
            EntityAliasFilter::EntityViewType { .. } => AliasFilterKind::EntityViewType,
            EntityAliasFilter::RelationsQuery { .. } => AliasFilterKind::RelationsQuery,
            EntityAliasFilter::AssetSearchQuery { .. } => AliasFilterKind::AssetSearchQuery,
            EntityAliasFilter::DeviceSearchQuery { .. } => AliasFilterKind::DeviceSearchQuery,
            EntityAliasFilter::EdgeSearchQuery { .. } => AliasFilterKind::EdgeSearchQuery,
            EntityAliasFilter::EntityViewSearchQuery { .. } => {
                AliasFilterKind::EntityViewSearchQuery
            }
        }
    }

    /// Whether resolution of this filter depends on navigation state.
    pub fn is_state_dependent(&self) -> bool {
        match self {
            EntityAliasFilter::StateEntity { .. } => true,
            EntityAliasFilter::RelationsQuery { root, .. }
            | EntityAliasFilter::AssetSearchQuery { root, .. }
            | EntityAliasFilter::DeviceSearchQuery { root, .. }
            | EntityAliasFilter::EdgeSearchQuery { root, .. }
            | EntityAliasFilter::EntityViewSearchQuery { root, .. } => root.root_state_entity,
            _ => false,
        }
    }
}

/// Named key-filter set declared on the dashboard. The predicate payload is
/// opaque to the engine; it is attached verbatim to outgoing queries. Tracked
/// separately from entity aliases for change notification purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub id: String,
    pub filter: String,
    #[serde(default)]
    pub key_filters: serde_json::Value,
    #[serde(default)]
    pub editable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::AliasEntityType;
    use serde_json::json;

    #[test]
    fn filter_tag_roundtrip() {
        let filter = EntityAliasFilter::StateEntity {
            state_entity_param_name: Some("selected".to_string()),
            default_state_entity: None,
        };
        let value = serde_json::to_value(&filter).unwrap();
        assert_eq!(value["type"], "stateEntity");
        assert_eq!(value["stateEntityParamName"], "selected");
        let back: EntityAliasFilter = serde_json::from_value(value).unwrap();
        assert_eq!(back, filter);
    }

    #[test]
    fn relations_query_flattens_root() {
        let filter = EntityAliasFilter::RelationsQuery {
            root: QueryRoot {
                root_state_entity: true,
                state_entity_param_name: None,
                default_state_entity: Some(AliasEntityId::pseudo(AliasEntityType::CurrentTenant)),
                root_entity: None,
            },
            direction: EntitySearchDirection::From,
            max_level: 2,
            fetch_last_level_only: false,
            filters: vec![RelationEntityTypeFilter {
                relation_type: "Contains".to_string(),
                entity_types: vec![EntityType::Device],
            }],
        };
        let value = serde_json::to_value(&filter).unwrap();
        assert_eq!(value["type"], "relationsQuery");
        assert_eq!(value["rootStateEntity"], true);
        let back: EntityAliasFilter = serde_json::from_value(value).unwrap();
        assert_eq!(back, filter);
    }

    #[test]
    fn kind_is_total() {
        for kind in AliasFilterKind::ALL {
            // every kind serializes to the same tag its filter uses
            let tag = serde_json::to_value(kind).unwrap();
            assert!(tag.is_string());
        }
    }
}
