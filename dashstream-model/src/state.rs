use crate::entity::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parameters bound to a navigation state entry. The entity binding is the
/// common case; named sub-params let one state carry several independent
/// bindings ("state entity" filters pick one by `stateEntityParamName`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_entity_param_name: Option<String>,
    #[serde(flatten, skip_serializing_if = "HashMap::is_empty", default)]
    pub sub_params: HashMap<String, StateParams>,
}

impl StateParams {
    pub fn with_entity(entity_id: EntityId) -> Self {
        Self {
            entity_id: Some(entity_id),
            ..Default::default()
        }
    }

    /// Entity binding under `param_name`, or the top-level binding when no
    /// name is given.
    pub fn entity_for_param(&self, param_name: Option<&str>) -> Option<EntityId> {
        match param_name {
            Some(name) => self.sub_params.get(name).and_then(|p| p.entity_id),
            None => self.entity_id,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entity_id.is_none()
            && self.entity_name.is_none()
            && self.entity_label.is_none()
            && self.target_entity_param_name.is_none()
            && self.sub_params.is_empty()
    }
}

/// One entry of the navigation state stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateObject {
    pub id: String,
    #[serde(default)]
    pub params: StateParams,
}

impl StateObject {
    pub fn new(id: impl Into<String>, params: StateParams) -> Self {
        Self {
            id: id.into(),
            params,
        }
    }

    pub fn root(id: impl Into<String>) -> Self {
        Self::new(id, StateParams::default())
    }
}

/// Per-state entry of the dashboard definition's named state set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub name: String,
    #[serde(default)]
    pub root: bool,
}
