use crate::entity::EntityType;
use crate::query::EntityFilter;
use crate::timewindow::Timewindow;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Behavioral class of a widget. Drives which datasource/timewindow options
/// apply and which data callbacks the widget receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetKind {
    Timeseries,
    Latest,
    Rpc,
    Alarm,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataKeyType {
    Timeseries,
    Attribute,
    EntityField,
    AlarmField,
    Function,
    Count,
}

/// Named data key of a datasource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataKey {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub key_type: DataKeyType,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub settings: serde_json::Value,
    /// Source text of the generator for `Function` keys; compiled by the
    /// runtime's pluggable behavior compiler, never evaluated ad hoc.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func_body: Option<String>,
}

impl DataKey {
    pub fn new(name: impl Into<String>, key_type: DataKeyType) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            key_type,
            settings: serde_json::Value::Null,
            func_body: None,
        }
    }

    pub fn timeseries(name: impl Into<String>) -> Self {
        Self::new(name, DataKeyType::Timeseries)
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Self::new(name, DataKeyType::Attribute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatasourceType {
    Entity,
    Function,
    EntityCount,
    AlarmCount,
}

/// Declared datasource of a widget config. Entity datasources reference a
/// dashboard alias (and optionally a key-filter set) by id; pseudo sources
/// carry no entity reference at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceConfig {
    #[serde(rename = "type")]
    pub datasource_type: DatasourceType,
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_alias_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_id: Option<String>,
    #[serde(default)]
    pub data_keys: Vec<DataKey>,
    #[serde(default)]
    pub latest_data_keys: Vec<DataKey>,
}

impl DatasourceConfig {
    pub fn entity(alias_id: impl Into<String>) -> Self {
        Self {
            datasource_type: DatasourceType::Entity,
            name: String::new(),
            entity_alias_id: Some(alias_id.into()),
            filter_id: None,
            data_keys: Vec::new(),
            latest_data_keys: Vec::new(),
        }
    }

    pub fn function() -> Self {
        Self {
            datasource_type: DatasourceType::Function,
            name: String::new(),
            entity_alias_id: None,
            filter_id: None,
            data_keys: Vec::new(),
            latest_data_keys: Vec::new(),
        }
    }

    pub fn with_keys(mut self, keys: Vec<DataKey>) -> Self {
        self.data_keys = keys;
        self
    }
}

/// Resolved datasource: the declared config with its alias resolved to a
/// concrete query filter. `entity_filter` is `None` for pseudo sources and
/// for entity sources whose alias resolved to nothing (in which case no
/// backend query is issued).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datasource {
    #[serde(rename = "type")]
    pub datasource_type: DatasourceType,
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_filter: Option<EntityFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_alias_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_id: Option<String>,
    #[serde(default)]
    pub data_keys: Vec<DataKey>,
    #[serde(default)]
    pub latest_data_keys: Vec<DataKey>,
}

impl Datasource {
    pub fn has_query(&self) -> bool {
        match self.datasource_type {
            DatasourceType::Entity | DatasourceType::EntityCount => self.entity_filter.is_some(),
            DatasourceType::AlarmCount | DatasourceType::Function => true,
        }
    }
}

/// Shorthand datasource description used by programmatic subscriptions
/// (widgets that build their own bindings instead of using dashboard
/// config). Expanded into concrete datasources by the runtime.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_ids: Option<Vec<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_name_prefix: Option<String>,
    #[serde(default)]
    pub timeseries: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Declared widget: pure data, compared structurally by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: Uuid,
    /// Fully qualified widget type, `bundle.type`.
    pub type_fqn: String,
    pub kind: WidgetKind,
    pub config: WidgetConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub datasources: Vec<DatasourceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm_source: Option<DatasourceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timewindow: Option<Timewindow>,
    #[serde(default = "default_true")]
    pub use_dashboard_timewindow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_device_alias_id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub settings: serde_json::Value,
}

fn default_true() -> bool {
    true
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            datasources: Vec::new(),
            alarm_source: None,
            timewindow: None,
            use_dashboard_timewindow: true,
            target_device_alias_id: None,
            settings: serde_json::Value::Null,
        }
    }
}

/// Per-layout placement overrides for a widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetLayout {
    pub row: u32,
    pub col: u32,
    pub size_x: u32,
    pub size_y: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_order: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_height: Option<u32>,
}

impl WidgetLayout {
    pub fn new(row: u32, col: u32, size_x: u32, size_y: u32) -> Self {
        Self {
            row,
            col,
            size_x,
            size_y,
            order: None,
            mobile_order: None,
            mobile_height: None,
        }
    }
}

/// Stored widget type definition fetched from widget type storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetTypeDescriptor {
    pub type_fqn: String,
    pub name: String,
    pub kind: WidgetKind,
    /// Name or source of the behavior implementation; interpreted by the
    /// runtime's behavior compiler.
    #[serde(default)]
    pub behavior: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub default_config: serde_json::Value,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub settings_schema: serde_json::Value,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data_key_settings_schema: serde_json::Value,
}

impl WidgetTypeDescriptor {
    pub fn new(type_fqn: impl Into<String>, kind: WidgetKind) -> Self {
        let type_fqn = type_fqn.into();
        Self {
            name: type_fqn.clone(),
            type_fqn,
            kind,
            behavior: String::new(),
            default_config: serde_json::Value::Null,
            settings_schema: serde_json::Value::Null,
            data_key_settings_schema: serde_json::Value::Null,
        }
    }
}
