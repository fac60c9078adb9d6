//! # dashstream-model
//!
//! Shared data model for the dashstream dashboard engine: entity identifiers,
//! entity alias filters, navigation state, widgets, data keys, datasources,
//! timewindows and the query types exchanged with the backend collaborators.
//!
//! Everything here is plain serializable data. Runtime behavior (resolution,
//! subscriptions, reconciliation) lives in `dashstream-runtime`.

pub mod alias;
pub mod data;
pub mod entity;
pub mod query;
pub mod state;
pub mod timewindow;
pub mod widget;

pub use alias::{AliasFilterKind, EntityAlias, EntityAliasFilter, Filter, QueryRoot};
pub use data::{DataUpdate, SubscriptionData, TsValue};
pub use entity::{
    AliasEntityId, AliasEntityType, AuthUser, Authority, EntityId, EntityInfo, EntityType,
    EntityTypeSpec,
};
pub use query::{
    EntityData, EntityDataQuery, EntityFilter, EntityKey, EntityKeyType, EntityRelationsQuery,
    EntitySearchDirection, EntitySearchQuery, KeysByType, PageData, PageLink,
    RelationEntityTypeFilter,
};
pub use state::{DashboardState, StateObject, StateParams};
pub use timewindow::{
    Aggregation, AggregationType, FixedWindow, HistoryWindow, IntervalWindow,
    SubscriptionTimewindow, Timewindow,
};
pub use widget::{
    DataKey, DataKeyType, Datasource, DatasourceConfig, DatasourceType, SubscriptionInfo, Widget,
    WidgetConfig, WidgetKind, WidgetLayout, WidgetTypeDescriptor,
};
