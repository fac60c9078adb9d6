//! Collaborator interfaces consumed by the engine. Implementations live in
//! the surrounding application (REST/websocket clients); the engine only
//! depends on these traits. In-memory fakes used by the test suite live in
//! the crate's test support module.

use crate::error::{CommandError, ProviderError};
use async_trait::async_trait;
use dashstream_model::{
    AuthUser, DataUpdate, EntityDataQuery, EntityFilter, EntityId, EntityInfo, EntityKey,
    EntityType, KeysByType, PageData, SubscriptionData, SubscriptionTimewindow,
    WidgetTypeDescriptor,
};
use dashstream_model::query::EntityData;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Snapshot source for the authenticated session. Pseudo entity ids
/// (current user/tenant/customer/owner) are substituted from this.
pub trait AuthState: Send + Sync {
    fn current_user(&self) -> Option<AuthUser>;
}

/// Entity lookup and query execution backend.
#[async_trait]
pub trait EntityProvider: Send + Sync {
    async fn get_entity(
        &self,
        entity_type: EntityType,
        id: Uuid,
    ) -> Result<EntityInfo, ProviderError>;

    async fn get_entities(
        &self,
        entity_type: EntityType,
        ids: &[Uuid],
    ) -> Result<Vec<EntityInfo>, ProviderError>;

    async fn find_entity_data_by_query(
        &self,
        query: &EntityDataQuery,
    ) -> Result<PageData<EntityData>, ProviderError>;

    async fn find_entity_keys_by_query(
        &self,
        entity_filter: &EntityFilter,
        timeseries: bool,
        attributes: bool,
    ) -> Result<KeysByType, ProviderError>;

    /// "Ignore errors" lookup mode: a missing entity degrades to `None`
    /// instead of failing the caller (used by display-name enrichment and
    /// state navigation).
    async fn get_entity_or_none(&self, entity_type: EntityType, id: Uuid) -> Option<EntityInfo> {
        self.get_entity(entity_type, id).await.ok()
    }
}

/// Data feed request issued by a subscription for one datasource.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryRequest {
    EntityData {
        entity_filter: EntityFilter,
        keys: Vec<EntityKey>,
        timewindow: Option<SubscriptionTimewindow>,
    },
    EntityCount {
        entity_filter: Option<EntityFilter>,
    },
    AlarmCount {
        entity_filter: Option<EntityFilter>,
    },
    Alarms {
        entity_filter: Option<EntityFilter>,
        keys: Vec<EntityKey>,
        polling_interval: Duration,
    },
}

/// Telemetry/attribute/alarm read + subscribe backend.
#[async_trait]
pub trait TelemetryProvider: Send + Sync {
    /// Fetch the initial data frame for a request.
    async fn fetch(&self, request: &TelemetryRequest) -> Result<SubscriptionData, ProviderError>;

    /// Open a live update feed for a request. The feed is closed by
    /// dropping the receiver.
    async fn subscribe(
        &self,
        request: TelemetryRequest,
    ) -> Result<mpsc::Receiver<DataUpdate>, ProviderError>;
}

/// One-way/two-way device command dispatch used by control widgets.
#[async_trait]
pub trait CommandProvider: Send + Sync {
    async fn send_one_way(
        &self,
        target: EntityId,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<(), CommandError>;

    async fn send_two_way(
        &self,
        target: EntityId,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, CommandError>;
}

/// Widget type storage. `Ok(None)` means the type does not exist, which the
/// loader converts into the well-known missing widget type.
#[async_trait]
pub trait WidgetTypeProvider: Send + Sync {
    async fn get_widget_type(
        &self,
        type_fqn: &str,
    ) -> Result<Option<WidgetTypeDescriptor>, ProviderError>;
}

/// Fixed auth snapshot; the common implementation outside of tests is a
/// session-store adapter.
#[derive(Debug, Clone)]
pub struct StaticAuthState {
    user: Option<AuthUser>,
}

impl StaticAuthState {
    pub fn new(user: AuthUser) -> Self {
        Self { user: Some(user) }
    }

    pub fn unauthenticated() -> Self {
        Self { user: None }
    }
}

impl AuthState for StaticAuthState {
    fn current_user(&self) -> Option<AuthUser> {
        self.user.clone()
    }
}
