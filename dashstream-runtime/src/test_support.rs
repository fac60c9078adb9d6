//! In-memory collaborator fakes shared by the unit tests.

use crate::error::{CommandError, ProviderError};
use crate::provider::{
    CommandProvider, EntityProvider, TelemetryProvider, TelemetryRequest, WidgetTypeProvider,
};
use async_trait::async_trait;
use dashstream_model::query::EntityData;
use dashstream_model::{
    DataUpdate, EntityDataQuery, EntityFilter, EntityId, EntityInfo, EntityType, KeysByType,
    PageData, SubscriptionData, WidgetTypeDescriptor,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Default)]
pub struct FakeEntityProvider {
    entities: Mutex<HashMap<EntityId, EntityInfo>>,
    keys: Mutex<KeysByType>,
    get_entity_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl FakeEntityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&self, entity_type: EntityType, name: &str) -> EntityId {
        let id = EntityId::new(entity_type, Uuid::new_v4());
        self.entities
            .lock()
            .unwrap()
            .insert(id, EntityInfo::new(id, name));
        id
    }

    pub fn set_keys(&self, keys: KeysByType) {
        *self.keys.lock().unwrap() = keys;
    }

    pub fn get_entity_calls(&self) -> usize {
        self.get_entity_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    fn rows_for_filter(&self, filter: &EntityFilter) -> Vec<EntityData> {
        let entities = self.entities.lock().unwrap();
        let mut rows: Vec<EntityData> = match filter {
            EntityFilter::SingleEntity { entity } => {
                entities.get(entity).into_iter().cloned().collect()
            }
            EntityFilter::EntityList {
                entity_type,
                entity_list,
            } => entity_list
                .iter()
                .filter_map(|id| entities.get(&EntityId::new(*entity_type, *id)).cloned())
                .collect(),
            EntityFilter::EntityName {
                entity_type,
                entity_name_filter,
            } => entities
                .values()
                .filter(|e| {
                    e.id.entity_type == *entity_type && e.name.starts_with(entity_name_filter)
                })
                .cloned()
                .collect(),
            EntityFilter::EntityByType { entity_type } => entities
                .values()
                .filter(|e| e.id.entity_type == *entity_type)
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
        .into_iter()
        .map(|info| EntityData {
            entity_id: info.id,
            name: info.name,
            label: info.label,
            latest: HashMap::new(),
        })
        .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }
}

#[async_trait]
impl EntityProvider for FakeEntityProvider {
    async fn get_entity(
        &self,
        entity_type: EntityType,
        id: Uuid,
    ) -> Result<EntityInfo, ProviderError> {
        self.get_entity_calls.fetch_add(1, Ordering::SeqCst);
        self.entities
            .lock()
            .unwrap()
            .get(&EntityId::new(entity_type, id))
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn get_entities(
        &self,
        entity_type: EntityType,
        ids: &[Uuid],
    ) -> Result<Vec<EntityInfo>, ProviderError> {
        let entities = self.entities.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| entities.get(&EntityId::new(entity_type, *id)).cloned())
            .collect())
    }

    async fn find_entity_data_by_query(
        &self,
        query: &EntityDataQuery,
    ) -> Result<PageData<EntityData>, ProviderError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PageData::single_page(
            self.rows_for_filter(&query.entity_filter),
        ))
    }

    async fn find_entity_keys_by_query(
        &self,
        _entity_filter: &EntityFilter,
        timeseries: bool,
        attributes: bool,
    ) -> Result<KeysByType, ProviderError> {
        let keys = self.keys.lock().unwrap().clone();
        Ok(KeysByType {
            timeseries: if timeseries { keys.timeseries } else { Vec::new() },
            attribute: if attributes { keys.attribute } else { Vec::new() },
        })
    }
}

pub struct FakeTelemetryProvider {
    initial: Mutex<SubscriptionData>,
    feeds: Mutex<Vec<mpsc::Sender<DataUpdate>>>,
    fetch_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
}

impl FakeTelemetryProvider {
    pub fn new() -> Self {
        Self {
            initial: Mutex::new(SubscriptionData::new()),
            feeds: Mutex::new(Vec::new()),
            fetch_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_initial(&self, data: SubscriptionData) {
        *self.initial.lock().unwrap() = data;
    }

    /// Push a live update to every open feed.
    pub fn push(&self, update: DataUpdate) {
        for feed in self.feeds.lock().unwrap().iter() {
            let _ = feed.try_send(update.clone());
        }
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn open_feeds(&self) -> usize {
        self.feeds
            .lock()
            .unwrap()
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

#[async_trait]
impl TelemetryProvider for FakeTelemetryProvider {
    async fn fetch(&self, _request: &TelemetryRequest) -> Result<SubscriptionData, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.initial.lock().unwrap().clone())
    }

    async fn subscribe(
        &self,
        _request: TelemetryRequest,
    ) -> Result<mpsc::Receiver<DataUpdate>, ProviderError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        self.feeds.lock().unwrap().push(tx);
        Ok(rx)
    }
}

#[derive(Default)]
pub struct FakeCommandProvider {
    pub sent: Mutex<Vec<(EntityId, String, bool)>>,
    responses: Mutex<HashMap<String, Value>>,
    hang: Mutex<HashSet<String>>,
}

impl FakeCommandProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_response(&self, method: &str, value: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(method.to_string(), value);
    }

    /// Make a method never respond, to exercise timeouts.
    pub fn hang_on(&self, method: &str) {
        self.hang.lock().unwrap().insert(method.to_string());
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandProvider for FakeCommandProvider {
    async fn send_one_way(
        &self,
        target: EntityId,
        method: &str,
        _params: Value,
        timeout: Duration,
    ) -> Result<(), CommandError> {
        self.sent
            .lock()
            .unwrap()
            .push((target, method.to_string(), true));
        if self.hang.lock().unwrap().contains(method) {
            tokio::time::sleep(timeout + Duration::from_secs(3600)).await;
        }
        Ok(())
    }

    async fn send_two_way(
        &self,
        target: EntityId,
        method: &str,
        _params: Value,
        timeout: Duration,
    ) -> Result<Value, CommandError> {
        self.sent
            .lock()
            .unwrap()
            .push((target, method.to_string(), false));
        if self.hang.lock().unwrap().contains(method) {
            tokio::time::sleep(timeout + Duration::from_secs(3600)).await;
        }
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(method)
            .cloned()
            .unwrap_or(Value::Null))
    }
}

pub struct FakeWidgetTypeProvider {
    types: Mutex<HashMap<String, WidgetTypeDescriptor>>,
    failing: Mutex<HashSet<String>>,
    fetch_delay: Mutex<Option<Duration>>,
    fetch_calls: AtomicUsize,
}

impl FakeWidgetTypeProvider {
    pub fn new() -> Self {
        Self {
            types: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            fetch_delay: Mutex::new(None),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn add_type(&self, descriptor: WidgetTypeDescriptor) {
        self.types
            .lock()
            .unwrap()
            .insert(descriptor.type_fqn.clone(), descriptor);
    }

    pub fn fail_on(&self, type_fqn: &str) {
        self.failing.lock().unwrap().insert(type_fqn.to_string());
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WidgetTypeProvider for FakeWidgetTypeProvider {
    async fn get_widget_type(
        &self,
        type_fqn: &str,
    ) -> Result<Option<WidgetTypeDescriptor>, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(type_fqn) {
            return Err(ProviderError::Backend("fetch failed".to_string()));
        }
        Ok(self.types.lock().unwrap().get(type_fqn).cloned())
    }
}
