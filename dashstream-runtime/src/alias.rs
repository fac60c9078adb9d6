//! Dashboard-scoped alias controller: owns the alias/filter declarations,
//! caches resolution results, and broadcasts change notifications that drive
//! subscription re-initialization.
//!
//! The controller never mutates dashboard state on its own; declarations are
//! replaced by the editing collaborator through `update_entity_aliases` /
//! `update_filters`, and navigation changes arrive through
//! `bind_state_controller`.

use crate::provider::EntityProvider;
use crate::resolver::{FilterResolver, Resolution};
use crate::state::StateSnapshot;
use dashstream_model::widget::{DataKey, DataKeyType};
use dashstream_model::{
    Datasource, DatasourceConfig, DatasourceType, EntityAlias, EntityFilter, EntityId, EntityInfo,
    Filter, KeysByType, StateParams, SubscriptionInfo,
};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::debug;

const ENTITY_INFO_CACHE_SIZE: usize = 256;
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Cached outcome of resolving one alias.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasInfo {
    pub alias_id: String,
    pub alias: String,
    pub resolve_multiple: bool,
    /// Resolution depended on navigation state.
    pub state_entity: bool,
    pub entity_param_name: Option<String>,
    pub resolution: Resolution,
    /// Enriched record of the bound entity for single-entity resolutions.
    pub current_entity: Option<EntityInfo>,
}

pub struct AliasController {
    resolver: FilterResolver,
    entities: Arc<dyn EntityProvider>,
    aliases: RwLock<HashMap<String, EntityAlias>>,
    filters: RwLock<HashMap<String, Filter>>,
    resolved: RwLock<HashMap<String, Arc<AliasInfo>>>,
    entity_info_cache: Mutex<LruCache<EntityId, EntityInfo>>,
    state_params: RwLock<StateParams>,
    aliases_changed_tx: broadcast::Sender<Vec<String>>,
    filters_changed_tx: broadcast::Sender<Vec<String>>,
}

impl AliasController {
    pub fn new(
        resolver: FilterResolver,
        entities: Arc<dyn EntityProvider>,
        aliases: Vec<EntityAlias>,
        filters: Vec<Filter>,
    ) -> Arc<Self> {
        let (aliases_changed_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (filters_changed_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Arc::new(Self {
            resolver,
            entities,
            aliases: RwLock::new(aliases.into_iter().map(|a| (a.id.clone(), a)).collect()),
            filters: RwLock::new(filters.into_iter().map(|f| (f.id.clone(), f)).collect()),
            resolved: RwLock::new(HashMap::new()),
            entity_info_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(ENTITY_INFO_CACHE_SIZE).expect("cache size must be > 0"),
            )),
            state_params: RwLock::new(StateParams::default()),
            aliases_changed_tx,
            filters_changed_tx,
        })
    }

    /// Notification stream of alias ids whose resolution may have changed.
    pub fn entity_aliases_changed(&self) -> broadcast::Receiver<Vec<String>> {
        self.aliases_changed_tx.subscribe()
    }

    /// Notification stream of changed key-filter ids.
    pub fn filters_changed(&self) -> broadcast::Receiver<Vec<String>> {
        self.filters_changed_tx.subscribe()
    }

    /// React to navigation state changes for the lifetime of the receiver.
    pub fn bind_state_controller(
        self: &Arc<Self>,
        mut state_rx: tokio::sync::watch::Receiver<StateSnapshot>,
    ) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let params = state_rx.borrow().params.clone();
                controller.on_state_params_changed(params).await;
            }
        });
    }

    /// Invalidate state-dependent aliases against new navigation params.
    pub async fn on_state_params_changed(&self, params: StateParams) {
        *self.state_params.write().await = params;
        let state_dependent: Vec<String> = {
            let aliases = self.aliases.read().await;
            aliases
                .values()
                .filter(|a| a.filter.is_state_dependent())
                .map(|a| a.id.clone())
                .collect()
        };
        if state_dependent.is_empty() {
            return;
        }
        {
            let mut resolved = self.resolved.write().await;
            for id in &state_dependent {
                resolved.remove(id);
            }
        }
        debug!(count = state_dependent.len(), "state-dependent aliases invalidated");
        let _ = self.aliases_changed_tx.send(state_dependent);
    }

    /// Replace the alias set; changed/added/removed ids are invalidated and
    /// broadcast.
    pub async fn update_entity_aliases(&self, new_aliases: Vec<EntityAlias>) {
        let mut changed = Vec::new();
        {
            let mut aliases = self.aliases.write().await;
            let new_map: HashMap<String, EntityAlias> = new_aliases
                .into_iter()
                .map(|a| (a.id.clone(), a))
                .collect();
            for (id, alias) in &new_map {
                if aliases.get(id) != Some(alias) {
                    changed.push(id.clone());
                }
            }
            for id in aliases.keys() {
                if !new_map.contains_key(id) {
                    changed.push(id.clone());
                }
            }
            *aliases = new_map;
        }
        if changed.is_empty() {
            return;
        }
        {
            let mut resolved = self.resolved.write().await;
            for id in &changed {
                resolved.remove(id);
            }
        }
        let _ = self.aliases_changed_tx.send(changed);
    }

    /// Replace or insert a single alias declaration.
    pub async fn update_entity_alias(&self, alias: EntityAlias) {
        let id = alias.id.clone();
        {
            let mut aliases = self.aliases.write().await;
            if aliases.get(&id) == Some(&alias) {
                return;
            }
            aliases.insert(id.clone(), alias);
        }
        self.resolved.write().await.remove(&id);
        let _ = self.aliases_changed_tx.send(vec![id]);
    }

    /// Replace the key-filter set; changed ids are broadcast.
    pub async fn update_filters(&self, new_filters: Vec<Filter>) {
        let mut changed = Vec::new();
        {
            let mut filters = self.filters.write().await;
            let new_map: HashMap<String, Filter> =
                new_filters.into_iter().map(|f| (f.id.clone(), f)).collect();
            for (id, filter) in &new_map {
                if filters.get(id) != Some(filter) {
                    changed.push(id.clone());
                }
            }
            for id in filters.keys() {
                if !new_map.contains_key(id) {
                    changed.push(id.clone());
                }
            }
            *filters = new_map;
        }
        if !changed.is_empty() {
            let _ = self.filters_changed_tx.send(changed);
        }
    }

    pub async fn get_entity_alias(&self, alias_id: &str) -> Option<EntityAlias> {
        self.aliases.read().await.get(alias_id).cloned()
    }

    pub async fn get_filter(&self, filter_id: &str) -> Option<Filter> {
        self.filters.read().await.get(filter_id).cloned()
    }

    pub async fn current_state_params(&self) -> StateParams {
        self.state_params.read().await.clone()
    }

    /// Resolve one alias against current navigation state, with caching.
    /// Returns `None` for unknown alias ids.
    pub async fn get_alias_info(&self, alias_id: &str) -> Option<Arc<AliasInfo>> {
        if let Some(info) = self.resolved.read().await.get(alias_id) {
            return Some(Arc::clone(info));
        }

        let alias = self.aliases.read().await.get(alias_id).cloned()?;
        let params = self.state_params.read().await.clone();
        let resolution = self.resolver.resolve(&alias.filter, &params);

        let (state_entity, entity_param_name) = match &resolution {
            Resolution::Resolved(resolved) => {
                (resolved.state_entity, resolved.entity_param_name.clone())
            }
            Resolution::Unresolved => (alias.filter.is_state_dependent(), None),
        };

        let current_entity = match resolution.filter() {
            Some(EntityFilter::SingleEntity { entity }) => self.entity_info(*entity).await,
            _ => None,
        };

        let info = Arc::new(AliasInfo {
            alias_id: alias.id.clone(),
            alias: alias.alias.clone(),
            resolve_multiple: alias.resolve_multiple,
            state_entity,
            entity_param_name,
            resolution,
            current_entity,
        });

        self.resolved
            .write()
            .await
            .insert(alias_id.to_string(), Arc::clone(&info));
        Some(info)
    }

    /// Resolve the declared datasource configs of a widget into concrete
    /// datasources. An unresolved alias contributes zero datasources.
    pub async fn resolve_datasources(&self, configs: &[DatasourceConfig]) -> Vec<Datasource> {
        let mut datasources = Vec::with_capacity(configs.len());
        for config in configs {
            match config.datasource_type {
                DatasourceType::Function | DatasourceType::AlarmCount => {
                    datasources.push(Datasource {
                        datasource_type: config.datasource_type,
                        name: effective_name(config, None),
                        entity_filter: None,
                        entity_alias_id: None,
                        filter_id: config.filter_id.clone(),
                        data_keys: config.data_keys.clone(),
                        latest_data_keys: config.latest_data_keys.clone(),
                    });
                }
                DatasourceType::Entity | DatasourceType::EntityCount => {
                    let Some(alias_id) = config.entity_alias_id.as_deref() else {
                        debug!("entity datasource without alias id skipped");
                        continue;
                    };
                    let Some(info) = self.get_alias_info(alias_id).await else {
                        debug!(alias_id, "unknown alias referenced by datasource");
                        continue;
                    };
                    match &info.resolution {
                        Resolution::Resolved(resolved) => {
                            datasources.push(Datasource {
                                datasource_type: config.datasource_type,
                                name: effective_name(config, info.current_entity.as_ref()),
                                entity_filter: Some(resolved.filter.clone()),
                                entity_alias_id: Some(alias_id.to_string()),
                                filter_id: config.filter_id.clone(),
                                data_keys: config.data_keys.clone(),
                                latest_data_keys: config.latest_data_keys.clone(),
                            });
                        }
                        Resolution::Unresolved => {
                            debug!(alias_id, "alias unresolved, datasource suppressed");
                        }
                    }
                }
            }
        }
        datasources
    }

    /// Expand shorthand subscription descriptions into datasources
    /// (programmatic widget subscriptions).
    pub async fn datasources_from_subscription_info(
        &self,
        infos: &[SubscriptionInfo],
    ) -> Vec<Datasource> {
        let mut datasources = Vec::new();
        for info in infos {
            let mut data_keys: Vec<DataKey> = info
                .timeseries
                .iter()
                .map(|name| DataKey::timeseries(name.clone()))
                .chain(info.attributes.iter().map(|name| DataKey::attribute(name.clone())))
                .collect();

            let entity_filter = match (info.entity_type, &info.entity_id, &info.entity_ids) {
                (Some(entity_type), Some(id), _) => Some(EntityFilter::SingleEntity {
                    entity: EntityId::new(entity_type, *id),
                }),
                (Some(entity_type), None, Some(ids)) => Some(EntityFilter::EntityList {
                    entity_type,
                    entity_list: ids.clone(),
                }),
                (Some(entity_type), None, None) => {
                    let name_filter = info
                        .entity_name
                        .clone()
                        .or_else(|| info.entity_name_prefix.clone());
                    name_filter.map(|entity_name_filter| EntityFilter::EntityName {
                        entity_type,
                        entity_name_filter,
                    })
                }
                (None, _, _) => None,
            };

            match entity_filter {
                Some(filter) => {
                    let name = match &filter {
                        EntityFilter::SingleEntity { entity } => self
                            .entity_info(*entity)
                            .await
                            .map(|e| e.name)
                            .unwrap_or_default(),
                        _ => info.name.clone().unwrap_or_default(),
                    };
                    datasources.push(Datasource {
                        datasource_type: DatasourceType::Entity,
                        name,
                        entity_filter: Some(filter),
                        entity_alias_id: None,
                        filter_id: None,
                        data_keys,
                        latest_data_keys: Vec::new(),
                    });
                }
                None if !info.functions.is_empty() => {
                    data_keys.extend(
                        info.functions
                            .iter()
                            .map(|name| DataKey::new(name.clone(), DataKeyType::Function)),
                    );
                    datasources.push(Datasource {
                        datasource_type: DatasourceType::Function,
                        name: info.name.clone().unwrap_or_else(|| "function".to_string()),
                        entity_filter: None,
                        entity_alias_id: None,
                        filter_id: None,
                        data_keys,
                        latest_data_keys: Vec::new(),
                    });
                }
                None => debug!("subscription info without entity reference or functions skipped"),
            }
        }
        datasources
    }

    /// Enriched record of the single entity an alias is bound to, if its
    /// resolution is single-entity.
    pub async fn resolve_single_entity_info(&self, alias_id: &str) -> Option<EntityInfo> {
        self.get_alias_info(alias_id)
            .await
            .and_then(|info| info.current_entity.clone())
    }

    /// Data keys reachable through an alias's resolved filter, for key
    /// pickers. Unresolved or unknown aliases offer no keys.
    pub async fn available_data_keys(
        &self,
        alias_id: &str,
        timeseries: bool,
        attributes: bool,
    ) -> KeysByType {
        let Some(info) = self.get_alias_info(alias_id).await else {
            return KeysByType::default();
        };
        let Some(filter) = info.resolution.filter() else {
            return KeysByType::default();
        };
        match self
            .entities
            .find_entity_keys_by_query(filter, timeseries, attributes)
            .await
        {
            Ok(keys) => keys,
            Err(err) => {
                debug!(alias_id, %err, "entity key query failed");
                KeysByType::default()
            }
        }
    }

    async fn entity_info(&self, id: EntityId) -> Option<EntityInfo> {
        if let Some(cached) = self.entity_info_cache.lock().await.get(&id) {
            return Some(cached.clone());
        }
        let info = self
            .entities
            .get_entity_or_none(id.entity_type, id.id)
            .await?;
        self.entity_info_cache.lock().await.put(id, info.clone());
        Some(info)
    }
}

fn effective_name(config: &DatasourceConfig, entity: Option<&EntityInfo>) -> String {
    if !config.name.is_empty() {
        return config.name.clone();
    }
    match entity {
        Some(entity) if !entity.label.is_empty() => entity.label.clone(),
        Some(entity) => entity.name.clone(),
        None => match config.datasource_type {
            DatasourceType::Function => "function".to_string(),
            _ => String::new(),
        },
    }
}
