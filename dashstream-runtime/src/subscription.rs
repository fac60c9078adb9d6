//! Widget subscription: one object per logical data binding. Owns the
//! resolved datasources, the timewindow, the latest data frame per
//! datasource/key, and the fetch-subscribe-update-teardown lifecycle.
//!
//! All data events of one subscription flow through a single ordered
//! channel consumed by one delivery task, so updates for a datasource are
//! delivered in arrival order and are never reordered relative to
//! alias/filter-change handling. Destroying the subscription cancels the
//! delivery task itself - no callback fires after `destroy` begins.

use crate::alias::AliasController;
use crate::error::{CommandError, DataError};
use crate::provider::{CommandProvider, EntityProvider, TelemetryProvider, TelemetryRequest};
use dashstream_model::query::{EntityData, EntityDataQuery};
use dashstream_model::widget::{DataKey, DataKeyType};
use dashstream_model::{
    DataUpdate, Datasource, DatasourceConfig, DatasourceType, EntityFilter, EntityId, EntityInfo,
    EntityKey, EntityKeyType, PageLink, SubscriptionData, SubscriptionTimewindow, Timewindow,
    TsValue, WidgetKind,
};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_DATASOURCE_ENTITIES: usize = 100;
const DATA_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_SERIES_LIMIT: usize = 200;
const MIN_FUNCTION_TICK_MS: u64 = 100;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_ALARM_POLLING_INTERVAL: Duration = Duration::from_millis(5_000);

/// Generator resolved for `Function` data keys: `(time_ms, prev) -> value`.
pub type DataKeyFunction = Arc<dyn Fn(i64, Option<f64>) -> f64 + Send + Sync>;

/// Pluggable resolver for function data key generators; the counterpart of
/// the behavior compiler for computed keys.
pub trait DataFunctionRegistry: Send + Sync {
    fn resolve(&self, key: &DataKey) -> DataKeyFunction;
}

static BUILTIN_FUNCTIONS: Lazy<HashMap<&'static str, DataKeyFunction>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, DataKeyFunction> = HashMap::new();
    map.insert("sin", Arc::new(|t, _| ((t as f64) / 5_000.0).sin()));
    map.insert("cos", Arc::new(|t, _| ((t as f64) / 5_000.0).cos()));
    map.insert(
        "random",
        Arc::new(|t, _| {
            // cheap deterministic scatter from the timestamp
            let h = (t as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            ((h >> 33) % 1_000) as f64 / 10.0
        }),
    );
    map
});

/// Built-in generators, selected by the key's function body (or name when
/// no body is declared). Unknown selectors fall back to a counter.
#[derive(Default)]
pub struct DefaultFunctionRegistry;

impl DataFunctionRegistry for DefaultFunctionRegistry {
    fn resolve(&self, key: &DataKey) -> DataKeyFunction {
        let selector = key.func_body.as_deref().unwrap_or(&key.name);
        BUILTIN_FUNCTIONS
            .get(selector)
            .cloned()
            .unwrap_or_else(|| Arc::new(|_, prev| prev.unwrap_or(0.0) + 1.0))
    }
}

/// Shared services handed to every subscription of a dashboard.
#[derive(Clone)]
pub struct SubscriptionContext {
    pub aliases: Arc<AliasController>,
    pub entities: Arc<dyn EntityProvider>,
    pub telemetry: Arc<dyn TelemetryProvider>,
    pub commands: Arc<dyn CommandProvider>,
    pub functions: Arc<dyn DataFunctionRegistry>,
}

impl SubscriptionContext {
    pub fn new(
        aliases: Arc<AliasController>,
        entities: Arc<dyn EntityProvider>,
        telemetry: Arc<dyn TelemetryProvider>,
        commands: Arc<dyn CommandProvider>,
    ) -> Self {
        Self {
            aliases,
            entities,
            telemetry,
            commands,
            functions: Arc::new(DefaultFunctionRegistry),
        }
    }

    pub fn with_functions(mut self, functions: Arc<dyn DataFunctionRegistry>) -> Self {
        self.functions = functions;
        self
    }
}

/// Options describing one logical binding.
#[derive(Clone)]
pub struct WidgetSubscriptionOptions {
    pub kind: WidgetKind,
    pub datasource_configs: Vec<DatasourceConfig>,
    /// Pre-resolved datasources (programmatic subscriptions); when
    /// non-empty they bypass alias resolution.
    pub resolved_datasources: Vec<Datasource>,
    pub alarm_source: Option<DatasourceConfig>,
    pub use_dashboard_timewindow: bool,
    pub timewindow: Option<Timewindow>,
    pub dashboard_timewindow: Timewindow,
    pub alarm_polling_interval: Duration,
    pub target_device_alias_id: Option<String>,
    pub command_timeout: Duration,
    pub command_retries: u32,
}

impl WidgetSubscriptionOptions {
    pub fn new(kind: WidgetKind) -> Self {
        Self {
            kind,
            datasource_configs: Vec::new(),
            resolved_datasources: Vec::new(),
            alarm_source: None,
            use_dashboard_timewindow: true,
            timewindow: None,
            dashboard_timewindow: Timewindow::default(),
            alarm_polling_interval: DEFAULT_ALARM_POLLING_INTERVAL,
            target_device_alias_id: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            command_retries: 0,
        }
    }

    pub fn with_datasources(mut self, configs: Vec<DatasourceConfig>) -> Self {
        self.datasource_configs = configs;
        self
    }

    pub fn with_alarm_source(mut self, config: DatasourceConfig) -> Self {
        self.alarm_source = Some(config);
        self
    }

    pub fn with_timewindow(mut self, timewindow: Timewindow) -> Self {
        self.timewindow = Some(timewindow);
        self.use_dashboard_timewindow = false;
        self
    }

    pub fn with_dashboard_timewindow(mut self, timewindow: Timewindow) -> Self {
        self.dashboard_timewindow = timewindow;
        self
    }

    pub fn with_target_device_alias(mut self, alias_id: impl Into<String>) -> Self {
        self.target_device_alias_id = Some(alias_id.into());
        self
    }
}

/// Callbacks delivered to the subscription owner. Every hook has a no-op
/// default; callbacks fire only while the subscription is subscribed.
pub trait SubscriptionListener: Send + Sync {
    fn on_data_updated(&self) {}
    fn on_latest_data_updated(&self) {}
    fn on_data_update_error(&self, _error: &DataError) {}
    fn on_loading_changed(&self, _loading: bool) {}
    fn on_timewindow_updated(&self, _timewindow: &Timewindow) {}
    fn on_command_state_changed(&self, _state: &CommandState) {}
}

/// No-op listener for bindings nobody observes directly.
pub struct NullListener;

impl SubscriptionListener for NullListener {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Created,
    ResolvingDatasources,
    /// Datasources resolved, data streams not yet opened.
    Resolved,
    Subscribed,
    Destroyed,
}

/// Latest received frame for one data key.
#[derive(Debug, Clone, PartialEq)]
pub struct DataKeyData {
    pub key: DataKey,
    pub series: Vec<TsValue>,
    pub latest: Option<TsValue>,
}

impl DataKeyData {
    fn new(key: DataKey) -> Self {
        Self {
            key,
            series: Vec::new(),
            latest: None,
        }
    }
}

/// Materialized data of one datasource row.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasourceData {
    pub datasource: Datasource,
    pub entity: Option<EntityInfo>,
    /// Series keys.
    pub data: Vec<DataKeyData>,
    /// Latest-only keys.
    pub latest: Vec<DataKeyData>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandState {
    pub executing: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct CommandOptions {
    pub timeout: Duration,
    pub retries: u32,
}

pub struct WidgetSubscription {
    id: Uuid,
    ctx: SubscriptionContext,
    options: WidgetSubscriptionOptions,
    listener: Arc<dyn SubscriptionListener>,
    state: StdRwLock<SubscriptionState>,
    datasources: StdRwLock<Vec<Datasource>>,
    data: StdRwLock<Vec<DatasourceData>>,
    timewindow_override: StdRwLock<Option<Timewindow>>,
    dashboard_timewindow: StdRwLock<Timewindow>,
    private_timewindow: StdRwLock<Option<Timewindow>>,
    command_state: StdMutex<CommandState>,
    loading: AtomicBool,
    cancel: CancellationToken,
    stream_token: StdMutex<CancellationToken>,
}

impl WidgetSubscription {
    pub fn new(
        ctx: SubscriptionContext,
        options: WidgetSubscriptionOptions,
        listener: Arc<dyn SubscriptionListener>,
    ) -> Arc<Self> {
        let cancel = CancellationToken::new();
        let stream_token = cancel.child_token();
        Arc::new(Self {
            id: Uuid::new_v4(),
            dashboard_timewindow: StdRwLock::new(options.dashboard_timewindow),
            private_timewindow: StdRwLock::new(options.timewindow),
            ctx,
            options,
            listener,
            state: StdRwLock::new(SubscriptionState::Created),
            datasources: StdRwLock::new(Vec::new()),
            data: StdRwLock::new(Vec::new()),
            timewindow_override: StdRwLock::new(None),
            command_state: StdMutex::new(CommandState::default()),
            loading: AtomicBool::new(false),
            cancel,
            stream_token: StdMutex::new(stream_token),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> WidgetKind {
        self.options.kind
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.read().unwrap()
    }

    pub fn use_dashboard_timewindow(&self) -> bool {
        self.options.use_dashboard_timewindow
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Resolve the declared datasources through the alias controller.
    /// `created → resolving-datasources → resolved`.
    pub async fn init(&self) {
        if self.state() != SubscriptionState::Created {
            return;
        }
        self.set_state(SubscriptionState::ResolvingDatasources);

        let resolved = if !self.options.resolved_datasources.is_empty() {
            self.options.resolved_datasources.clone()
        } else {
            match self.options.kind {
                WidgetKind::Rpc | WidgetKind::Static => Vec::new(),
                WidgetKind::Alarm => match &self.options.alarm_source {
                    Some(source) => {
                        self.ctx
                            .aliases
                            .resolve_datasources(std::slice::from_ref(source))
                            .await
                    }
                    None => Vec::new(),
                },
                WidgetKind::Timeseries | WidgetKind::Latest => {
                    self.ctx
                        .aliases
                        .resolve_datasources(&self.options.datasource_configs)
                        .await
                }
            }
        };

        if self.cancel.is_cancelled() {
            return;
        }
        *self.datasources.write().unwrap() = resolved;
        self.set_state(SubscriptionState::Resolved);
    }

    pub fn datasources(&self) -> Vec<Datasource> {
        self.datasources.read().unwrap().clone()
    }

    /// Latest data frame per datasource row / key.
    pub fn data_snapshot(&self) -> Vec<DatasourceData> {
        self.data.read().unwrap().clone()
    }

    /// Entity bound to the first datasource row, used by widget actions.
    pub fn first_entity_info(&self) -> Option<EntityInfo> {
        self.data
            .read()
            .unwrap()
            .iter()
            .find_map(|row| row.entity.clone())
    }

    /// Open the data streams. Safe to call again after a timewindow change;
    /// the previous streams are torn down first.
    pub async fn subscribe(self: &Arc<Self>) {
        match self.state() {
            SubscriptionState::Resolved | SubscriptionState::Subscribed => {}
            other => {
                debug!(state = ?other, "subscribe ignored in current state");
                return;
            }
        }

        // cancel-and-replace any previous stream generation
        let stream_token = {
            let mut guard = self.stream_token.lock().unwrap();
            guard.cancel();
            let fresh = self.cancel.child_token();
            *guard = fresh.clone();
            fresh
        };

        self.set_loading(true);

        let datasources = self.datasources.read().unwrap().clone();
        let timewindow = self.current_subscription_timewindow();
        let mut rows = Vec::new();
        let mut requests: Vec<(usize, TelemetryRequest)> = Vec::new();
        let mut function_rows: Vec<usize> = Vec::new();

        for datasource in datasources {
            if stream_token.is_cancelled() {
                return;
            }
            match datasource.datasource_type {
                DatasourceType::Entity => {
                    let entities = self.materialize_rows(&datasource).await;
                    for entity in entities {
                        let row_index = rows.len();
                        let keys: Vec<EntityKey> = datasource
                            .data_keys
                            .iter()
                            .chain(datasource.latest_data_keys.iter())
                            .filter_map(entity_key_for)
                            .collect();
                        let entity_filter = EntityFilter::SingleEntity { entity: entity.id };
                        let request = if self.options.kind == WidgetKind::Alarm {
                            TelemetryRequest::Alarms {
                                entity_filter: Some(entity_filter),
                                keys,
                                polling_interval: self.options.alarm_polling_interval,
                            }
                        } else {
                            TelemetryRequest::EntityData {
                                entity_filter,
                                keys,
                                timewindow: Some(timewindow),
                            }
                        };
                        requests.push((row_index, request));
                        rows.push(datasource_row(&datasource, Some(entity)));
                    }
                }
                DatasourceType::EntityCount => {
                    let row_index = rows.len();
                    requests.push((
                        row_index,
                        TelemetryRequest::EntityCount {
                            entity_filter: datasource.entity_filter.clone(),
                        },
                    ));
                    rows.push(datasource_row(&datasource, None));
                }
                DatasourceType::AlarmCount => {
                    let row_index = rows.len();
                    requests.push((
                        row_index,
                        TelemetryRequest::AlarmCount {
                            entity_filter: datasource.entity_filter.clone(),
                        },
                    ));
                    rows.push(datasource_row(&datasource, None));
                }
                DatasourceType::Function => {
                    function_rows.push(rows.len());
                    rows.push(datasource_row(&datasource, None));
                }
            }
        }

        *self.data.write().unwrap() = rows;

        let (event_tx, event_rx) = mpsc::channel::<(usize, DataUpdate)>(DATA_CHANNEL_CAPACITY);

        // initial frames, in datasource order, ahead of any live update
        for (row_index, request) in &requests {
            if stream_token.is_cancelled() {
                return;
            }
            match self.ctx.telemetry.fetch(request).await {
                Ok(initial) => {
                    if !initial.is_empty() {
                        self.apply_update(*row_index, DataUpdate::series(initial));
                    }
                }
                Err(err) => {
                    warn!(%err, "initial data fetch failed");
                    self.notify_error(&DataError::from(err));
                }
            }
        }

        // live feeds
        for (row_index, request) in requests {
            match self.ctx.telemetry.subscribe(request).await {
                Ok(mut feed) => {
                    let tx = event_tx.clone();
                    let token = stream_token.clone();
                    tokio::spawn(async move {
                        loop {
                            tokio::select! {
                                _ = token.cancelled() => break,
                                update = feed.recv() => match update {
                                    Some(update) => {
                                        if tx.send((row_index, update)).await.is_err() {
                                            break;
                                        }
                                    }
                                    None => break,
                                },
                            }
                        }
                    });
                }
                Err(err) => {
                    warn!(%err, "data feed subscribe failed");
                    self.notify_error(&DataError::from(err));
                }
            }
        }

        // function generators
        for row_index in function_rows {
            self.spawn_function_generator(row_index, timewindow, event_tx.clone(), &stream_token);
        }
        drop(event_tx);

        self.set_loading(false);
        self.set_state(SubscriptionState::Subscribed);
        self.notify_data_updated(false);

        // single delivery task: arrival order, no reordering
        let subscription = Arc::clone(self);
        let token = stream_token;
        tokio::spawn(async move {
            let mut event_rx = event_rx;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = event_rx.recv() => match event {
                        Some((row_index, update)) => {
                            let latest = update.latest;
                            if subscription.apply_update(row_index, update) {
                                subscription.notify_data_updated(latest);
                            }
                        }
                        None => break,
                    },
                }
            }
        });
    }

    /// Tear down the data streams, keeping resolved datasources.
    pub async fn unsubscribe(&self) {
        {
            let mut guard = self.stream_token.lock().unwrap();
            guard.cancel();
            *guard = self.cancel.child_token();
        }
        if self.state() == SubscriptionState::Subscribed {
            self.set_state(SubscriptionState::Resolved);
        }
    }

    /// Destroy the subscription. Cancellation is effective: the delivery
    /// task is cancelled, so no callback is invoked after this call begins.
    pub async fn destroy(&self) {
        self.set_state(SubscriptionState::Destroyed);
        self.cancel.cancel();
        self.data.write().unwrap().clear();
        self.datasources.write().unwrap().clear();
    }

    /// React to changed aliases. Returns whether this subscription depends
    /// on any of them; when it does, active streams are torn down
    /// immediately (no stale datasource keeps delivering) and the owner is
    /// expected to re-initialize.
    pub async fn on_aliases_changed(&self, alias_ids: &[String]) -> bool {
        if self.state() == SubscriptionState::Destroyed {
            return false;
        }
        let affected = self.references_aliases(alias_ids);
        if !affected {
            return false;
        }
        self.unsubscribe().await;
        self.datasources.write().unwrap().clear();
        self.data.write().unwrap().clear();
        self.set_state(SubscriptionState::Created);
        true
    }

    /// React to changed key-filter sets; same contract as
    /// [`Self::on_aliases_changed`].
    pub async fn on_filters_changed(&self, filter_ids: &[String]) -> bool {
        if self.state() == SubscriptionState::Destroyed {
            return false;
        }
        let config_refs = self
            .options
            .datasource_configs
            .iter()
            .chain(self.options.alarm_source.iter())
            .filter_map(|c| c.filter_id.as_deref());
        let affected = config_refs
            .into_iter()
            .any(|id| filter_ids.iter().any(|changed| changed == id));
        if !affected {
            return false;
        }
        self.unsubscribe().await;
        self.datasources.write().unwrap().clear();
        self.data.write().unwrap().clear();
        self.set_state(SubscriptionState::Created);
        true
    }

    /// Dashboard-shared timewindow changed; private-timewindow
    /// subscriptions ignore it.
    pub async fn on_dashboard_timewindow_changed(self: &Arc<Self>, timewindow: Timewindow) {
        *self.dashboard_timewindow.write().unwrap() = timewindow;
        if self.options.use_dashboard_timewindow {
            self.resubscribe_if_active().await;
        }
    }

    /// Replace the private timewindow config.
    pub async fn update_timewindow_config(self: &Arc<Self>, timewindow: Timewindow) {
        *self.private_timewindow.write().unwrap() = Some(timewindow);
        if !self.options.use_dashboard_timewindow {
            self.notify_timewindow(&timewindow);
            self.resubscribe_if_active().await;
        }
    }

    /// Zoom into a fixed window (widget-driven, e.g. chart selection).
    pub async fn on_update_timewindow(
        self: &Arc<Self>,
        start_time_ms: i64,
        end_time_ms: i64,
        interval: i64,
    ) {
        let timewindow = Timewindow::history_fixed(start_time_ms, end_time_ms, interval.max(1));
        *self.timewindow_override.write().unwrap() = Some(timewindow);
        self.notify_timewindow(&timewindow);
        self.resubscribe_if_active().await;
    }

    /// Drop the zoom override and return to the configured window.
    pub async fn on_reset_timewindow(self: &Arc<Self>) {
        if self.timewindow_override.write().unwrap().take().is_some() {
            let timewindow = self.current_timewindow();
            self.notify_timewindow(&timewindow);
            self.resubscribe_if_active().await;
        }
    }

    /// Effective declarative timewindow (override > private > dashboard).
    pub fn current_timewindow(&self) -> Timewindow {
        if let Some(overridden) = *self.timewindow_override.read().unwrap() {
            return overridden;
        }
        if !self.options.use_dashboard_timewindow {
            if let Some(private) = *self.private_timewindow.read().unwrap() {
                return private;
            }
        }
        *self.dashboard_timewindow.read().unwrap()
    }

    pub fn command_state(&self) -> CommandState {
        self.command_state.lock().unwrap().clone()
    }

    /// Fire-and-forget device command with timeout/retry.
    pub async fn send_one_way_command(
        &self,
        method: &str,
        params: Value,
        options: Option<CommandOptions>,
    ) -> Result<(), CommandError> {
        self.send_command(method, params, options, true)
            .await
            .map(|_| ())
    }

    /// Request/response device command with timeout/retry.
    pub async fn send_two_way_command(
        &self,
        method: &str,
        params: Value,
        options: Option<CommandOptions>,
    ) -> Result<Value, CommandError> {
        self.send_command(method, params, options, false).await
    }

    async fn send_command(
        &self,
        method: &str,
        params: Value,
        options: Option<CommandOptions>,
        one_way: bool,
    ) -> Result<Value, CommandError> {
        let target = self
            .resolve_target_device()
            .await
            .ok_or(CommandError::NoTargetDevice)?;
        let options = options.unwrap_or(CommandOptions {
            timeout: self.options.command_timeout,
            retries: self.options.command_retries,
        });

        self.set_command_state(CommandState {
            executing: true,
            error: None,
        });

        let attempts = options.retries + 1;
        let mut outcome: Result<Value, CommandError> = Err(CommandError::Timeout { attempts });
        for attempt in 0..attempts {
            let call = async {
                if one_way {
                    self.ctx
                        .commands
                        .send_one_way(target, method, params.clone(), options.timeout)
                        .await
                        .map(|_| Value::Null)
                } else {
                    self.ctx
                        .commands
                        .send_two_way(target, method, params.clone(), options.timeout)
                        .await
                }
            };
            match tokio::time::timeout(options.timeout, call).await {
                Ok(Ok(value)) => {
                    outcome = Ok(value);
                    break;
                }
                Ok(Err(err)) => {
                    outcome = Err(err);
                    break;
                }
                Err(_) => {
                    debug!(method, attempt, "command attempt timed out");
                    outcome = Err(CommandError::Timeout { attempts });
                }
            }
        }

        match &outcome {
            Ok(_) => self.set_command_state(CommandState::default()),
            Err(err) => self.set_command_state(CommandState {
                executing: false,
                error: Some(err.to_string()),
            }),
        }
        outcome
    }

    async fn resolve_target_device(&self) -> Option<EntityId> {
        if let Some(alias_id) = &self.options.target_device_alias_id {
            let info = self.ctx.aliases.get_alias_info(alias_id).await?;
            if let Some(EntityFilter::SingleEntity { entity }) = info.resolution.filter() {
                return Some(*entity);
            }
            return None;
        }
        self.data
            .read()
            .unwrap()
            .iter()
            .filter_map(|row| row.entity.as_ref())
            .find(|entity| entity.id.entity_type == dashstream_model::EntityType::Device)
            .map(|entity| entity.id)
    }

    fn references_aliases(&self, alias_ids: &[String]) -> bool {
        let config_refs = self
            .options
            .datasource_configs
            .iter()
            .chain(self.options.alarm_source.iter())
            .filter_map(|c| c.entity_alias_id.as_deref())
            .chain(self.options.target_device_alias_id.as_deref());
        config_refs
            .into_iter()
            .any(|id| alias_ids.iter().any(|changed| changed == id))
    }

    async fn materialize_rows(&self, datasource: &Datasource) -> Vec<EntityInfo> {
        let Some(filter) = &datasource.entity_filter else {
            return Vec::new();
        };
        let resolve_multiple = match &datasource.entity_alias_id {
            Some(alias_id) => self
                .ctx
                .aliases
                .get_alias_info(alias_id)
                .await
                .map(|info| info.resolve_multiple)
                .unwrap_or(true),
            None => true,
        };
        let key_filters = match &datasource.filter_id {
            Some(filter_id) => self
                .ctx
                .aliases
                .get_filter(filter_id)
                .await
                .map(|f| f.key_filters)
                .unwrap_or(Value::Null),
            None => Value::Null,
        };
        let query = EntityDataQuery {
            entity_filter: filter.clone(),
            page_link: PageLink::new(MAX_DATASOURCE_ENTITIES, 0),
            entity_fields: vec![
                EntityKey::new(EntityKeyType::EntityField, "name"),
                EntityKey::new(EntityKeyType::EntityField, "label"),
            ],
            latest_values: Vec::new(),
            key_filters,
        };
        match self.ctx.entities.find_entity_data_by_query(&query).await {
            Ok(page) => {
                let mut rows: Vec<EntityInfo> =
                    page.data.iter().map(EntityData::entity_info).collect();
                if !resolve_multiple {
                    rows.truncate(1);
                }
                rows
            }
            Err(err) => {
                warn!(%err, "datasource entity query failed");
                self.notify_error(&DataError::from(err));
                Vec::new()
            }
        }
    }

    fn spawn_function_generator(
        self: &Arc<Self>,
        row_index: usize,
        timewindow: SubscriptionTimewindow,
        event_tx: mpsc::Sender<(usize, DataUpdate)>,
        stream_token: &CancellationToken,
    ) {
        let keys: Vec<DataKey> = {
            let data = self.data.read().unwrap();
            data.get(row_index)
                .map(|row| {
                    row.data
                        .iter()
                        .chain(row.latest.iter())
                        .map(|k| k.key.clone())
                        .collect()
                })
                .unwrap_or_default()
        };
        if keys.is_empty() {
            return;
        }
        let generators: Vec<(String, DataKeyFunction)> = keys
            .iter()
            .map(|key| (key.name.clone(), self.ctx.functions.resolve(key)))
            .collect();

        let tick = Duration::from_millis((timewindow.interval.max(0) as u64).max(MIN_FUNCTION_TICK_MS));
        let token = stream_token.clone();
        tokio::spawn(async move {
            let mut previous: HashMap<String, f64> = HashMap::new();
            let mut interval = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let now = now_ms();
                        let mut frame = SubscriptionData::new();
                        for (name, generator) in &generators {
                            let value = generator(now, previous.get(name).copied());
                            previous.insert(name.clone(), value);
                            frame.insert(name.clone(), vec![TsValue::new(now, value)]);
                        }
                        if event_tx.send((row_index, DataUpdate::series(frame))).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Apply one update frame; returns whether anything changed.
    fn apply_update(&self, row_index: usize, update: DataUpdate) -> bool {
        let limit = self.current_subscription_timewindow().aggregation.limit as usize;
        let limit = if limit == 0 { DEFAULT_SERIES_LIMIT } else { limit };
        let mut data = self.data.write().unwrap();
        let Some(row) = data.get_mut(row_index) else {
            return false;
        };
        let mut changed = false;
        for (key_name, values) in update.data {
            if values.is_empty() {
                continue;
            }
            if update.latest {
                if let Some(key_data) = row.latest.iter_mut().find(|k| k.key.name == key_name) {
                    key_data.latest = values.last().cloned();
                    changed = true;
                }
                continue;
            }
            if let Some(key_data) = row.data.iter_mut().find(|k| k.key.name == key_name) {
                key_data.series.extend(values.iter().cloned());
                if key_data.series.len() > limit {
                    let excess = key_data.series.len() - limit;
                    key_data.series.drain(0..excess);
                }
                key_data.latest = values.last().cloned();
                changed = true;
            } else if let Some(key_data) = row.latest.iter_mut().find(|k| k.key.name == key_name) {
                key_data.latest = values.last().cloned();
                changed = true;
            }
        }
        changed
    }

    fn current_subscription_timewindow(&self) -> SubscriptionTimewindow {
        SubscriptionTimewindow::resolve(&self.current_timewindow(), now_ms())
    }

    async fn resubscribe_if_active(self: &Arc<Self>) {
        if self.state() == SubscriptionState::Subscribed {
            self.subscribe().await;
        }
    }

    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && self.state() == SubscriptionState::Subscribed
    }

    fn notify_data_updated(&self, latest: bool) {
        if !self.is_live() {
            return;
        }
        if latest {
            self.listener.on_latest_data_updated();
        } else {
            self.listener.on_data_updated();
        }
    }

    fn notify_error(&self, error: &DataError) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.listener.on_data_update_error(error);
    }

    fn notify_timewindow(&self, timewindow: &Timewindow) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.listener.on_timewindow_updated(timewindow);
    }

    fn set_loading(&self, loading: bool) {
        if self.loading.swap(loading, Ordering::SeqCst) != loading && !self.cancel.is_cancelled() {
            self.listener.on_loading_changed(loading);
        }
    }

    fn set_command_state(&self, state: CommandState) {
        *self.command_state.lock().unwrap() = state.clone();
        if !self.cancel.is_cancelled() {
            self.listener.on_command_state_changed(&state);
        }
    }

    fn set_state(&self, state: SubscriptionState) {
        *self.state.write().unwrap() = state;
    }
}

fn datasource_row(datasource: &Datasource, entity: Option<EntityInfo>) -> DatasourceData {
    let mut datasource = datasource.clone();
    if let Some(entity) = &entity {
        datasource.name = if entity.label.is_empty() {
            entity.name.clone()
        } else {
            entity.label.clone()
        };
    }
    DatasourceData {
        data: datasource.data_keys.iter().cloned().map(DataKeyData::new).collect(),
        latest: datasource
            .latest_data_keys
            .iter()
            .cloned()
            .map(DataKeyData::new)
            .collect(),
        datasource,
        entity,
    }
}

fn entity_key_for(key: &DataKey) -> Option<EntityKey> {
    match key.key_type {
        DataKeyType::Timeseries => Some(EntityKey::new(EntityKeyType::TimeSeries, &key.name)),
        DataKeyType::Attribute => Some(EntityKey::new(EntityKeyType::Attribute, &key.name)),
        DataKeyType::EntityField => Some(EntityKey::new(EntityKeyType::EntityField, &key.name)),
        DataKeyType::AlarmField => Some(EntityKey::new(EntityKeyType::AlarmField, &key.name)),
        DataKeyType::Function | DataKeyType::Count => None,
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
