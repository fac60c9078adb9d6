//! Widget runtime: bridges one declared widget and its compiled behavior to
//! live subscriptions.
//!
//! The lifecycle is `uninitialized → awaiting-size-and-subscription →
//! initialized → destroyed`; `initialized` is reached only once the default
//! subscription finished resolving **and** the container has a non-zero
//! measured size. Until then, incoming data/latest-data/command events are
//! queued and flushed exactly once right after the transition. Every
//! behavior hook invocation is individually guarded: a failing hook puts
//! the widget into a local error state and never disturbs sibling widgets.

use crate::behavior::{BehaviorCtx, WidgetBehavior};
use crate::error::{BehaviorError, CommandError, DataError};
use crate::loader::WidgetInfo;
use crate::slot::TaskSlots;
use crate::subscription::{
    CommandOptions, CommandState, SubscriptionContext, SubscriptionListener, WidgetSubscription,
    WidgetSubscriptionOptions,
};
use dashstream_model::{EntityInfo, SubscriptionInfo, Timewindow, Widget, WidgetKind};
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock, Weak};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetLifecycle {
    Uninitialized,
    AwaitingSizeAndSubscription,
    Initialized,
    Destroyed,
}

/// Event classes queued while the widget is not yet initialized.
#[derive(Debug, Clone)]
enum WidgetEvent {
    DataUpdated,
    LatestDataUpdated,
    DataError(DataError),
    CommandStateChanged(CommandState),
}

/// Widget-local error surfaced by a failed behavior hook or data error.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetErrorState {
    pub hook: String,
    pub message: String,
}

/// Runtime facade of one materialized widget.
pub struct WidgetRuntime {
    widget: Widget,
    info: Arc<WidgetInfo>,
    ctx: SubscriptionContext,
    behavior: StdMutex<Box<dyn WidgetBehavior>>,
    default_subscription: StdRwLock<Option<Arc<WidgetSubscription>>>,
    dynamic_subscriptions: StdRwLock<HashMap<Uuid, Arc<WidgetSubscription>>>,
    lifecycle: StdRwLock<WidgetLifecycle>,
    subscription_inited: AtomicBool,
    size: StdRwLock<(u32, u32)>,
    is_edit: AtomicBool,
    is_mobile: AtomicBool,
    pending: StdMutex<Vec<WidgetEvent>>,
    slots: TaskSlots,
    error: StdRwLock<Option<WidgetErrorState>>,
    dashboard_timewindow: StdRwLock<Timewindow>,
    cancel: CancellationToken,
}

/// Routes subscription callbacks back into the owning runtime.
struct SubscriptionBridge {
    runtime: Weak<WidgetRuntime>,
}

impl SubscriptionListener for SubscriptionBridge {
    fn on_data_updated(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.handle_event(WidgetEvent::DataUpdated);
        }
    }

    fn on_latest_data_updated(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.handle_event(WidgetEvent::LatestDataUpdated);
        }
    }

    fn on_data_update_error(&self, error: &DataError) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.handle_event(WidgetEvent::DataError(error.clone()));
        }
    }

    fn on_command_state_changed(&self, state: &CommandState) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.handle_event(WidgetEvent::CommandStateChanged(state.clone()));
        }
    }
}

impl WidgetRuntime {
    pub fn new(
        widget: Widget,
        info: Arc<WidgetInfo>,
        ctx: SubscriptionContext,
        dashboard_timewindow: Timewindow,
    ) -> Arc<Self> {
        let behavior = info.factory.create();
        Arc::new(Self {
            widget,
            info,
            ctx,
            behavior: StdMutex::new(behavior),
            default_subscription: StdRwLock::new(None),
            dynamic_subscriptions: StdRwLock::new(HashMap::new()),
            lifecycle: StdRwLock::new(WidgetLifecycle::Uninitialized),
            subscription_inited: AtomicBool::new(false),
            size: StdRwLock::new((0, 0)),
            is_edit: AtomicBool::new(false),
            is_mobile: AtomicBool::new(false),
            pending: StdMutex::new(Vec::new()),
            slots: TaskSlots::new(),
            error: StdRwLock::new(None),
            dashboard_timewindow: StdRwLock::new(dashboard_timewindow),
            cancel: CancellationToken::new(),
        })
    }

    pub fn widget(&self) -> &Widget {
        &self.widget
    }

    pub fn widget_info(&self) -> &Arc<WidgetInfo> {
        &self.info
    }

    pub fn lifecycle(&self) -> WidgetLifecycle {
        *self.lifecycle.read().unwrap()
    }

    pub fn widget_error(&self) -> Option<WidgetErrorState> {
        self.error.read().unwrap().clone()
    }

    pub fn default_subscription(&self) -> Option<Arc<WidgetSubscription>> {
        self.default_subscription.read().unwrap().clone()
    }

    /// Entity driving widget actions: the first bound entity of any
    /// subscription.
    pub fn active_entity_info(&self) -> Option<EntityInfo> {
        if let Some(info) = self
            .default_subscription()
            .and_then(|s| s.first_entity_info())
        {
            return Some(info);
        }
        self.dynamic_subscriptions
            .read()
            .unwrap()
            .values()
            .find_map(|s| s.first_entity_info())
    }

    /// Create the default subscription and start listening for alias and
    /// filter changes. The widget stays un-initialized until a non-zero
    /// size is reported.
    pub async fn init(self: &Arc<Self>) {
        if self.lifecycle() != WidgetLifecycle::Uninitialized {
            return;
        }
        self.set_lifecycle(WidgetLifecycle::AwaitingSizeAndSubscription);
        self.attach_notifications();
        self.create_default_subscription().await;
        self.subscription_inited.store(true, Ordering::SeqCst);
        self.try_activate();
    }

    /// Report the measured container size.
    pub fn on_resize(self: &Arc<Self>, width: u32, height: u32) {
        if self.lifecycle() == WidgetLifecycle::Destroyed {
            return;
        }
        let changed = {
            let mut size = self.size.write().unwrap();
            if *size == (width, height) {
                false
            } else {
                *size = (width, height);
                true
            }
        };
        if !changed || width == 0 || height == 0 {
            return;
        }
        if self.lifecycle() == WidgetLifecycle::Initialized {
            let runtime = Arc::clone(self);
            self.slots.resize.schedule(move || {
                runtime.invoke_hook("onResize", |behavior, ctx| behavior.on_resize(ctx));
            });
        } else {
            self.try_activate();
        }
    }

    pub fn set_edit_mode(self: &Arc<Self>, edit: bool) {
        if self.is_edit.swap(edit, Ordering::SeqCst) == edit {
            return;
        }
        if self.lifecycle() == WidgetLifecycle::Initialized {
            let runtime = Arc::clone(self);
            self.slots.edit_mode.schedule(move || {
                runtime.invoke_hook("onEditModeChanged", |behavior, ctx| {
                    behavior.on_edit_mode_changed(ctx)
                });
            });
        }
    }

    pub fn set_mobile_mode(self: &Arc<Self>, mobile: bool) {
        if self.is_mobile.swap(mobile, Ordering::SeqCst) == mobile {
            return;
        }
        if self.lifecycle() == WidgetLifecycle::Initialized {
            let runtime = Arc::clone(self);
            self.slots.mobile_mode.schedule(move || {
                runtime.invoke_hook("onMobileModeChanged", |behavior, ctx| {
                    behavior.on_mobile_mode_changed(ctx)
                });
            });
        }
    }

    /// Request a full re-initialization. Rapid repeated requests coalesce:
    /// only the last scheduled one runs.
    pub fn schedule_reinit(self: &Arc<Self>) {
        if self.lifecycle() == WidgetLifecycle::Destroyed {
            return;
        }
        let runtime = Arc::clone(self);
        self.slots.reinit.schedule_future(async move {
            runtime.re_init().await;
        });
    }

    /// Tear the current instance fully down, then rebuild datasources and
    /// re-enter the lifecycle from the top.
    pub async fn re_init(self: &Arc<Self>) {
        if self.lifecycle() == WidgetLifecycle::Destroyed {
            return;
        }
        debug!(widget_id = %self.widget.id, "re-initializing widget");
        self.teardown_instance().await;
        *self.behavior.lock().unwrap() = self.info.factory.create();
        self.set_lifecycle(WidgetLifecycle::AwaitingSizeAndSubscription);
        self.create_default_subscription().await;
        self.subscription_inited.store(true, Ordering::SeqCst);
        self.try_activate();
    }

    /// Destroy the widget: cancel every scheduled slot, destroy all
    /// subscriptions, run the behavior destroy hook.
    pub async fn destroy(self: &Arc<Self>) {
        if self.lifecycle() == WidgetLifecycle::Destroyed {
            return;
        }
        self.cancel.cancel();
        self.teardown_instance().await;
        self.set_lifecycle(WidgetLifecycle::Destroyed);
    }

    /// Forward changed alias ids to every owned subscription; returns
    /// whether any of them requires re-initialization.
    pub async fn on_aliases_changed(&self, alias_ids: &[String]) -> bool {
        let mut changed = false;
        for subscription in self.all_subscriptions() {
            changed |= subscription.on_aliases_changed(alias_ids).await;
        }
        changed
    }

    /// Filter-set counterpart of [`Self::on_aliases_changed`].
    pub async fn on_filters_changed(&self, filter_ids: &[String]) -> bool {
        let mut changed = false;
        for subscription in self.all_subscriptions() {
            changed |= subscription.on_filters_changed(filter_ids).await;
        }
        changed
    }

    pub async fn on_dashboard_timewindow_changed(&self, timewindow: Timewindow) {
        *self.dashboard_timewindow.write().unwrap() = timewindow;
        for subscription in self.all_subscriptions() {
            subscription.on_dashboard_timewindow_changed(timewindow).await;
        }
    }

    /// Widget-level timewindow config change; dashboard-timewindow
    /// subscriptions are unaffected.
    pub async fn update_timewindow_config(&self, timewindow: Timewindow) {
        for subscription in self.all_subscriptions() {
            if !subscription.use_dashboard_timewindow() {
                subscription.update_timewindow_config(timewindow).await;
            }
        }
    }

    pub async fn on_update_timewindow(&self, start_time_ms: i64, end_time_ms: i64, interval: i64) {
        if let Some(subscription) = self.default_subscription() {
            subscription
                .on_update_timewindow(start_time_ms, end_time_ms, interval)
                .await;
        }
    }

    pub async fn on_reset_timewindow(&self) {
        if let Some(subscription) = self.default_subscription() {
            subscription.on_reset_timewindow().await;
        }
    }

    pub async fn send_one_way_command(
        &self,
        method: &str,
        params: Value,
        options: Option<CommandOptions>,
    ) -> Result<(), CommandError> {
        match self.default_subscription() {
            Some(subscription) => subscription.send_one_way_command(method, params, options).await,
            None => Err(CommandError::NoTargetDevice),
        }
    }

    pub async fn send_two_way_command(
        &self,
        method: &str,
        params: Value,
        options: Option<CommandOptions>,
    ) -> Result<Value, CommandError> {
        match self.default_subscription() {
            Some(subscription) => subscription.send_two_way_command(method, params, options).await,
            None => Err(CommandError::NoTargetDevice),
        }
    }

    /// Create an additional subscription owned by this widget.
    pub async fn create_subscription(
        self: &Arc<Self>,
        mut options: WidgetSubscriptionOptions,
        subscribe: bool,
    ) -> Arc<WidgetSubscription> {
        options.dashboard_timewindow = *self.dashboard_timewindow.read().unwrap();
        let listener = Arc::new(SubscriptionBridge {
            runtime: Arc::downgrade(self),
        });
        let subscription = WidgetSubscription::new(self.ctx.clone(), options, listener);
        subscription.init().await;
        self.dynamic_subscriptions
            .write()
            .unwrap()
            .insert(subscription.id(), Arc::clone(&subscription));
        if subscribe {
            subscription.subscribe().await;
        }
        subscription
    }

    /// Shorthand-info variant of [`Self::create_subscription`].
    pub async fn create_subscription_from_info(
        self: &Arc<Self>,
        kind: WidgetKind,
        infos: &[SubscriptionInfo],
        subscribe: bool,
    ) -> Arc<WidgetSubscription> {
        let datasources = self.ctx.aliases.datasources_from_subscription_info(infos).await;
        let mut options = WidgetSubscriptionOptions::new(kind);
        options.resolved_datasources = datasources;
        self.create_subscription(options, subscribe).await
    }

    pub async fn remove_subscription(&self, id: Uuid) {
        let removed = self.dynamic_subscriptions.write().unwrap().remove(&id);
        if let Some(subscription) = removed {
            subscription.destroy().await;
        }
    }

    fn all_subscriptions(&self) -> Vec<Arc<WidgetSubscription>> {
        let mut subscriptions: Vec<Arc<WidgetSubscription>> =
            self.default_subscription().into_iter().collect();
        subscriptions.extend(self.dynamic_subscriptions.read().unwrap().values().cloned());
        subscriptions
    }

    async fn create_default_subscription(self: &Arc<Self>) {
        if self.widget.kind == WidgetKind::Static {
            return;
        }
        let config = &self.widget.config;
        let mut options = WidgetSubscriptionOptions::new(self.widget.kind);
        options.datasource_configs = config.datasources.clone();
        options.alarm_source = config.alarm_source.clone();
        options.use_dashboard_timewindow = config.use_dashboard_timewindow;
        options.timewindow = config.timewindow;
        options.dashboard_timewindow = *self.dashboard_timewindow.read().unwrap();
        options.target_device_alias_id = config.target_device_alias_id.clone();

        let listener = Arc::new(SubscriptionBridge {
            runtime: Arc::downgrade(self),
        });
        let subscription = WidgetSubscription::new(self.ctx.clone(), options, listener);
        subscription.init().await;
        *self.default_subscription.write().unwrap() = Some(subscription);
    }

    fn attach_notifications(self: &Arc<Self>) {
        self.spawn_change_listener(self.ctx.aliases.entity_aliases_changed(), true);
        self.spawn_change_listener(self.ctx.aliases.filters_changed(), false);
    }

    fn spawn_change_listener(
        self: &Arc<Self>,
        rx: broadcast::Receiver<Vec<String>>,
        aliases: bool,
    ) {
        let weak = Arc::downgrade(self);
        let token = self.cancel.clone();
        let mut stream = BroadcastStream::new(rx);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    message = stream.next() => match message {
                        Some(Ok(ids)) => {
                            let Some(runtime) = weak.upgrade() else { break };
                            let changed = if aliases {
                                runtime.on_aliases_changed(&ids).await
                            } else {
                                runtime.on_filters_changed(&ids).await
                            };
                            if changed {
                                runtime.schedule_reinit();
                            }
                        }
                        Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                            debug!(skipped, "change notifications lagged");
                            continue;
                        }
                        None => break,
                    },
                }
            }
        });
    }

    fn is_ready(&self) -> bool {
        let (width, height) = *self.size.read().unwrap();
        self.subscription_inited.load(Ordering::SeqCst) && width > 0 && height > 0
    }

    fn try_activate(self: &Arc<Self>) {
        if self.lifecycle() != WidgetLifecycle::AwaitingSizeAndSubscription || !self.is_ready() {
            return;
        }
        let runtime = Arc::clone(self);
        self.slots.init.schedule_future(async move {
            runtime.activate().await;
        });
    }

    async fn activate(self: &Arc<Self>) {
        if self.lifecycle() != WidgetLifecycle::AwaitingSizeAndSubscription || !self.is_ready() {
            return;
        }
        self.set_lifecycle(WidgetLifecycle::Initialized);
        self.invoke_hook("onInit", |behavior, ctx| behavior.on_init(ctx));
        if let Some(subscription) = self.default_subscription() {
            subscription.subscribe().await;
        }
        self.flush_pending();
    }

    /// Drain events queued before initialization; runs exactly once per
    /// transition into `initialized`.
    fn flush_pending(&self) {
        let events: Vec<WidgetEvent> = self.pending.lock().unwrap().drain(..).collect();
        for event in events {
            self.dispatch_event(event);
        }
    }

    fn handle_event(self: &Arc<Self>, event: WidgetEvent) {
        match self.lifecycle() {
            WidgetLifecycle::Destroyed => {}
            WidgetLifecycle::Initialized => self.dispatch_event(event),
            WidgetLifecycle::Uninitialized | WidgetLifecycle::AwaitingSizeAndSubscription => {
                self.pending.lock().unwrap().push(event);
            }
        }
    }

    fn dispatch_event(&self, event: WidgetEvent) {
        match event {
            WidgetEvent::DataUpdated => {
                self.invoke_hook("onDataUpdated", |behavior, ctx| behavior.on_data_updated(ctx));
            }
            WidgetEvent::LatestDataUpdated => {
                self.invoke_hook("onLatestDataUpdated", |behavior, ctx| {
                    behavior.on_latest_data_updated(ctx)
                });
            }
            WidgetEvent::DataError(data_error) => {
                *self.error.write().unwrap() = Some(WidgetErrorState {
                    hook: "data".to_string(),
                    message: data_error.message,
                });
            }
            WidgetEvent::CommandStateChanged(_) => {
                // command state is polled from the subscription; queued here
                // only so pre-init messages are not dropped
            }
        }
    }

    fn invoke_hook<F>(&self, hook: &str, f: F)
    where
        F: FnOnce(&mut dyn WidgetBehavior, &BehaviorCtx<'_>) -> Result<(), BehaviorError>,
    {
        if self.lifecycle() == WidgetLifecycle::Destroyed {
            return;
        }
        let data = self
            .default_subscription()
            .map(|s| s.data_snapshot())
            .unwrap_or_default();
        let (width, height) = *self.size.read().unwrap();
        let ctx = BehaviorCtx {
            widget_id: self.widget.id,
            settings: &self.widget.config.settings,
            data: &data,
            width,
            height,
            is_edit: self.is_edit.load(Ordering::SeqCst),
            is_mobile: self.is_mobile.load(Ordering::SeqCst),
        };
        let result = {
            let mut behavior = self.behavior.lock().unwrap();
            f(behavior.as_mut(), &ctx)
        };
        if let Err(err) = result {
            error!(widget_id = %self.widget.id, hook, %err, "widget behavior hook failed");
            *self.error.write().unwrap() = Some(WidgetErrorState {
                hook: hook.to_string(),
                message: err.message,
            });
        }
    }

    async fn teardown_instance(&self) {
        self.slots.init.cancel();
        self.slots.resize.cancel();
        self.slots.edit_mode.cancel();
        self.slots.mobile_mode.cancel();

        let was_initialized = self.lifecycle() == WidgetLifecycle::Initialized;
        self.set_lifecycle(WidgetLifecycle::Uninitialized);
        self.subscription_inited.store(false, Ordering::SeqCst);
        self.pending.lock().unwrap().clear();
        *self.error.write().unwrap() = None;

        let default = self.default_subscription.write().unwrap().take();
        if let Some(subscription) = default {
            subscription.destroy().await;
        }
        let dynamic: Vec<Arc<WidgetSubscription>> = self
            .dynamic_subscriptions
            .write()
            .unwrap()
            .drain()
            .map(|(_, s)| s)
            .collect();
        for subscription in dynamic {
            subscription.destroy().await;
        }

        if was_initialized {
            self.behavior.lock().unwrap().on_destroy();
        }
    }

    fn set_lifecycle(&self, lifecycle: WidgetLifecycle) {
        *self.lifecycle.write().unwrap() = lifecycle;
    }
}
