//! # dashstream-runtime
//!
//! The dashboard engine behind dashstream: turns a declarative dashboard
//! definition (entity aliases, filters, navigation states, widgets) into
//! live per-widget data subscriptions and keeps them consistent as
//! navigation state changes.
//!
//! ## Components
//!
//! - [`resolver`] / [`alias`] - symbolic alias filters resolved into
//!   concrete query filters, with caching and change notifications
//! - [`state`] - ordered navigation state stack with token persistence
//! - [`subscription`] - per-widget data binding lifecycle
//! - [`context`] - widget runtime bridging subscriptions to compiled
//!   behavior, with deferred init and pending-event queuing
//! - [`loader`] - widget type fetch+compile cache with single-flight
//!   deduplication
//! - [`reconcile`] - incremental widget population diffing
//!
//! Backends (entity lookup, query execution, telemetry, commands, widget
//! type storage) are consumed through the traits in [`provider`].

pub mod alias;
pub mod behavior;
pub mod context;
pub mod error;
pub mod loader;
pub mod provider;
pub mod reconcile;
pub mod resolver;
pub mod slot;
pub mod state;
pub mod subscription;

#[cfg(test)]
pub(crate) mod test_support;

pub use alias::{AliasController, AliasInfo};
pub use behavior::{
    noop_factory, BehaviorCompiler, BehaviorCtx, BehaviorFactory, NoopBehavior,
    RegistryBehaviorCompiler, WidgetBehavior,
};
pub use context::{WidgetErrorState, WidgetLifecycle, WidgetRuntime};
pub use error::{BehaviorError, CommandError, CompileError, DataError, ProviderError};
pub use loader::{WidgetInfo, WidgetInfoStatus, WidgetTypeCache};
pub use provider::{
    AuthState, CommandProvider, EntityProvider, StaticAuthState, TelemetryProvider,
    TelemetryRequest, WidgetTypeProvider,
};
pub use reconcile::{DashboardWidget, DashboardWidgets, WidgetChange};
pub use resolver::{
    alias_filter_kinds_for_entity_types, alias_matches_entity_types,
    filter_kind_matches_entity_types, relations_query_from_filter, search_query_from_filter,
    FilterResolver, Resolution, ResolvedAliasFilter,
};
pub use slot::{TaskSlot, TaskSlots};
pub use state::{
    decode_state_stack, encode_state_stack, update_entity_params, StateController, StateSnapshot,
};
pub use subscription::{
    CommandOptions, CommandState, DataFunctionRegistry, DataKeyData, DatasourceData,
    DefaultFunctionRegistry, NullListener, SubscriptionContext, SubscriptionListener,
    SubscriptionState, WidgetSubscription, WidgetSubscriptionOptions,
};
