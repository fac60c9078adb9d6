//! Widget type loader/cache: fetches and compiles widget type definitions,
//! deduplicating concurrent fetches per type id (single-flight). Load and
//! compile failures are converted into first-class cached fallback values -
//! the error widget type and the missing widget type - so every concurrent
//! waiter observes the same outcome and nothing is refetched per caller.
//!
//! The cache is an injected object scoped to the dashboard session, not a
//! process-wide global.

use crate::behavior::{noop_factory, BehaviorCompiler, BehaviorFactory};
use crate::provider::WidgetTypeProvider;
use dashmap::DashMap;
use dashstream_model::{WidgetKind, WidgetTypeDescriptor};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Outcome class of a widget type load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetInfoStatus {
    Normal,
    /// The type id does not exist in widget type storage.
    Missing,
    /// Fetch or compilation failed.
    LoadError(String),
}

/// Cached, compiled widget type.
pub struct WidgetInfo {
    pub descriptor: WidgetTypeDescriptor,
    pub factory: Arc<dyn BehaviorFactory>,
    pub status: WidgetInfoStatus,
}

impl WidgetInfo {
    pub fn is_error(&self) -> bool {
        matches!(self.status, WidgetInfoStatus::LoadError(_))
    }

    pub fn is_missing(&self) -> bool {
        self.status == WidgetInfoStatus::Missing
    }
}

type InFlight = Shared<BoxFuture<'static, Arc<WidgetInfo>>>;

pub struct WidgetTypeCache {
    provider: Arc<dyn WidgetTypeProvider>,
    compiler: Arc<dyn BehaviorCompiler>,
    cache: Arc<DashMap<String, Arc<WidgetInfo>>>,
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
}

impl WidgetTypeCache {
    pub fn new(provider: Arc<dyn WidgetTypeProvider>, compiler: Arc<dyn BehaviorCompiler>) -> Self {
        Self {
            provider,
            compiler,
            cache: Arc::new(DashMap::new()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Get the compiled info for a widget type, fetching at most once per
    /// type id regardless of how many widgets ask concurrently.
    pub async fn get_widget_info(&self, type_fqn: &str) -> Arc<WidgetInfo> {
        if let Some(hit) = self.cache.get(type_fqn) {
            return Arc::clone(&hit);
        }

        let fut = {
            let mut in_flight = self.in_flight.lock().unwrap();
            // a fetch may have completed between the cache probe and here
            if let Some(hit) = self.cache.get(type_fqn) {
                return Arc::clone(&hit);
            }
            if let Some(existing) = in_flight.get(type_fqn) {
                existing.clone()
            } else {
                let provider = Arc::clone(&self.provider);
                let compiler = Arc::clone(&self.compiler);
                let cache = Arc::clone(&self.cache);
                let in_flight_map = Arc::clone(&self.in_flight);
                let key = type_fqn.to_string();
                let fut: InFlight = async move {
                    let info = Arc::new(load_widget_info(provider, compiler, &key).await);
                    cache.insert(key.clone(), Arc::clone(&info));
                    in_flight_map.lock().unwrap().remove(&key);
                    info
                }
                .boxed()
                .shared();
                in_flight.insert(type_fqn.to_string(), fut.clone());
                fut
            }
        };

        fut.await
    }

    /// Install a compiled info directly (widget editor flow).
    pub fn put_widget_info(&self, info: Arc<WidgetInfo>) {
        self.cache.insert(info.descriptor.type_fqn.clone(), info);
    }

    pub fn invalidate(&self, type_fqn: &str) {
        self.cache.remove(type_fqn);
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

async fn load_widget_info(
    provider: Arc<dyn WidgetTypeProvider>,
    compiler: Arc<dyn BehaviorCompiler>,
    type_fqn: &str,
) -> WidgetInfo {
    match provider.get_widget_type(type_fqn).await {
        Ok(Some(descriptor)) => match compiler.compile(&descriptor) {
            Ok(factory) => {
                debug!(type_fqn, "widget type loaded");
                WidgetInfo {
                    descriptor,
                    factory,
                    status: WidgetInfoStatus::Normal,
                }
            }
            Err(err) => {
                warn!(type_fqn, %err, "widget type compilation failed");
                error_widget_info(type_fqn, err.to_string())
            }
        },
        Ok(None) => {
            warn!(type_fqn, "widget type not found");
            WidgetInfo {
                descriptor: fallback_descriptor(type_fqn, "Widget type not found"),
                factory: noop_factory(),
                status: WidgetInfoStatus::Missing,
            }
        }
        Err(err) => {
            warn!(type_fqn, %err, "widget type fetch failed");
            error_widget_info(type_fqn, err.to_string())
        }
    }
}

fn error_widget_info(type_fqn: &str, message: String) -> WidgetInfo {
    WidgetInfo {
        descriptor: fallback_descriptor(type_fqn, "Widget load error"),
        factory: noop_factory(),
        status: WidgetInfoStatus::LoadError(message),
    }
}

fn fallback_descriptor(type_fqn: &str, name: &str) -> WidgetTypeDescriptor {
    let mut descriptor = WidgetTypeDescriptor::new(type_fqn, WidgetKind::Static);
    descriptor.name = name.to_string();
    descriptor
}
