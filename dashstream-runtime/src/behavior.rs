//! Widget behavior contract and the pluggable compilation strategy.
//!
//! A behavior implements the lifecycle hooks a widget type needs; every hook
//! has a default no-op, resolved once at load time - call sites never probe
//! for optional methods. Compilation (turning a stored widget type
//! descriptor into a behavior factory) is a strategy trait so embedders can
//! plug script engines or code registries without touching the runtime.

use crate::error::{BehaviorError, CompileError};
use crate::subscription::DatasourceData;
use dashstream_model::WidgetTypeDescriptor;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Read snapshot handed to behavior hooks.
pub struct BehaviorCtx<'a> {
    pub widget_id: Uuid,
    pub settings: &'a serde_json::Value,
    pub data: &'a [DatasourceData],
    pub width: u32,
    pub height: u32,
    pub is_edit: bool,
    pub is_mobile: bool,
}

/// Lifecycle hooks implemented by compiled widget behavior. All hooks
/// default to no-ops; errors are caught per invocation by the widget
/// runtime and never propagate to sibling widgets.
pub trait WidgetBehavior: Send {
    fn on_init(&mut self, _ctx: &BehaviorCtx<'_>) -> Result<(), BehaviorError> {
        Ok(())
    }

    fn on_data_updated(&mut self, _ctx: &BehaviorCtx<'_>) -> Result<(), BehaviorError> {
        Ok(())
    }

    fn on_latest_data_updated(&mut self, _ctx: &BehaviorCtx<'_>) -> Result<(), BehaviorError> {
        Ok(())
    }

    fn on_resize(&mut self, _ctx: &BehaviorCtx<'_>) -> Result<(), BehaviorError> {
        Ok(())
    }

    fn on_edit_mode_changed(&mut self, _ctx: &BehaviorCtx<'_>) -> Result<(), BehaviorError> {
        Ok(())
    }

    fn on_mobile_mode_changed(&mut self, _ctx: &BehaviorCtx<'_>) -> Result<(), BehaviorError> {
        Ok(())
    }

    fn on_destroy(&mut self) {}
}

/// Behavior with every hook left at its default.
pub struct NoopBehavior;

impl WidgetBehavior for NoopBehavior {}

/// Creates behavior instances for materialized widgets of one type.
pub trait BehaviorFactory: Send + Sync {
    fn create(&self) -> Box<dyn WidgetBehavior>;
}

impl<F> BehaviorFactory for F
where
    F: Fn() -> Box<dyn WidgetBehavior> + Send + Sync,
{
    fn create(&self) -> Box<dyn WidgetBehavior> {
        self()
    }
}

pub fn noop_factory() -> Arc<dyn BehaviorFactory> {
    Arc::new(|| Box::new(NoopBehavior) as Box<dyn WidgetBehavior>)
}

/// Strategy turning a stored widget type descriptor into a behavior
/// factory, once per type load.
pub trait BehaviorCompiler: Send + Sync {
    fn compile(
        &self,
        descriptor: &WidgetTypeDescriptor,
    ) -> Result<Arc<dyn BehaviorFactory>, CompileError>;
}

/// Default compiler: resolves `descriptor.behavior` against a name
/// registry. An empty behavior name compiles to the no-op behavior; an
/// unregistered one is a compile error (which the loader converts to the
/// error widget type).
#[derive(Default)]
pub struct RegistryBehaviorCompiler {
    factories: RwLock<HashMap<String, Arc<dyn BehaviorFactory>>>,
}

impl RegistryBehaviorCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, factory: Arc<dyn BehaviorFactory>) {
        self.factories.write().unwrap().insert(name.into(), factory);
    }
}

impl BehaviorCompiler for RegistryBehaviorCompiler {
    fn compile(
        &self,
        descriptor: &WidgetTypeDescriptor,
    ) -> Result<Arc<dyn BehaviorFactory>, CompileError> {
        if descriptor.behavior.is_empty() {
            return Ok(noop_factory());
        }
        self.factories
            .read()
            .unwrap()
            .get(&descriptor.behavior)
            .cloned()
            .ok_or_else(|| CompileError::UnknownBehavior(descriptor.behavior.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashstream_model::WidgetKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    impl WidgetBehavior for Counting {
        fn on_init(&mut self, _ctx: &BehaviorCtx<'_>) -> Result<(), BehaviorError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn registry_resolves_behaviors_once() {
        let compiler = RegistryBehaviorCompiler::new();
        let inits = Arc::new(AtomicUsize::new(0));
        let inits_factory = inits.clone();
        compiler.register(
            "counting",
            Arc::new(move || {
                Box::new(Counting(inits_factory.clone())) as Box<dyn WidgetBehavior>
            }),
        );

        let mut descriptor = WidgetTypeDescriptor::new("charts.count", WidgetKind::Latest);
        descriptor.behavior = "counting".to_string();
        let factory = compiler.compile(&descriptor).unwrap();

        let mut behavior = factory.create();
        let ctx = BehaviorCtx {
            widget_id: Uuid::new_v4(),
            settings: &serde_json::Value::Null,
            data: &[],
            width: 100,
            height: 100,
            is_edit: false,
            is_mobile: false,
        };
        behavior.on_init(&ctx).unwrap();
        assert_eq!(inits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_behavior_compiles_to_noop() {
        let compiler = RegistryBehaviorCompiler::new();
        let descriptor = WidgetTypeDescriptor::new("charts.static", WidgetKind::Static);
        assert!(compiler.compile(&descriptor).is_ok());
    }

    #[test]
    fn unknown_behavior_is_a_compile_error() {
        let compiler = RegistryBehaviorCompiler::new();
        let mut descriptor = WidgetTypeDescriptor::new("charts.custom", WidgetKind::Latest);
        descriptor.behavior = "not-registered".to_string();
        assert!(matches!(
            compiler.compile(&descriptor),
            Err(CompileError::UnknownBehavior(_))
        ));
    }
}
