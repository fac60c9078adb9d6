//! Navigation state controller: an ordered stack of named states with
//! entity-bound parameters, persisted as a transport-safe token.

use crate::provider::EntityProvider;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashstream_model::state::DashboardState;
use dashstream_model::{EntityId, StateObject, StateParams};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, warn};

/// Snapshot of the active navigation state, published on every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub state_id: String,
    pub params: StateParams,
}

type OpenStateHook = Box<dyn Fn(&StateObject) + Send + Sync>;

pub struct StateController {
    states: HashMap<String, DashboardState>,
    root_state_id: String,
    entities: Arc<dyn EntityProvider>,
    stack: RwLock<Vec<StateObject>>,
    state_tx: watch::Sender<StateSnapshot>,
    token_tx: watch::Sender<String>,
    open_state_hook: RwLock<Option<OpenStateHook>>,
}

impl StateController {
    pub fn new(
        states: HashMap<String, DashboardState>,
        entities: Arc<dyn EntityProvider>,
    ) -> Arc<Self> {
        Self::with_initial_stack(states, entities, Vec::new())
    }

    /// Restore from a persisted token. Unknown state ids in the token are
    /// dropped; a token that decodes to nothing falls back to the root.
    pub fn from_token(
        states: HashMap<String, DashboardState>,
        entities: Arc<dyn EntityProvider>,
        token: &str,
    ) -> Arc<Self> {
        let stack = decode_state_stack(token, &states);
        Self::with_initial_stack(states, entities, stack)
    }

    fn with_initial_stack(
        states: HashMap<String, DashboardState>,
        entities: Arc<dyn EntityProvider>,
        mut stack: Vec<StateObject>,
    ) -> Arc<Self> {
        let root_state_id = root_state_id(&states);
        if stack.is_empty() {
            stack.push(StateObject::root(root_state_id.clone()));
        }
        let active = stack.last().expect("stack is never empty");
        let (state_tx, _) = watch::channel(StateSnapshot {
            state_id: active.id.clone(),
            params: active.params.clone(),
        });
        let (token_tx, _) = watch::channel(encode_state_stack(&stack));
        Arc::new(Self {
            states,
            root_state_id,
            entities,
            stack: RwLock::new(stack),
            state_tx,
            token_tx,
            open_state_hook: RwLock::new(None),
        })
    }

    /// Install the dashboard-level hook invoked on every transition.
    pub async fn set_open_state_hook(&self, hook: impl Fn(&StateObject) + Send + Sync + 'static) {
        *self.open_state_hook.write().await = Some(Box::new(hook));
    }

    pub fn state_changed(&self) -> watch::Receiver<StateSnapshot> {
        self.state_tx.subscribe()
    }

    /// Encoded form of the current stack, for URL/session persistence.
    pub fn state_token(&self) -> watch::Receiver<String> {
        self.token_tx.subscribe()
    }

    pub async fn get_state_id(&self) -> String {
        self.stack
            .read()
            .await
            .last()
            .map(|s| s.id.clone())
            .unwrap_or_else(|| self.root_state_id.clone())
    }

    pub async fn get_state_params(&self) -> StateParams {
        self.stack
            .read()
            .await
            .last()
            .map(|s| s.params.clone())
            .unwrap_or_default()
    }

    pub async fn get_state_stack(&self) -> Vec<StateObject> {
        self.stack.read().await.clone()
    }

    pub async fn stack_len(&self) -> usize {
        self.stack.read().await.len()
    }

    /// Push a new state. Unknown ids are a no-op; a missing referenced
    /// entity never blocks navigation.
    pub async fn open_state(&self, id: &str, params: StateParams) {
        if !self.states.contains_key(id) {
            warn!(state_id = id, "openState for unknown state id ignored");
            return;
        }
        let params = self.resolve_params(params).await;
        {
            let mut stack = self.stack.write().await;
            stack.push(StateObject::new(id, params));
        }
        self.notify().await;
    }

    /// Replace the top of the stack in place. `id` defaults to the current
    /// state, `params` to empty.
    pub async fn update_state(&self, id: Option<&str>, params: Option<StateParams>) {
        if let Some(id) = id {
            if !self.states.contains_key(id) {
                warn!(state_id = id, "updateState for unknown state id ignored");
                return;
            }
        }
        let params = self.resolve_params(params.unwrap_or_default()).await;
        {
            let mut stack = self.stack.write().await;
            let current = stack.pop().unwrap_or_else(|| {
                StateObject::root(self.root_state_id.clone())
            });
            let id = id.map(str::to_string).unwrap_or(current.id);
            stack.push(StateObject::new(id, params));
        }
        self.notify().await;
    }

    /// Truncate the stack after `index` and re-activate the new tail
    /// ("back" semantics). Out-of-range indexes are a no-op.
    pub async fn navigate_prev_state(&self, index: usize) {
        {
            let mut stack = self.stack.write().await;
            if index + 1 >= stack.len() {
                return;
            }
            stack.truncate(index + 1);
        }
        self.notify().await;
    }

    /// Collapse the stack to a single root entry.
    pub async fn reset_state(&self) {
        {
            let mut stack = self.stack.write().await;
            stack.clear();
            stack.push(StateObject::root(self.root_state_id.clone()));
        }
        self.notify().await;
    }

    async fn resolve_params(&self, mut params: StateParams) -> StateParams {
        if let (Some(entity_id), None) = (params.entity_id, &params.entity_name) {
            match self
                .entities
                .get_entity_or_none(entity_id.entity_type, entity_id.id)
                .await
            {
                Some(info) => {
                    params.entity_name = Some(info.name);
                    if !info.label.is_empty() {
                        params.entity_label = Some(info.label);
                    }
                }
                None => {
                    debug!(?entity_id, "state entity lookup failed, navigating without name");
                }
            }
        }
        params
    }

    async fn notify(&self) {
        let stack = self.stack.read().await;
        let active = stack.last().expect("stack is never empty");
        if let Some(hook) = self.open_state_hook.read().await.as_ref() {
            hook(active);
        }
        let _ = self.state_tx.send(StateSnapshot {
            state_id: active.id.clone(),
            params: active.params.clone(),
        });
        let _ = self.token_tx.send(encode_state_stack(&stack));
    }
}

/// Serialize a state stack to a URL-safe token.
pub fn encode_state_stack(stack: &[StateObject]) -> String {
    let json = serde_json::to_vec(stack).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode a persisted token. Total: malformed tokens decode to an empty
/// stack and entries with unknown state ids are dropped.
pub fn decode_state_stack(
    token: &str,
    states: &HashMap<String, DashboardState>,
) -> Vec<StateObject> {
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(token.trim()) else {
        warn!("state token is not valid base64, discarding");
        return Vec::new();
    };
    let decoded: Vec<StateObject> = match serde_json::from_slice(&bytes) {
        Ok(stack) => stack,
        Err(err) => {
            warn!(%err, "state token payload is not a state stack, discarding");
            return Vec::new();
        }
    };
    decoded
        .into_iter()
        .filter(|entry| {
            let known = states.contains_key(&entry.id);
            if !known {
                debug!(state_id = %entry.id, "dropping unknown state id from token");
            }
            known
        })
        .collect()
}

/// Write an entity binding into navigation params, under `target_param_name`
/// when given (creating the sub-params entry), at top level otherwise. Used
/// by widget navigation actions.
pub fn update_entity_params(
    params: &mut StateParams,
    target_param_name: Option<&str>,
    entity_id: EntityId,
    entity_name: Option<&str>,
    entity_label: Option<&str>,
) {
    let target = match target_param_name {
        Some(name) => {
            params.target_entity_param_name = Some(name.to_string());
            params.sub_params.entry(name.to_string()).or_default()
        }
        None => params,
    };
    target.entity_id = Some(entity_id);
    if let Some(name) = entity_name {
        target.entity_name = Some(name.to_string());
    }
    if let Some(label) = entity_label {
        target.entity_label = Some(label.to_string());
    }
}

fn root_state_id(states: &HashMap<String, DashboardState>) -> String {
    if let Some((id, _)) = states.iter().find(|(_, s)| s.root) {
        return id.clone();
    }
    let mut ids: Vec<&String> = states.keys().collect();
    ids.sort();
    ids.first()
        .map(|id| (*id).clone())
        .unwrap_or_else(|| "default".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeEntityProvider;
    use dashstream_model::EntityType;

    fn states() -> HashMap<String, DashboardState> {
        let mut map = HashMap::new();
        map.insert(
            "root".to_string(),
            DashboardState {
                name: "Root".to_string(),
                root: true,
            },
        );
        map.insert(
            "detail".to_string(),
            DashboardState {
                name: "Detail".to_string(),
                root: false,
            },
        );
        map
    }

    #[tokio::test]
    async fn open_state_pushes_and_resolves_entity_once() {
        let entities = Arc::new(FakeEntityProvider::new());
        let device = entities.add_entity(EntityType::Device, "dev-1");
        let controller = StateController::new(states(), entities.clone());

        controller
            .open_state("detail", StateParams::with_entity(device))
            .await;

        assert_eq!(controller.stack_len().await, 2);
        assert_eq!(controller.get_state_id().await, "detail");
        let params = controller.get_state_params().await;
        assert_eq!(params.entity_name.as_deref(), Some("dev-1"));
        assert_eq!(entities.get_entity_calls(), 1);
    }

    #[tokio::test]
    async fn unknown_state_id_is_a_noop() {
        let controller = StateController::new(states(), Arc::new(FakeEntityProvider::new()));
        controller.open_state("nope", StateParams::default()).await;
        assert_eq!(controller.stack_len().await, 1);
        assert_eq!(controller.get_state_id().await, "root");
    }

    #[tokio::test]
    async fn missing_entity_does_not_block_navigation() {
        let entities = Arc::new(FakeEntityProvider::new());
        let controller = StateController::new(states(), entities);
        let ghost = EntityId::new(EntityType::Device, uuid::Uuid::new_v4());

        controller
            .open_state("detail", StateParams::with_entity(ghost))
            .await;

        assert_eq!(controller.get_state_id().await, "detail");
        let params = controller.get_state_params().await;
        assert_eq!(params.entity_id, Some(ghost));
        assert!(params.entity_name.is_none());
    }

    #[tokio::test]
    async fn update_state_replaces_top() {
        let entities = Arc::new(FakeEntityProvider::new());
        let device = entities.add_entity(EntityType::Device, "dev-1");
        let controller = StateController::new(states(), entities);

        controller.open_state("detail", StateParams::default()).await;
        controller
            .update_state(None, Some(StateParams::with_entity(device)))
            .await;

        assert_eq!(controller.stack_len().await, 2);
        assert_eq!(controller.get_state_id().await, "detail");
        assert_eq!(
            controller.get_state_params().await.entity_name.as_deref(),
            Some("dev-1")
        );
    }

    #[tokio::test]
    async fn navigate_prev_truncates() {
        let controller = StateController::new(states(), Arc::new(FakeEntityProvider::new()));
        controller.open_state("detail", StateParams::default()).await;
        controller.open_state("detail", StateParams::default()).await;
        assert_eq!(controller.stack_len().await, 3);

        controller.navigate_prev_state(0).await;
        assert_eq!(controller.stack_len().await, 1);
        assert_eq!(controller.get_state_id().await, "root");

        // out of range: no-op
        controller.navigate_prev_state(5).await;
        assert_eq!(controller.stack_len().await, 1);
    }

    #[tokio::test]
    async fn reset_collapses_to_root() {
        let controller = StateController::new(states(), Arc::new(FakeEntityProvider::new()));
        controller.open_state("detail", StateParams::default()).await;
        controller.reset_state().await;
        assert_eq!(controller.stack_len().await, 1);
        assert_eq!(controller.get_state_id().await, "root");
    }

    #[tokio::test]
    async fn transitions_publish_snapshot_and_token() {
        let controller = StateController::new(states(), Arc::new(FakeEntityProvider::new()));
        let mut snapshots = controller.state_changed();
        let token_rx = controller.state_token();

        controller.open_state("detail", StateParams::default()).await;
        snapshots.changed().await.unwrap();
        assert_eq!(snapshots.borrow().state_id, "detail");

        let decoded = decode_state_stack(&token_rx.borrow(), &states());
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn token_roundtrip_drops_unknown_ids() {
        let stack = vec![
            StateObject::root("root"),
            StateObject::root("removed-state"),
            StateObject::root("detail"),
        ];
        let token = encode_state_stack(&stack);
        let decoded = decode_state_stack(&token, &states());
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].id, "root");
        assert_eq!(decoded[1].id, "detail");
    }

    #[test]
    fn decode_never_panics_on_garbage() {
        assert!(decode_state_stack("%%% not base64 %%%", &states()).is_empty());
        let not_a_stack = URL_SAFE_NO_PAD.encode(b"{\"hello\": 1}");
        assert!(decode_state_stack(&not_a_stack, &states()).is_empty());
    }

    #[tokio::test]
    async fn from_token_restores_stack() {
        let stack = vec![StateObject::root("root"), StateObject::root("detail")];
        let token = encode_state_stack(&stack);
        let controller = StateController::from_token(
            states(),
            Arc::new(FakeEntityProvider::new()),
            &token,
        );
        assert_eq!(controller.stack_len().await, 2);
        assert_eq!(controller.get_state_id().await, "detail");
    }

    #[test]
    fn update_entity_params_writes_named_binding() {
        let mut params = StateParams::default();
        let device = EntityId::new(EntityType::Device, uuid::Uuid::new_v4());
        update_entity_params(&mut params, Some("selected"), device, Some("dev-1"), None);

        assert_eq!(params.target_entity_param_name.as_deref(), Some("selected"));
        let bound = params.sub_params.get("selected").unwrap();
        assert_eq!(bound.entity_id, Some(device));
        assert_eq!(bound.entity_name.as_deref(), Some("dev-1"));
    }
}
