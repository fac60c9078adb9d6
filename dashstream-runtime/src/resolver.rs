//! Alias filter resolution: turns a declarative [`EntityAliasFilter`] plus
//! current navigation params into a concrete, executable [`EntityFilter`].
//!
//! Resolution is pure apart from reading the authenticated session snapshot.
//! A filter that cannot be bound (unbound state entity, missing pseudo id)
//! resolves to [`Resolution::Unresolved`] - absence, not an error; dependent
//! subscriptions suppress their queries cleanly.

use crate::provider::AuthState;
use dashstream_model::{
    AliasEntityId, AliasEntityType, AliasFilterKind, Authority, EntityAlias, EntityAliasFilter,
    EntityFilter, EntityId, EntityType, EntityTypeSpec, StateParams,
};
use dashstream_model::alias::QueryRoot;
use dashstream_model::query::{EntityRelationsQuery, EntitySearchQuery};
use std::sync::Arc;

/// Outcome of resolving one alias filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(ResolvedAliasFilter),
    Unresolved,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }

    pub fn filter(&self) -> Option<&EntityFilter> {
        match self {
            Resolution::Resolved(resolved) => Some(&resolved.filter),
            Resolution::Unresolved => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAliasFilter {
    pub filter: EntityFilter,
    /// Whether the result depends on navigation state (re-resolve on state
    /// changes).
    pub state_entity: bool,
    /// Named state parameter the filter binds to, if any.
    pub entity_param_name: Option<String>,
}

pub struct FilterResolver {
    auth: Arc<dyn AuthState>,
}

impl FilterResolver {
    pub fn new(auth: Arc<dyn AuthState>) -> Self {
        Self { auth }
    }

    pub fn resolve(&self, filter: &EntityAliasFilter, params: &StateParams) -> Resolution {
        let state_dependent = filter.is_state_dependent();

        match filter {
            EntityAliasFilter::SingleEntity { entity } => {
                match self.resolve_alias_entity_id(entity) {
                    Some(entity) => resolved(EntityFilter::SingleEntity { entity }, false, None),
                    None => Resolution::Unresolved,
                }
            }
            EntityAliasFilter::EntityList {
                entity_type,
                entity_list,
            } => resolved(
                EntityFilter::EntityList {
                    entity_type: *entity_type,
                    entity_list: entity_list.clone(),
                },
                false,
                None,
            ),
            EntityAliasFilter::EntityName {
                entity_type,
                entity_name_filter,
            } => resolved(
                EntityFilter::EntityName {
                    entity_type: *entity_type,
                    entity_name_filter: entity_name_filter.clone(),
                },
                false,
                None,
            ),
            EntityAliasFilter::EntityByType { entity_type } => resolved(
                EntityFilter::EntityByType {
                    entity_type: *entity_type,
                },
                false,
                None,
            ),
            EntityAliasFilter::StateEntity {
                state_entity_param_name,
                default_state_entity,
            } => {
                let param_name = state_entity_param_name.clone();
                match self.state_entity_id(
                    state_entity_param_name.as_deref(),
                    default_state_entity.as_ref(),
                    params,
                ) {
                    // A bound state entity is executable as a single-entity
                    // query; the state-bound provenance is kept alongside.
                    Some(entity) => resolved(
                        EntityFilter::SingleEntity { entity },
                        true,
                        param_name,
                    ),
                    None => Resolution::Unresolved,
                }
            }
            EntityAliasFilter::AssetType {
                asset_types,
                asset_name_filter,
            } => resolved(
                EntityFilter::AssetType {
                    asset_types: asset_types.clone(),
                    asset_name_filter: asset_name_filter.clone(),
                },
                false,
                None,
            ),
            EntityAliasFilter::DeviceType {
                device_types,
                device_name_filter,
            } => resolved(
                EntityFilter::DeviceType {
                    device_types: device_types.clone(),
                    device_name_filter: device_name_filter.clone(),
                },
                false,
                None,
            ),
            EntityAliasFilter::EdgeType {
                edge_types,
                edge_name_filter,
            } => resolved(
                EntityFilter::EdgeType {
                    edge_types: edge_types.clone(),
                    edge_name_filter: edge_name_filter.clone(),
                },
                false,
                None,
            ),
            EntityAliasFilter::EntityViewType {
                entity_view_types,
                entity_view_name_filter,
            } => resolved(
                EntityFilter::EntityViewType {
                    entity_view_types: entity_view_types.clone(),
                    entity_view_name_filter: entity_view_name_filter.clone(),
                },
                false,
                None,
            ),
            EntityAliasFilter::RelationsQuery {
                root,
                direction,
                max_level,
                fetch_last_level_only,
                filters,
            } => match self.resolve_query_root(root, params) {
                Some(root_entity) => resolved(
                    EntityFilter::RelationsQuery {
                        root_entity,
                        direction: *direction,
                        max_level: *max_level,
                        fetch_last_level_only: *fetch_last_level_only,
                        filters: filters.clone(),
                    },
                    state_dependent,
                    root.state_entity_param_name.clone(),
                ),
                None => Resolution::Unresolved,
            },
            EntityAliasFilter::AssetSearchQuery {
                root,
                direction,
                max_level,
                fetch_last_level_only,
                relation_type,
                asset_types,
            } => match self.resolve_query_root(root, params) {
                Some(root_entity) => resolved(
                    EntityFilter::AssetSearchQuery {
                        root_entity,
                        direction: *direction,
                        max_level: *max_level,
                        fetch_last_level_only: *fetch_last_level_only,
                        relation_type: relation_type.clone(),
                        asset_types: asset_types.clone(),
                    },
                    state_dependent,
                    root.state_entity_param_name.clone(),
                ),
                None => Resolution::Unresolved,
            },
            EntityAliasFilter::DeviceSearchQuery {
                root,
                direction,
                max_level,
                fetch_last_level_only,
                relation_type,
                device_types,
            } => match self.resolve_query_root(root, params) {
                Some(root_entity) => resolved(
                    EntityFilter::DeviceSearchQuery {
                        root_entity,
                        direction: *direction,
                        max_level: *max_level,
                        fetch_last_level_only: *fetch_last_level_only,
                        relation_type: relation_type.clone(),
                        device_types: device_types.clone(),
                    },
                    state_dependent,
                    root.state_entity_param_name.clone(),
                ),
                None => Resolution::Unresolved,
            },
            EntityAliasFilter::EdgeSearchQuery {
                root,
                direction,
                max_level,
                fetch_last_level_only,
                relation_type,
                edge_types,
            } => match self.resolve_query_root(root, params) {
                Some(root_entity) => resolved(
                    EntityFilter::EdgeSearchQuery {
                        root_entity,
                        direction: *direction,
                        max_level: *max_level,
                        fetch_last_level_only: *fetch_last_level_only,
                        relation_type: relation_type.clone(),
                        edge_types: edge_types.clone(),
                    },
                    state_dependent,
                    root.state_entity_param_name.clone(),
                ),
                None => Resolution::Unresolved,
            },
            EntityAliasFilter::EntityViewSearchQuery {
                root,
                direction,
                max_level,
                fetch_last_level_only,
                relation_type,
                entity_view_types,
            } => match self.resolve_query_root(root, params) {
                Some(root_entity) => resolved(
                    EntityFilter::EntityViewSearchQuery {
                        root_entity,
                        direction: *direction,
                        max_level: *max_level,
                        fetch_last_level_only: *fetch_last_level_only,
                        relation_type: relation_type.clone(),
                        entity_view_types: entity_view_types.clone(),
                    },
                    state_dependent,
                    root.state_entity_param_name.clone(),
                ),
                None => Resolution::Unresolved,
            },
        }
    }

    /// Substitute a declared entity reference with a concrete id. Pseudo
    /// references pull the corresponding id from the session snapshot;
    /// "owner" picks tenant or customer depending on the caller's authority.
    pub fn resolve_alias_entity_id(&self, entity: &AliasEntityId) -> Option<EntityId> {
        match entity.entity_type {
            EntityTypeSpec::Concrete(entity_type) => {
                entity.id.map(|id| EntityId::new(entity_type, id))
            }
            EntityTypeSpec::Pseudo(pseudo) => {
                let user = self.auth.current_user()?;
                match pseudo {
                    AliasEntityType::CurrentUser => {
                        Some(EntityId::new(EntityType::User, user.user_id))
                    }
                    AliasEntityType::CurrentTenant => {
                        Some(EntityId::new(EntityType::Tenant, user.tenant_id))
                    }
                    AliasEntityType::CurrentCustomer => user
                        .customer_id
                        .or(entity.id)
                        .map(|id| EntityId::new(EntityType::Customer, id)),
                    AliasEntityType::CurrentUserOwner => match user.authority {
                        Authority::CustomerUser => user
                            .customer_id
                            .map(|id| EntityId::new(EntityType::Customer, id)),
                        Authority::TenantAdmin | Authority::SysAdmin => {
                            Some(EntityId::new(EntityType::Tenant, user.tenant_id))
                        }
                    },
                }
            }
        }
    }

    fn state_entity_id(
        &self,
        param_name: Option<&str>,
        default: Option<&AliasEntityId>,
        params: &StateParams,
    ) -> Option<EntityId> {
        params
            .entity_for_param(param_name)
            .or_else(|| default.and_then(|d| self.resolve_alias_entity_id(d)))
    }

    fn resolve_query_root(&self, root: &QueryRoot, params: &StateParams) -> Option<EntityId> {
        if root.root_state_entity {
            self.state_entity_id(
                root.state_entity_param_name.as_deref(),
                root.default_state_entity.as_ref(),
                params,
            )
        } else {
            root.root_entity
                .as_ref()
                .and_then(|r| self.resolve_alias_entity_id(r))
        }
    }
}

fn resolved(
    filter: EntityFilter,
    state_entity: bool,
    entity_param_name: Option<String>,
) -> Resolution {
    Resolution::Resolved(ResolvedAliasFilter {
        filter,
        state_entity,
        entity_param_name,
    })
}

/// Build the backend relations query for a resolved relations filter.
pub fn relations_query_from_filter(filter: &EntityFilter) -> Option<EntityRelationsQuery> {
    match filter {
        EntityFilter::RelationsQuery {
            root_entity,
            direction,
            max_level,
            fetch_last_level_only,
            filters,
        } => Some(EntityRelationsQuery {
            root_entity: *root_entity,
            direction: *direction,
            max_level: effective_max_level(*max_level),
            fetch_last_level_only: *fetch_last_level_only,
            filters: filters.clone(),
        }),
        _ => None,
    }
}

/// Build the backend search query for a resolved typed search filter.
pub fn search_query_from_filter(filter: &EntityFilter) -> Option<EntitySearchQuery> {
    let (root_entity, direction, max_level, relation_type, entity_type, types) = match filter {
        EntityFilter::AssetSearchQuery {
            root_entity,
            direction,
            max_level,
            relation_type,
            asset_types,
            ..
        } => (
            root_entity,
            direction,
            max_level,
            relation_type,
            EntityType::Asset,
            asset_types,
        ),
        EntityFilter::DeviceSearchQuery {
            root_entity,
            direction,
            max_level,
            relation_type,
            device_types,
            ..
        } => (
            root_entity,
            direction,
            max_level,
            relation_type,
            EntityType::Device,
            device_types,
        ),
        EntityFilter::EdgeSearchQuery {
            root_entity,
            direction,
            max_level,
            relation_type,
            edge_types,
            ..
        } => (
            root_entity,
            direction,
            max_level,
            relation_type,
            EntityType::Edge,
            edge_types,
        ),
        EntityFilter::EntityViewSearchQuery {
            root_entity,
            direction,
            max_level,
            relation_type,
            entity_view_types,
            ..
        } => (
            root_entity,
            direction,
            max_level,
            relation_type,
            EntityType::EntityView,
            entity_view_types,
        ),
        _ => return None,
    };
    Some(EntitySearchQuery {
        root_entity: *root_entity,
        direction: *direction,
        max_level: effective_max_level(*max_level),
        relation_type: relation_type.clone(),
        entity_type,
        types: types.clone(),
    })
}

fn effective_max_level(max_level: i32) -> i32 {
    if max_level > 0 {
        max_level
    } else {
        -1
    }
}

/// Whether a filter kind can yield entities of any of the given types. An
/// empty type set allows every kind. Exhaustive over all variants.
pub fn filter_kind_matches_entity_types(
    kind: AliasFilterKind,
    entity_types: &[EntityType],
) -> bool {
    if entity_types.is_empty() {
        return true;
    }
    match kind {
        AliasFilterKind::SingleEntity
        | AliasFilterKind::EntityList
        | AliasFilterKind::EntityName
        | AliasFilterKind::EntityByType
        | AliasFilterKind::StateEntity
        | AliasFilterKind::RelationsQuery => true,
        AliasFilterKind::AssetType | AliasFilterKind::AssetSearchQuery => {
            entity_types.contains(&EntityType::Asset)
        }
        AliasFilterKind::DeviceType | AliasFilterKind::DeviceSearchQuery => {
            entity_types.contains(&EntityType::Device)
        }
        AliasFilterKind::EdgeType | AliasFilterKind::EdgeSearchQuery => {
            entity_types.contains(&EntityType::Edge)
        }
        AliasFilterKind::EntityViewType | AliasFilterKind::EntityViewSearchQuery => {
            entity_types.contains(&EntityType::EntityView)
        }
    }
}

/// Filter kinds offered for a given allowed-entity-type set.
pub fn alias_filter_kinds_for_entity_types(entity_types: &[EntityType]) -> Vec<AliasFilterKind> {
    AliasFilterKind::ALL
        .into_iter()
        .filter(|kind| filter_kind_matches_entity_types(*kind, entity_types))
        .collect()
}

/// Whether a concrete alias declaration can yield entities of any of the
/// given types. Stricter than the kind-level check: it also inspects the
/// declared fields. Exhaustive over all variants.
pub fn alias_matches_entity_types(alias: &EntityAlias, entity_types: &[EntityType]) -> bool {
    if entity_types.is_empty() {
        return true;
    }
    if !filter_kind_matches_entity_types(alias.filter.kind(), entity_types) {
        return false;
    }
    match &alias.filter {
        EntityAliasFilter::SingleEntity { entity } => match entity.entity_type {
            EntityTypeSpec::Concrete(entity_type) => entity_types.contains(&entity_type),
            EntityTypeSpec::Pseudo(pseudo) => match pseudo {
                AliasEntityType::CurrentUser => entity_types.contains(&EntityType::User),
                AliasEntityType::CurrentTenant => entity_types.contains(&EntityType::Tenant),
                AliasEntityType::CurrentCustomer => entity_types.contains(&EntityType::Customer),
                AliasEntityType::CurrentUserOwner => {
                    entity_types.contains(&EntityType::Tenant)
                        || entity_types.contains(&EntityType::Customer)
                }
            },
        },
        EntityAliasFilter::EntityList { entity_type, .. }
        | EntityAliasFilter::EntityName { entity_type, .. }
        | EntityAliasFilter::EntityByType { entity_type } => entity_types.contains(entity_type),
        EntityAliasFilter::StateEntity { .. } => true,
        EntityAliasFilter::AssetType { .. } => entity_types.contains(&EntityType::Asset),
        EntityAliasFilter::DeviceType { .. } => entity_types.contains(&EntityType::Device),
        EntityAliasFilter::EdgeType { .. } => entity_types.contains(&EntityType::Edge),
        EntityAliasFilter::EntityViewType { .. } => entity_types.contains(&EntityType::EntityView),
        EntityAliasFilter::RelationsQuery { filters, .. } => {
            if filters.is_empty() {
                return true;
            }
            filters.iter().any(|relation_filter| {
                relation_filter.entity_types.is_empty()
                    || relation_filter
                        .entity_types
                        .iter()
                        .any(|t| entity_types.contains(t))
            })
        }
        EntityAliasFilter::AssetSearchQuery { .. } => entity_types.contains(&EntityType::Asset),
        EntityAliasFilter::DeviceSearchQuery { .. } => entity_types.contains(&EntityType::Device),
        EntityAliasFilter::EdgeSearchQuery { .. } => entity_types.contains(&EntityType::Edge),
        EntityAliasFilter::EntityViewSearchQuery { .. } => {
            entity_types.contains(&EntityType::EntityView)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticAuthState;
    use dashstream_model::{AuthUser, EntitySearchDirection};
    use uuid::Uuid;

    fn tenant_admin() -> (AuthUser, Arc<StaticAuthState>) {
        let user = AuthUser {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            customer_id: None,
            authority: Authority::TenantAdmin,
        };
        let auth = Arc::new(StaticAuthState::new(user.clone()));
        (user, auth)
    }

    fn customer_user() -> (AuthUser, Arc<StaticAuthState>) {
        let user = AuthUser {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            customer_id: Some(Uuid::new_v4()),
            authority: Authority::CustomerUser,
        };
        let auth = Arc::new(StaticAuthState::new(user.clone()));
        (user, auth)
    }

    #[test]
    fn single_entity_without_id_is_unresolved() {
        let (_, auth) = tenant_admin();
        let resolver = FilterResolver::new(auth);
        let filter = EntityAliasFilter::SingleEntity {
            entity: AliasEntityId {
                entity_type: EntityTypeSpec::Concrete(EntityType::Device),
                id: None,
            },
        };
        assert_eq!(
            resolver.resolve(&filter, &StateParams::default()),
            Resolution::Unresolved
        );
    }

    #[test]
    fn current_user_substitution() {
        let (user, auth) = tenant_admin();
        let resolver = FilterResolver::new(auth);
        let filter = EntityAliasFilter::SingleEntity {
            entity: AliasEntityId::pseudo(AliasEntityType::CurrentUser),
        };
        let resolution = resolver.resolve(&filter, &StateParams::default());
        assert_eq!(
            resolution.filter(),
            Some(&EntityFilter::SingleEntity {
                entity: EntityId::new(EntityType::User, user.user_id)
            })
        );
    }

    #[test]
    fn owner_depends_on_authority() {
        let (tenant, auth) = tenant_admin();
        let resolver = FilterResolver::new(auth);
        let filter = EntityAliasFilter::SingleEntity {
            entity: AliasEntityId::pseudo(AliasEntityType::CurrentUserOwner),
        };
        let resolution = resolver.resolve(&filter, &StateParams::default());
        assert_eq!(
            resolution.filter(),
            Some(&EntityFilter::SingleEntity {
                entity: EntityId::new(EntityType::Tenant, tenant.tenant_id)
            })
        );

        let (customer, auth) = customer_user();
        let resolver = FilterResolver::new(auth);
        let resolution = resolver.resolve(&filter, &StateParams::default());
        assert_eq!(
            resolution.filter(),
            Some(&EntityFilter::SingleEntity {
                entity: EntityId::new(EntityType::Customer, customer.customer_id.unwrap())
            })
        );
    }

    #[test]
    fn state_entity_resolves_from_params() {
        let (_, auth) = tenant_admin();
        let resolver = FilterResolver::new(auth);
        let device = EntityId::new(EntityType::Device, Uuid::new_v4());

        let filter = EntityAliasFilter::StateEntity {
            state_entity_param_name: None,
            default_state_entity: None,
        };

        // unbound: absence, not error
        assert_eq!(
            resolver.resolve(&filter, &StateParams::default()),
            Resolution::Unresolved
        );

        let params = StateParams::with_entity(device);
        match resolver.resolve(&filter, &params) {
            Resolution::Resolved(resolved) => {
                assert!(resolved.state_entity);
                assert_eq!(
                    resolved.filter,
                    EntityFilter::SingleEntity { entity: device }
                );
            }
            Resolution::Unresolved => panic!("expected resolved"),
        }
    }

    #[test]
    fn state_entity_named_param_and_default() {
        let (_, auth) = tenant_admin();
        let resolver = FilterResolver::new(auth);
        let bound = EntityId::new(EntityType::Asset, Uuid::new_v4());
        let fallback = EntityId::new(EntityType::Asset, Uuid::new_v4());

        let filter = EntityAliasFilter::StateEntity {
            state_entity_param_name: Some("selected".to_string()),
            default_state_entity: Some(fallback.into()),
        };

        let mut params = StateParams::default();
        params
            .sub_params
            .insert("selected".to_string(), StateParams::with_entity(bound));
        assert_eq!(
            resolver.resolve(&filter, &params).filter(),
            Some(&EntityFilter::SingleEntity { entity: bound })
        );

        // named param absent: declared default applies
        assert_eq!(
            resolver.resolve(&filter, &StateParams::default()).filter(),
            Some(&EntityFilter::SingleEntity { entity: fallback })
        );
    }

    #[test]
    fn relations_query_requires_root() {
        let (_, auth) = tenant_admin();
        let resolver = FilterResolver::new(auth);
        let filter = EntityAliasFilter::RelationsQuery {
            root: QueryRoot {
                root_state_entity: true,
                ..Default::default()
            },
            direction: EntitySearchDirection::From,
            max_level: 1,
            fetch_last_level_only: false,
            filters: vec![],
        };
        assert_eq!(
            resolver.resolve(&filter, &StateParams::default()),
            Resolution::Unresolved
        );

        let root = EntityId::new(EntityType::Asset, Uuid::new_v4());
        let resolution = resolver.resolve(&filter, &StateParams::with_entity(root));
        match resolution {
            Resolution::Resolved(resolved) => {
                assert!(resolved.state_entity);
                assert_eq!(resolved.filter.kind(), AliasFilterKind::RelationsQuery);
            }
            Resolution::Unresolved => panic!("expected resolved"),
        }
    }

    #[test]
    fn tags_preserved_for_non_state_variants() {
        let (_, auth) = tenant_admin();
        let resolver = FilterResolver::new(auth);
        let device = Uuid::new_v4();
        let cases = vec![
            EntityAliasFilter::SingleEntity {
                entity: AliasEntityId::concrete(EntityType::Device, device),
            },
            EntityAliasFilter::EntityList {
                entity_type: EntityType::Device,
                entity_list: vec![device],
            },
            EntityAliasFilter::EntityName {
                entity_type: EntityType::Asset,
                entity_name_filter: "Building".to_string(),
            },
            EntityAliasFilter::EntityByType {
                entity_type: EntityType::Edge,
            },
            EntityAliasFilter::AssetType {
                asset_types: vec!["building".to_string()],
                asset_name_filter: String::new(),
            },
            EntityAliasFilter::DeviceType {
                device_types: vec![],
                device_name_filter: String::new(),
            },
            EntityAliasFilter::EdgeType {
                edge_types: vec![],
                edge_name_filter: String::new(),
            },
            EntityAliasFilter::EntityViewType {
                entity_view_types: vec![],
                entity_view_name_filter: String::new(),
            },
        ];
        for filter in cases {
            let resolution = resolver.resolve(&filter, &StateParams::default());
            let resolved_kind = resolution.filter().expect("resolved").kind();
            assert_eq!(resolved_kind, filter.kind());
        }
    }

    #[test]
    fn backend_query_builders_translate_resolved_filters() {
        let root = EntityId::new(EntityType::Asset, Uuid::new_v4());
        let relations = EntityFilter::RelationsQuery {
            root_entity: root,
            direction: EntitySearchDirection::From,
            max_level: 0,
            fetch_last_level_only: false,
            filters: vec![],
        };
        let query = relations_query_from_filter(&relations).unwrap();
        // unbounded traversal is encoded as -1
        assert_eq!(query.max_level, -1);
        assert!(search_query_from_filter(&relations).is_none());

        let search = EntityFilter::DeviceSearchQuery {
            root_entity: root,
            direction: EntitySearchDirection::From,
            max_level: 2,
            fetch_last_level_only: false,
            relation_type: Some("Contains".to_string()),
            device_types: vec!["sensor".to_string()],
        };
        let query = search_query_from_filter(&search).unwrap();
        assert_eq!(query.entity_type, EntityType::Device);
        assert_eq!(query.max_level, 2);
        assert_eq!(query.types, vec!["sensor".to_string()]);
        assert!(relations_query_from_filter(&search).is_none());
    }

    #[test]
    fn classification_is_pure_and_type_scoped() {
        let all = alias_filter_kinds_for_entity_types(&[]);
        assert_eq!(all.len(), AliasFilterKind::ALL.len());

        let device_only = alias_filter_kinds_for_entity_types(&[EntityType::Device]);
        assert!(device_only.contains(&AliasFilterKind::DeviceType));
        assert!(device_only.contains(&AliasFilterKind::DeviceSearchQuery));
        assert!(!device_only.contains(&AliasFilterKind::AssetType));
        assert!(device_only.contains(&AliasFilterKind::StateEntity));
    }

    #[test]
    fn alias_level_matching_inspects_fields() {
        let alias = EntityAlias {
            id: "a1".to_string(),
            alias: "devices".to_string(),
            filter: EntityAliasFilter::EntityList {
                entity_type: EntityType::Device,
                entity_list: vec![Uuid::new_v4()],
            },
            resolve_multiple: true,
        };
        assert!(alias_matches_entity_types(&alias, &[EntityType::Device]));
        assert!(!alias_matches_entity_types(&alias, &[EntityType::Asset]));

        let relations = EntityAlias {
            id: "a2".to_string(),
            alias: "related".to_string(),
            filter: EntityAliasFilter::RelationsQuery {
                root: QueryRoot::default(),
                direction: EntitySearchDirection::From,
                max_level: 1,
                fetch_last_level_only: false,
                filters: vec![dashstream_model::RelationEntityTypeFilter {
                    relation_type: "Contains".to_string(),
                    entity_types: vec![EntityType::Device],
                }],
            },
            resolve_multiple: true,
        };
        assert!(alias_matches_entity_types(&relations, &[EntityType::Device]));
        assert!(!alias_matches_entity_types(&relations, &[EntityType::Asset]));
    }
}
