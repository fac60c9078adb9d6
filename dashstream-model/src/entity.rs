use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Concrete entity kinds known to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Device,
    Asset,
    EntityView,
    Edge,
    Tenant,
    Customer,
    User,
    Dashboard,
    Alarm,
}

impl EntityType {
    pub const ALL: [EntityType; 9] = [
        EntityType::Device,
        EntityType::Asset,
        EntityType::EntityView,
        EntityType::Edge,
        EntityType::Tenant,
        EntityType::Customer,
        EntityType::User,
        EntityType::Dashboard,
        EntityType::Alarm,
    ];
}

/// Pseudo entity kinds that only exist inside alias declarations and are
/// substituted with a concrete id from the authenticated session at
/// resolution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AliasEntityType {
    CurrentCustomer,
    CurrentTenant,
    CurrentUser,
    CurrentUserOwner,
}

/// Either a concrete entity type or a session-bound pseudo type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityTypeSpec {
    Concrete(EntityType),
    Pseudo(AliasEntityType),
}

impl From<EntityType> for EntityTypeSpec {
    fn from(entity_type: EntityType) -> Self {
        EntityTypeSpec::Concrete(entity_type)
    }
}

impl From<AliasEntityType> for EntityTypeSpec {
    fn from(alias_type: AliasEntityType) -> Self {
        EntityTypeSpec::Pseudo(alias_type)
    }
}

/// Fully concrete entity reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId {
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
    pub id: Uuid,
}

impl EntityId {
    pub fn new(entity_type: EntityType, id: Uuid) -> Self {
        Self { entity_type, id }
    }
}

/// Entity reference as written in an alias declaration. The type may be a
/// pseudo type and the id may be absent (pseudo entities do not need one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntityId {
    #[serde(rename = "entityType")]
    pub entity_type: EntityTypeSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

impl AliasEntityId {
    pub fn concrete(entity_type: EntityType, id: Uuid) -> Self {
        Self {
            entity_type: EntityTypeSpec::Concrete(entity_type),
            id: Some(id),
        }
    }

    pub fn pseudo(alias_type: AliasEntityType) -> Self {
        Self {
            entity_type: EntityTypeSpec::Pseudo(alias_type),
            id: None,
        }
    }
}

impl From<EntityId> for AliasEntityId {
    fn from(id: EntityId) -> Self {
        AliasEntityId::concrete(id.entity_type, id.id)
    }
}

/// Resolved entity record as returned by the entity lookup collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub label: String,
}

impl EntityInfo {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            label: String::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Authority of the authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Authority {
    SysAdmin,
    TenantAdmin,
    CustomerUser,
}

/// Snapshot of the authenticated user used for pseudo entity substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<Uuid>,
    pub authority: Authority,
}
