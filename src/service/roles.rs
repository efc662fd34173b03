use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;

use crate::model::{role::Role, user::User};
use crate::service::{
    error::ServiceError,
    ports::{RoleLookup, StoreError, UserDirectory},
};

/// How roles are resolved for an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleStrategy {
    /// Only the `user_roles` / `department_managers` tables count.
    Table,
    /// Accounts without any formal role get one guessed from their username or email.
    TableWithNameFallback,
}

impl FromStr for RoleStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "table" => Ok(RoleStrategy::Table),
            "table_with_name_fallback" => Ok(RoleStrategy::TableWithNameFallback),
            other => Err(format!("unknown role strategy '{}'", other)),
        }
    }
}

/// Legacy guess for accounts created before roles were formalised.
pub fn guess_role(user: &User) -> Role {
    let haystack = format!(
        "{} {}",
        user.username.to_lowercase(),
        user.email.as_deref().unwrap_or_default().to_lowercase()
    );

    if haystack.contains("superadmin") || haystack.contains("admin") {
        Role::Superadmin
    } else if haystack.contains("hrd") && haystack.contains("manager") {
        Role::HrdManager
    } else if haystack.contains("timekeeper") {
        Role::HrdTimekeeper
    } else if haystack.contains("manager") {
        Role::DepartmentManager
    } else {
        Role::Regular
    }
}

const FORMAL_ROLES: [Role; 4] = [
    Role::Superadmin,
    Role::HrdManager,
    Role::HrdTimekeeper,
    Role::DepartmentManager,
];

pub struct NameFallbackRoles<'a> {
    inner: &'a dyn RoleLookup,
    users: &'a dyn UserDirectory,
}

impl<'a> NameFallbackRoles<'a> {
    pub fn new(inner: &'a dyn RoleLookup, users: &'a dyn UserDirectory) -> Self {
        Self { inner, users }
    }

    async fn has_formal_role(&self, actor_id: u64) -> Result<bool, StoreError> {
        for role in FORMAL_ROLES {
            if self.inner.has_role(actor_id, role).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl RoleLookup for NameFallbackRoles<'_> {
    async fn has_role(&self, actor_id: u64, role: Role) -> Result<bool, StoreError> {
        if self.inner.has_role(actor_id, role).await? {
            return Ok(true);
        }
        if self.has_formal_role(actor_id).await? {
            return Ok(false);
        }
        Ok(self
            .users
            .find_user(actor_id)
            .await?
            .filter(|u| u.is_active)
            .is_some_and(|u| guess_role(&u) == role))
    }

    async fn managed_departments(&self, actor_id: u64) -> Result<BTreeSet<String>, StoreError> {
        self.inner.managed_departments(actor_id).await
    }
}

/// Fails with an authorization error unless the actor holds one of `roles`.
pub async fn require_any(
    lookup: &dyn RoleLookup,
    actor_id: u64,
    roles: &[Role],
) -> Result<(), ServiceError> {
    for role in roles {
        if lookup.has_role(actor_id, *role).await? {
            return Ok(());
        }
    }
    Err(ServiceError::Authorization(format!(
        "requires one of: {}",
        roles
            .iter()
            .map(|r| r.as_ref())
            .collect::<Vec<_>>()
            .join(", ")
    )))
}
