//! Access scoping: which stores may a request see?
//!
//! Pure function of (principal, optional explicit store). No state.
//!
//!   SuperAdmin + explicit store        → { explicit }
//!   SuperAdmin, no explicit store      → {} = unrestricted
//!   Admin/User + assigned explicit     → { explicit }
//!   Admin/User + foreign or no explicit → assigned stores
//!
//! RULE: an empty store set means "everything" ONLY for SuperAdmin.
//! For Admin/User it means "nothing". `StoreScope` carries the role
//! so the two can never be confused downstream.

use crate::{
    error::{InsightError, InsightResult},
    types::StoreId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn is_super_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one place role strings are normalized. Case, `_`, `-` and
/// spaces are ignored: "SUPER_ADMIN", "super-admin" and "SuperAdmin"
/// are the same role.
impl FromStr for Role {
    type Err = InsightError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized: String = raw
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "superadmin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(InsightError::InvalidRole { raw: raw.to_string() }),
        }
    }
}

/// An authenticated actor, already resolved by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPrincipal {
    pub role: Role,
    pub assigned_stores: BTreeSet<StoreId>,
}

impl AccessPrincipal {
    pub fn new<I, S>(role: Role, stores: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StoreId>,
    {
        let assigned_stores = stores
            .into_iter()
            .map(Into::into)
            .map(|s: StoreId| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self { role, assigned_stores }
    }

    /// Build from the raw strings the auth layer hands over.
    pub fn from_raw<I, S>(role: &str, stores: I) -> InsightResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<StoreId>,
    {
        Ok(Self::new(role.parse()?, stores))
    }

    pub fn super_admin() -> Self {
        Self::new(Role::SuperAdmin, Vec::<StoreId>::new())
    }
}

/// The resolved set of stores a request may see, paired with the role
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreScope {
    pub role: Role,
    pub stores: BTreeSet<StoreId>,
}

impl StoreScope {
    /// SuperAdmin with no store filter.
    pub fn is_unrestricted(&self) -> bool {
        self.role.is_super_admin() && self.stores.is_empty()
    }

    /// Non-super role that ended up with no stores at all.
    pub fn sees_nothing(&self) -> bool {
        !self.role.is_super_admin() && self.stores.is_empty()
    }

    pub fn allows(&self, store_id: &str) -> bool {
        self.is_unrestricted() || self.stores.contains(store_id)
    }
}

pub struct AccessScopeResolver;

impl AccessScopeResolver {
    /// Every input combination yields a scope; nothing here errors.
    /// An explicit store outside a non-super principal's assignment is
    /// ignored and the assigned set is returned instead.
    pub fn resolve(principal: &AccessPrincipal, explicit_store: Option<&str>) -> StoreScope {
        let explicit = explicit_store.map(str::trim).filter(|s| !s.is_empty());
        let single = |store: &str| StoreScope {
            role: principal.role,
            stores: BTreeSet::from([store.to_string()]),
        };

        match (principal.role, explicit) {
            (Role::SuperAdmin, Some(store)) => single(store),
            (Role::SuperAdmin, None) => StoreScope {
                role: Role::SuperAdmin,
                stores: BTreeSet::new(),
            },
            (role, Some(store)) if principal.assigned_stores.contains(store) => {
                log::debug!("{role} scoped to requested store {store}");
                single(store)
            }
            (role, explicit) => {
                if let Some(store) = explicit {
                    log::warn!("{role} requested unassigned store {store}; using assigned stores");
                }
                if principal.assigned_stores.is_empty() {
                    log::warn!("{role} has no assigned stores; scope is empty");
                }
                StoreScope {
                    role,
                    stores: principal.assigned_stores.clone(),
                }
            }
        }
    }
}
