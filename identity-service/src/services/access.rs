//! Scoped access control for user management.
//!
//! Every `/api/users*` request resolves to a [`UserManagementContext`]:
//! the authenticated actor plus the [`AccessScope`] their role grants.
//! Handlers never branch on roles directly; they ask the scope.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use service_core::error::AppError;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::models::{Role, UserRecord, USER_MANAGEMENT_SERVICE_ID};
use crate::services::session::AuthenticatedSession;
use crate::AppState;

/// Denials carry a stable, user-facing message; anything operational is
/// logged, never surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("User not found")]
    UserNotFound,
    #[error("User management service unavailable")]
    ServiceUnavailable,
    #[error("Organization assignment required")]
    OrganizationRequired,
    #[error("Insufficient permissions")]
    InsufficientPermissions,
    #[error("User not accessible")]
    UserNotAccessible,
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::NotAuthenticated | AccessError::UserNotFound => {
                AppError::Unauthorized(anyhow::anyhow!(err.to_string()))
            }
            AccessError::ServiceUnavailable => AppError::ServiceUnavailable(err.to_string()),
            AccessError::OrganizationRequired
            | AccessError::InsufficientPermissions
            | AccessError::UserNotAccessible => AppError::Forbidden(anyhow::anyhow!(err.to_string())),
        }
    }
}

/// What slice of the directory an actor may see and mutate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    /// Every user, every organization.
    Global,
    /// Only users belonging to at least one of these organizations.
    Organization(BTreeSet<String>),
}

impl AccessScope {
    pub fn is_global(&self) -> bool {
        matches!(self, AccessScope::Global)
    }

    /// May the actor see this user at all?
    pub fn allows_user(&self, user: &UserRecord) -> bool {
        match self {
            AccessScope::Global => true,
            AccessScope::Organization(org_ids) => user
                .organizations
                .iter()
                .any(|org| org_ids.contains(&org.id)),
        }
    }

    /// May the actor assign this exact membership set?
    pub fn allows_organizations(&self, organization_ids: &[String]) -> bool {
        match self {
            AccessScope::Global => true,
            AccessScope::Organization(org_ids) => {
                organization_ids.iter().all(|id| org_ids.contains(id))
            }
        }
    }

    pub fn filter_users(&self, users: Vec<UserRecord>) -> Vec<UserRecord> {
        match self {
            AccessScope::Global => users,
            AccessScope::Organization(_) => users
                .into_iter()
                .filter(|user| self.allows_user(user))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserManagementContext {
    pub actor: UserRecord,
    pub scope: AccessScope,
    pub session: AuthenticatedSession,
}

/// Resolve the request to an actor and scope, or deny.
pub async fn require_user_management_access(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<UserManagementContext, AppError> {
    let session = state
        .sessions
        .authenticated_session(headers)
        .await?
        .ok_or(AccessError::NotAuthenticated)?;

    let actor = state
        .directory
        .get_user_by_id(&session.record.user_id)
        .await?
        .ok_or(AccessError::UserNotFound)?;

    let service = state
        .directory
        .get_service_by_id(USER_MANAGEMENT_SERVICE_ID)
        .await?;
    if !service.as_ref().is_some_and(|service| service.is_active()) {
        return Err(AccessError::ServiceUnavailable.into());
    }

    let scope = match actor.role {
        Role::Admin => AccessScope::Global,
        Role::OrganizationAdmin => {
            let org_ids = actor.organization_ids();
            if org_ids.is_empty() {
                return Err(AccessError::OrganizationRequired.into());
            }
            AccessScope::Organization(org_ids.into_iter().collect())
        }
        Role::Member => return Err(AccessError::InsufficientPermissions.into()),
    };

    Ok(UserManagementContext {
        actor,
        scope,
        session,
    })
}

/// Extractor form of [`require_user_management_access`] for handlers.
pub struct UserManagementAccess(pub UserManagementContext);

#[axum::async_trait]
impl FromRequestParts<AppState> for UserManagementAccess {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let context = require_user_management_access(state, &parts.headers).await?;
        Ok(UserManagementAccess(context))
    }
}
