//! Scope-bounded user management.
//!
//! Every handler takes [`UserManagementAccess`]; by the time a body runs,
//! the actor is authenticated and the scope computed. Handlers only have
//! to honor the scope on the specific target.

use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::users::{CreateUserRequest, UpdateUserRequest};
use crate::models::{Role, UserRecord};
use crate::services::access::{AccessError, AccessScope, UserManagementAccess};
use crate::services::directory::{CreateUserInput, UpdateUserInput};
use crate::AppState;

pub const LIST_HITS_HEADER: &str = "x-users-list-hits";
pub const LAST_LIST_AT_HEADER: &str = "x-users-last-list-at";
pub const LAST_MUTATION_AT_HEADER: &str = "x-users-last-mutation-at";
pub const TOTAL_COUNT_HEADER: &str = "x-users-total-count";
pub const VISIBLE_COUNT_HEADER: &str = "x-users-visible-count";

pub async fn list_users(
    State(state): State<AppState>,
    UserManagementAccess(ctx): UserManagementAccess,
) -> Result<Response, AppError> {
    state.metrics.record_list();

    let users = state.directory.list_users().await?;
    let visible = ctx.scope.filter_users(users);

    let snapshot = state.metrics.snapshot();
    let mut response = Json(&visible).into_response();
    let headers = response.headers_mut();

    insert_header(headers, LIST_HITS_HEADER, snapshot.list_hits.to_string());
    if let Some(at) = snapshot.last_list_at {
        insert_header(headers, LAST_LIST_AT_HEADER, at.to_rfc3339());
    }
    if let Some(at) = snapshot.last_mutation_at {
        insert_header(headers, LAST_MUTATION_AT_HEADER, at.to_rfc3339());
    }
    match &ctx.scope {
        AccessScope::Global => {
            let total = state.directory.count_users().await?;
            insert_header(headers, TOTAL_COUNT_HEADER, total.to_string());
        }
        AccessScope::Organization(_) => {
            insert_header(headers, VISIBLE_COUNT_HEADER, visible.len().to_string());
        }
    }

    Ok(response)
}

pub async fn create_user(
    State(state): State<AppState>,
    UserManagementAccess(ctx): UserManagementAccess,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Response, AppError> {
    payload.validate()?;

    if !ctx.scope.is_global() {
        if payload.role == Role::Admin {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Cannot assign the admin role"
            )));
        }
        if !ctx.scope.allows_organizations(&payload.organization_ids) {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Organization assignment outside your scope"
            )));
        }
    }

    let created = state
        .directory
        .create_user(CreateUserInput {
            name: payload.name,
            email: payload.email,
            role: payload.role,
            avatar_url: payload.avatar_url,
            organization_ids: payload.organization_ids,
        })
        .await?;

    record_mutation(&state).await?;
    tracing::info!(user_id = %created.id, actor_id = %ctx.actor.id, "User created");
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

pub async fn get_user(
    State(state): State<AppState>,
    UserManagementAccess(ctx): UserManagementAccess,
    Path(id): Path<String>,
) -> Result<Json<UserRecord>, AppError> {
    let user = load_visible_user(&state, &ctx.scope, &id).await?;
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    UserManagementAccess(ctx): UserManagementAccess,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserRecord>, AppError> {
    payload.validate()?;
    load_visible_user(&state, &ctx.scope, &id).await?;

    if !ctx.scope.is_global() {
        if payload.role == Some(Role::Admin) {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Cannot assign the admin role"
            )));
        }
        if let Some(organization_ids) = &payload.organization_ids {
            if !ctx.scope.allows_organizations(organization_ids) {
                return Err(AppError::Forbidden(anyhow::anyhow!(
                    "Organization assignment outside your scope"
                )));
            }
        }
    }

    let updated = state
        .directory
        .update_user(
            &id,
            UpdateUserInput {
                name: payload.name,
                email: payload.email,
                role: payload.role,
                avatar_url: payload.avatar_url,
                organization_ids: payload.organization_ids,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    record_mutation(&state).await?;
    tracing::info!(user_id = %id, actor_id = %ctx.actor.id, "User updated");
    Ok(Json(updated))
}

pub async fn delete_user(
    State(state): State<AppState>,
    UserManagementAccess(ctx): UserManagementAccess,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    load_visible_user(&state, &ctx.scope, &id).await?;

    if !state.directory.delete_user(&id).await? {
        return Err(AppError::NotFound(anyhow::anyhow!("User not found")));
    }

    record_mutation(&state).await?;
    tracing::info!(user_id = %id, actor_id = %ctx.actor.id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// 404 for unknown targets, 403 for targets outside the caller's scope.
async fn load_visible_user(
    state: &AppState,
    scope: &AccessScope,
    id: &str,
) -> Result<UserRecord, AppError> {
    let user = state
        .directory
        .get_user_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    if !scope.allows_user(&user) {
        return Err(AccessError::UserNotAccessible.into());
    }
    Ok(user)
}

async fn record_mutation(state: &AppState) -> Result<(), AppError> {
    let count = state.directory.count_users().await?;
    state.metrics.record_mutation(count);
    Ok(())
}

fn insert_header(headers: &mut axum::http::HeaderMap, name: &'static str, value: String) {
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(name, value);
    }
}
