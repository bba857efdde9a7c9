//! Login, logout, and session introspection.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use service_core::error::AppError;

use crate::dtos::auth::{
    ContextResponse, LoginRequest, LoginResponse, LogoutResponse, OrganizationContext,
    OrganizationSummary, SelectionErrorResponse, SessionResponse,
};
use crate::models::{OrganizationRecord, Role, UserRecord};
use crate::services::directory::DEFAULT_ADMIN_EMAIL;
use crate::services::session::session_token;
use crate::AppState;

/// Establish a session for the default actor, selecting an organization
/// context. Malformed JSON is deliberately treated as an empty body.
pub async fn login(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let request: LoginRequest = serde_json::from_slice(&body).unwrap_or_default();

    state.directory.ensure_default_admin().await?;
    let user = state
        .directory
        .get_user_by_email(DEFAULT_ADMIN_EMAIL)
        .await?
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Default actor missing")))?;

    let organization = match select_organization(&user, request.organization_id.as_deref()) {
        Ok(organization) => organization,
        Err(response) => return Ok(response),
    };

    let organization_id = organization.as_ref().map(|org| org.id.clone());
    let (token, record) = state
        .sessions
        .create_session(&user.id, organization_id, None)
        .await?;

    tracing::info!(user_id = %user.id, organization_id = ?record.organization_id, "Session created");

    let cookie = state.sessions.session_cookie(&token, record.expires_at);
    let mut response = Json(LoginResponse {
        user,
        organization,
        expires_at: record.expires_at,
    })
    .into_response();
    append_set_cookie(&mut response, &cookie)?;
    Ok(response)
}

/// Pick the organization context for a new session, or produce the
/// selection-error response the client must resolve.
fn select_organization(
    user: &UserRecord,
    requested: Option<&str>,
) -> Result<Option<OrganizationRecord>, Response> {
    if let Some(requested) = requested {
        return match user.organizations.iter().find(|org| org.id == requested) {
            Some(org) => Ok(Some(org.clone())),
            None => Err((
                StatusCode::FORBIDDEN,
                Json(SelectionErrorResponse {
                    code: "organization_selection_invalid",
                    organizations: None,
                }),
            )
                .into_response()),
        };
    }

    match user.organizations.len() {
        0 => Ok(None),
        1 => Ok(Some(user.organizations[0].clone())),
        _ => Err((
            StatusCode::BAD_REQUEST,
            Json(SelectionErrorResponse {
                code: "organization_selection_required",
                organizations: Some(
                    user.organizations
                        .iter()
                        .map(OrganizationSummary::from)
                        .collect(),
                ),
            }),
        )
            .into_response()),
    }
}

/// Revoke the session named by the cookie, if any. Always succeeds and
/// always clears the cookie; a stale or absent cookie is not an error.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(token) = session_token(&headers) {
        state.sessions.delete_session(&token).await?;
    }

    let cookie = state.sessions.clear_cookie();
    let mut response = Json(LogoutResponse { success: true }).into_response();
    append_set_cookie(&mut response, &cookie)?;
    Ok(response)
}

pub async fn session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state
        .sessions
        .authenticated_session(&headers)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Not authenticated")))?;

    let user = state
        .directory
        .get_user_by_id(&session.record.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("User not found")))?;

    let organization = match &session.record.organization_id {
        Some(id) => state.directory.get_organization_by_id(id).await?,
        None => None,
    };

    Ok(Json(SessionResponse {
        user,
        organization,
        expires_at: session.record.expires_at,
        organization_id: session.record.organization_id.clone(),
    }))
}

/// The actor's full platform context: their organizations and the
/// services enabled for each.
pub async fn context(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ContextResponse>, AppError> {
    let session = state
        .sessions
        .authenticated_session(&headers)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Not authenticated")))?;

    let user = state
        .directory
        .get_user_by_id(&session.record.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("User not found")))?;

    let mut organizations = Vec::with_capacity(user.organizations.len());
    for organization in &user.organizations {
        let services = state
            .directory
            .list_services_for_organizations(std::slice::from_ref(&organization.id))
            .await?;
        organizations.push(OrganizationContext {
            organization: organization.clone(),
            services,
        });
    }

    let is_platform_admin = user.role == Role::Admin;
    Ok(Json(ContextResponse {
        user,
        is_platform_admin,
        organizations,
    }))
}

pub(crate) fn append_set_cookie(response: &mut Response, cookie: &str) -> Result<(), AppError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid cookie header: {}", e)))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(())
}
