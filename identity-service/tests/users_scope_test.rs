//! Scope enforcement and metrics headers on the `/api/users*` routes.

mod common;

use common::{body_json, header_str, TestApp};
use identity_service::models::Role;
use serde_json::json;

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let app = TestApp::spawn().await;
    let response = app.request("GET", "/api/users", None, None).await;
    assert_eq!(response.status(), 401);
    assert_eq!(body_json(response).await["error"], "Not authenticated");
}

#[tokio::test]
async fn members_have_no_management_rights() {
    let app = TestApp::spawn().await;
    let member = app.seed_user("Plain Member", Role::Member, &["org-tessaro"]).await;
    let cookie = app.session_cookie_for(&member.id, None).await;

    let response = app.request("GET", "/api/users", Some(&cookie), None).await;
    assert_eq!(response.status(), 403);
    assert_eq!(
        body_json(response).await["error"],
        "Insufficient permissions"
    );
}

#[tokio::test]
async fn org_admin_without_organizations_is_rejected() {
    let app = TestApp::spawn().await;
    let orphan = app
        .seed_user("Unassigned Admin", Role::OrganizationAdmin, &[])
        .await;
    let cookie = app.session_cookie_for(&orphan.id, None).await;

    let response = app.request("GET", "/api/users", Some(&cookie), None).await;
    assert_eq!(response.status(), 403);
    assert_eq!(
        body_json(response).await["error"],
        "Organization assignment required"
    );
}

#[tokio::test]
async fn disabled_service_makes_user_management_unavailable() {
    let app = TestApp::spawn().await;
    let admin = app.seed_user("Platform Admin", Role::Admin, &[]).await;
    let cookie = app.session_cookie_for(&admin.id, None).await;

    sqlx::query("UPDATE services SET status = 'disabled' WHERE id = 'svc-user-management'")
        .execute(&app.pool)
        .await
        .unwrap();

    let response = app.request("GET", "/api/users", Some(&cookie), None).await;
    assert_eq!(response.status(), 503);
    assert_eq!(
        body_json(response).await["error"],
        "User management service unavailable"
    );
}

#[tokio::test]
async fn org_admin_scope_does_not_depend_on_service_assignments() {
    let app = TestApp::spawn().await;
    // org-z has no row in service_organizations; only the seeded Tessaro
    // organization does. Scope is granted by role + membership alone.
    app.seed_organization("org-z", "Org Z").await;

    let scoped = app
        .seed_user("Unlinked Admin", Role::OrganizationAdmin, &["org-z"])
        .await;
    let colleague = app.seed_user("Z User", Role::Member, &["org-z"]).await;
    let cookie = app.session_cookie_for(&scoped.id, Some("org-z")).await;

    let response = app.request("GET", "/api/users", Some(&cookie), None).await;
    assert_eq!(response.status(), 200);
    assert_eq!(header_str(&response, "x-users-visible-count"), Some("2"));

    let ids: Vec<String> = body_json(response)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|user| user["id"].as_str().unwrap().to_string())
        .collect();
    assert!(ids.contains(&scoped.id));
    assert!(ids.contains(&colleague.id));
}

#[tokio::test]
async fn org_admin_only_sees_users_in_their_organizations() {
    let app = TestApp::spawn().await;
    app.seed_organization("org-a", "Org A").await;
    app.seed_organization("org-b", "Org B").await;

    let scoped = app
        .seed_user("Scoped Admin", Role::OrganizationAdmin, &["org-a"])
        .await;
    let inside = app.seed_user("Inside User", Role::Member, &["org-a"]).await;
    let outside = app.seed_user("Outside User", Role::Member, &["org-b"]).await;
    let cookie = app.session_cookie_for(&scoped.id, Some("org-a")).await;

    let response = app.request("GET", "/api/users", Some(&cookie), None).await;
    assert_eq!(response.status(), 200);
    assert_eq!(header_str(&response, "x-users-list-hits"), Some("1"));
    assert_eq!(header_str(&response, "x-users-visible-count"), Some("2"));
    assert!(header_str(&response, "x-users-total-count").is_none());

    let body = body_json(response).await;
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|user| user["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&scoped.id.as_str()));
    assert!(ids.contains(&inside.id.as_str()));
    assert!(!ids.contains(&outside.id.as_str()));
}

#[tokio::test]
async fn global_admin_sees_everyone() {
    let app = TestApp::spawn().await;
    app.seed_organization("org-a", "Org A").await;
    app.seed_organization("org-b", "Org B").await;

    let admin = app.seed_user("Platform Admin", Role::Admin, &[]).await;
    app.seed_user("A User", Role::Member, &["org-a"]).await;
    app.seed_user("B User", Role::Member, &["org-b"]).await;
    let cookie = app.session_cookie_for(&admin.id, None).await;

    let response = app.request("GET", "/api/users", Some(&cookie), None).await;
    assert_eq!(response.status(), 200);
    assert_eq!(header_str(&response, "x-users-total-count"), Some("3"));
    assert!(header_str(&response, "x-users-visible-count").is_none());
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn org_admin_cannot_touch_users_outside_their_scope() {
    let app = TestApp::spawn().await;
    app.seed_organization("org-a", "Org A").await;
    app.seed_organization("org-b", "Org B").await;

    let scoped = app
        .seed_user("Scoped Admin", Role::OrganizationAdmin, &["org-a"])
        .await;
    let outside = app.seed_user("Outside User", Role::Member, &["org-b"]).await;
    let cookie = app.session_cookie_for(&scoped.id, Some("org-a")).await;

    let uri = format!("/api/users/{}", outside.id);
    for (method, body) in [
        ("GET", None),
        ("PATCH", Some(json!({"name": "Hijacked"}))),
        ("DELETE", None),
    ] {
        let response = app.request(method, &uri, Some(&cookie), body).await;
        assert_eq!(response.status(), 403, "{} should be forbidden", method);
        assert_eq!(body_json(response).await["error"], "User not accessible");
    }

    // Untouched.
    let still_there = app
        .state
        .directory
        .get_user_by_id(&outside.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(still_there.name, "Outside User");
}

#[tokio::test]
async fn org_admin_cannot_elevate_or_assign_outside_scope() {
    let app = TestApp::spawn().await;
    app.seed_organization("org-a", "Org A").await;
    app.seed_organization("org-b", "Org B").await;

    let scoped = app
        .seed_user("Scoped Admin", Role::OrganizationAdmin, &["org-a"])
        .await;
    let target = app.seed_user("Inside User", Role::Member, &["org-a"]).await;
    let cookie = app.session_cookie_for(&scoped.id, Some("org-a")).await;

    let elevate = app
        .request(
            "POST",
            "/api/users",
            Some(&cookie),
            Some(json!({
                "name": "Sneaky",
                "email": "sneaky@example.com",
                "role": "admin",
                "organization_ids": ["org-a"]
            })),
        )
        .await;
    assert_eq!(elevate.status(), 403);

    let foreign_org = app
        .request(
            "PATCH",
            &format!("/api/users/{}", target.id),
            Some(&cookie),
            Some(json!({"organization_ids": ["org-a", "org-b"]})),
        )
        .await;
    assert_eq!(foreign_org.status(), 403);

    let elevate_patch = app
        .request(
            "PATCH",
            &format!("/api/users/{}", target.id),
            Some(&cookie),
            Some(json!({"role": "admin"})),
        )
        .await;
    assert_eq!(elevate_patch.status(), 403);
}

#[tokio::test]
async fn global_admin_full_user_lifecycle() {
    let app = TestApp::spawn().await;
    app.seed_organization("org-a", "Org A").await;
    let admin = app.seed_user("Platform Admin", Role::Admin, &[]).await;
    let cookie = app.session_cookie_for(&admin.id, None).await;

    let created = app
        .request(
            "POST",
            "/api/users",
            Some(&cookie),
            Some(json!({
                "name": "New Person",
                "email": "new.person@example.com",
                "role": "member",
                "organization_ids": ["org-a", "org-a"]
            })),
        )
        .await;
    assert_eq!(created.status(), 201);
    let created = body_json(created).await;
    let id = created["id"].as_str().unwrap().to_string();
    // Duplicate ids in the request collapse to one membership.
    assert_eq!(created["organizations"].as_array().unwrap().len(), 1);

    let fetched = app
        .request("GET", &format!("/api/users/{}", id), Some(&cookie), None)
        .await;
    assert_eq!(fetched.status(), 200);

    let updated = app
        .request(
            "PATCH",
            &format!("/api/users/{}", id),
            Some(&cookie),
            Some(json!({"name": "Renamed Person"})),
        )
        .await;
    assert_eq!(updated.status(), 200);
    assert_eq!(body_json(updated).await["name"], "Renamed Person");

    let deleted = app
        .request("DELETE", &format!("/api/users/{}", id), Some(&cookie), None)
        .await;
    assert_eq!(deleted.status(), 204);

    let gone = app
        .request("GET", &format!("/api/users/{}", id), Some(&cookie), None)
        .await;
    assert_eq!(gone.status(), 404);
}

#[tokio::test]
async fn create_validation_and_conflicts() {
    let app = TestApp::spawn().await;
    let admin = app.seed_user("Platform Admin", Role::Admin, &[]).await;
    let cookie = app.session_cookie_for(&admin.id, None).await;

    let bad_email = app
        .request(
            "POST",
            "/api/users",
            Some(&cookie),
            Some(json!({"name": "X", "email": "nope", "role": "member"})),
        )
        .await;
    assert_eq!(bad_email.status(), 422);

    let unknown_org = app
        .request(
            "POST",
            "/api/users",
            Some(&cookie),
            Some(json!({
                "name": "X",
                "email": "x@example.com",
                "role": "member",
                "organization_ids": ["org-missing"]
            })),
        )
        .await;
    assert_eq!(unknown_org.status(), 400);

    let first = app
        .request(
            "POST",
            "/api/users",
            Some(&cookie),
            Some(json!({"name": "Taken", "email": "taken@example.com", "role": "member"})),
        )
        .await;
    assert_eq!(first.status(), 201);

    let duplicate = app
        .request(
            "POST",
            "/api/users",
            Some(&cookie),
            Some(json!({"name": "Taken Again", "email": "taken@example.com", "role": "member"})),
        )
        .await;
    assert_eq!(duplicate.status(), 409);
}

#[tokio::test]
async fn mutations_surface_in_list_headers() {
    let app = TestApp::spawn().await;
    let admin = app.seed_user("Platform Admin", Role::Admin, &[]).await;
    let cookie = app.session_cookie_for(&admin.id, None).await;

    let before = app.request("GET", "/api/users", Some(&cookie), None).await;
    assert!(header_str(&before, "x-users-last-mutation-at").is_none());

    let created = app
        .request(
            "POST",
            "/api/users",
            Some(&cookie),
            Some(json!({"name": "Counted", "email": "counted@example.com", "role": "member"})),
        )
        .await;
    assert_eq!(created.status(), 201);

    let after = app.request("GET", "/api/users", Some(&cookie), None).await;
    assert_eq!(header_str(&after, "x-users-list-hits"), Some("2"));
    assert!(header_str(&after, "x-users-last-mutation-at").is_some());
    assert!(header_str(&after, "x-users-last-list-at").is_some());
    assert_eq!(header_str(&after, "x-users-total-count"), Some("2"));
}
