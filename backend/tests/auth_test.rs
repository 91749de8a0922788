mod common;

use workforce_backend::auth::create_token;

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = common::setup_test_app().await;
    let resp = common::http_client()
        .get(app.url("/attendance/today"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let app = common::setup_test_app().await;
    let token = common::create_expired_token(&app.employee);
    let resp = common::http_client()
        .get(app.url("/attendance/today"))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401, "Expired token should be rejected");
}

#[tokio::test]
async fn token_signed_with_other_secret_is_rejected() {
    let app = common::setup_test_app().await;
    let token = create_token(
        app.employee.id,
        app.company,
        app.employee.role,
        "another-secret-that-is-also-32-chars-long",
        1,
    )
    .unwrap();
    let resp = common::http_client()
        .get(app.url("/leave"))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn deactivated_employee_is_locked_out() {
    let app = common::setup_test_app().await;
    let token = app.token(&app.employee);

    let mut gone = app.employee.clone();
    gone.is_active = false;
    app.store.add_employee(gone).await;

    let resp = common::http_client()
        .get(app.url("/attendance/today"))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401, "Inactive employees cannot use old tokens");
}

#[tokio::test]
async fn role_comes_from_directory_not_token() {
    let app = common::setup_test_app().await;
    // Employee mints a token claiming admin.
    let forged = create_token(
        app.employee.id,
        app.company,
        workforce_backend::auth::Role::Admin,
        common::JWT_SECRET,
        1,
    )
    .unwrap();

    let resp = common::http_client()
        .post(app.url("/admin/leave/accrue"))
        .header("Authorization", format!("Bearer {}", forged))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}
