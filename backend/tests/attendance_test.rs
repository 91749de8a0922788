mod common;

use serde_json::json;
use time::macros::datetime;

#[tokio::test]
async fn punch_in_and_out_over_http() {
    let app = common::setup_test_app().await;
    let client = common::http_client();
    let token = app.token(&app.employee);

    app.clock.set(datetime!(2026-03-02 09:25 UTC));
    let resp = client
        .post(app.url("/attendance/punch-in"))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({ "source": "web" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["date"], "2026-03-02");
    assert_eq!(body["is_late"], true);
    assert_eq!(body["late_by_minutes"], 25);
    assert_eq!(body["status"], "present");

    let again = client
        .post(app.url("/attendance/punch-in"))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({ "source": "web" }))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 409);
    let err: serde_json::Value = again.json().await.unwrap();
    assert_eq!(err["code"], "ALREADY_PUNCHED_IN");

    app.clock.set(datetime!(2026-03-02 18:10 UTC));
    let out = client
        .post(app.url("/attendance/punch-out"))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(out.status(), 200);
    let body: serde_json::Value = out.json().await.unwrap();
    assert_eq!(body["is_early_exit"], false);
    assert_eq!(body["total_hours"], 8.75);

    let today: serde_json::Value = client
        .get(app.url("/attendance/today"))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(today["has_punched_in"], true);
    assert_eq!(today["has_punched_out"], true);

    // The manager heard about the late arrival.
    let sent = app.notifications.sent().await;
    assert!(sent.iter().any(|n| n.recipient_id == app.manager.id));
}

#[tokio::test]
async fn punch_out_before_punch_in_conflicts() {
    let app = common::setup_test_app().await;
    let resp = common::http_client()
        .post(app.url("/attendance/punch-out"))
        .header("Authorization", format!("Bearer {}", app.token(&app.employee)))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let err: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(err["code"], "NOT_PUNCHED_IN");
}

#[tokio::test]
async fn face_punch_failures_map_to_statuses() {
    let app = common::setup_test_app().await;
    let client = common::http_client();
    let token = app.token(&app.employee);
    let face_punch = json!({ "source": "face", "face_image": "data:image/jpeg;base64,AAAA" });

    let unregistered = client
        .post(app.url("/attendance/punch-in"))
        .header("Authorization", format!("Bearer {}", token))
        .json(&face_punch)
        .send()
        .await
        .unwrap();
    assert_eq!(unregistered.status(), 400);

    let enrol = client
        .post(app.url("/attendance/face"))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({ "face_image": "data:image/jpeg;base64,BBBB" }))
        .send()
        .await
        .unwrap();
    assert_eq!(enrol.status(), 200);

    app.face.set_confidence(40);
    let mismatch = client
        .post(app.url("/attendance/punch-in"))
        .header("Authorization", format!("Bearer {}", token))
        .json(&face_punch)
        .send()
        .await
        .unwrap();
    assert_eq!(mismatch.status(), 401);
    let err: serde_json::Value = mismatch.json().await.unwrap();
    assert_eq!(err["code"], "FACE_MISMATCH");

    app.face.set_confidence(95);
    let ok = client
        .post(app.url("/attendance/punch-in"))
        .header("Authorization", format!("Bearer {}", token))
        .json(&face_punch)
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);
}

#[tokio::test]
async fn concurrent_punch_ins_create_one_record() {
    let app = common::setup_test_app().await;
    let client = common::http_client();
    let token = app.token(&app.employee);

    let attempts = (0..4).map(|_| {
        client
            .post(app.url("/attendance/punch-in"))
            .header("Authorization", format!("Bearer {}", token))
            .json(&json!({ "source": "web" }))
            .send()
    });
    let statuses: Vec<u16> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap().status().as_u16())
        .collect();

    assert_eq!(statuses.iter().filter(|s| **s == 200).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == 409).count(), 3);
}

#[tokio::test]
async fn manual_entry_is_hr_only() {
    let app = common::setup_test_app().await;
    let client = common::http_client();
    let entry = json!({
        "employee_id": app.employee.id,
        "date": "2026-02-27",
        "punch_in_time": "09:00",
        "punch_out_time": "17:30",
        "reason": "badge reader offline",
    });

    let denied = client
        .post(app.url("/attendance/manual"))
        .header("Authorization", format!("Bearer {}", app.token(&app.employee)))
        .json(&entry)
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);

    let created = client
        .post(app.url("/attendance/manual"))
        .header("Authorization", format!("Bearer {}", app.token(&app.hr)))
        .json(&entry)
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let record: serde_json::Value = created.json().await.unwrap();
    assert_eq!(record["is_manual_entry"], true);
    assert_eq!(record["total_hours"], 8.5);

    let duplicate = client
        .post(app.url("/attendance/manual"))
        .header("Authorization", format!("Bearer {}", app.token(&app.hr)))
        .json(&entry)
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), 409);

    // Only admins delete, and only inside their company.
    let id = record["id"].as_str().unwrap();
    let by_hr = client
        .delete(app.url(&format!("/attendance/{}", id)))
        .header("Authorization", format!("Bearer {}", app.token(&app.hr)))
        .send()
        .await
        .unwrap();
    assert_eq!(by_hr.status(), 403);

    let by_outsider = client
        .delete(app.url(&format!("/attendance/{}", id)))
        .header("Authorization", format!("Bearer {}", app.token(&app.outsider)))
        .send()
        .await
        .unwrap();
    assert_eq!(by_outsider.status(), 404);

    let by_admin = client
        .delete(app.url(&format!("/attendance/{}", id)))
        .header("Authorization", format!("Bearer {}", app.token(&app.admin)))
        .send()
        .await
        .unwrap();
    assert_eq!(by_admin.status(), 204);
}

#[tokio::test]
async fn team_view_requires_a_manager() {
    let app = common::setup_test_app().await;
    let client = common::http_client();

    let denied = client
        .get(app.url("/attendance/team"))
        .header("Authorization", format!("Bearer {}", app.token(&app.employee)))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);

    let team: serde_json::Value = client
        .get(app.url("/attendance/team?date=2026-03-02"))
        .header("Authorization", format!("Bearer {}", app.token(&app.manager)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(team["total"], 1);
    assert_eq!(team["absent"].as_array().unwrap().len(), 1);
}
