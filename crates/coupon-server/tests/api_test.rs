// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP API tests driving the router with `oneshot`.

mod common;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{ADMIN_TOKEN, StubNotifier, TestApp, USER_TOKEN};
use coupon_core::CouponStatus;

fn code_of(body: &serde_json::Value) -> u64 {
    body["code"].as_u64().expect("envelope has a numeric code")
}

// ==================
// Auth
// ==================

#[tokio::test]
async fn test_create_requires_admin() {
    let app = TestApp::new().await;
    let body = Some(json!({"amount": 10, "expire_on": 3}));

    let (status, resp) = app
        .call(Method::POST, "/charge/v1/coupons", None, body.clone())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code_of(&resp), 1305);

    let (status, resp) = app
        .call(
            Method::POST,
            "/charge/v1/coupons",
            Some("Bearer unknown"),
            body.clone(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code_of(&resp), 1305);

    let (status, resp) = app
        .call(Method::POST, "/charge/v1/coupons", Some(USER_TOKEN), body)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code_of(&resp), 1306);
    assert_eq!(resp["msg"], "permission denied");
}

#[tokio::test]
async fn test_list_requires_admin() {
    let app = TestApp::new().await;

    let (status, resp) = app
        .call(Method::GET, "/charge/v1/coupons", Some(USER_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code_of(&resp), 1306);
}

// ==================
// Create
// ==================

#[tokio::test]
async fn test_create_returns_display_form() {
    let app = TestApp::new().await;

    let data = app.create(50.0, 1).await;
    let serial = data["serial"].as_str().unwrap();
    let code = data["code"].as_str().unwrap();
    assert!(serial.starts_with("DF") && serial.ends_with('R'));
    assert_eq!(serial.len(), 18);
    assert_eq!(code.len(), 16);
    assert_eq!(code, code.to_uppercase());
    assert_eq!(data["amount"], json!(50.0));
    assert!(data["expire_on"].as_str().unwrap().len() == 10);
}

#[tokio::test]
async fn test_create_rejects_bad_bodies() {
    let app = TestApp::new().await;

    let (status, resp) = app
        .call_raw(
            Method::POST,
            "/charge/v1/coupons",
            Some(ADMIN_TOKEN),
            "{not json",
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code_of(&resp), 1302);

    let (status, resp) = app
        .call(
            Method::POST,
            "/charge/v1/coupons",
            Some(ADMIN_TOKEN),
            Some(json!({"expire_on": 3})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code_of(&resp), 1307);

    let (status, resp) = app
        .call(
            Method::POST,
            "/charge/v1/coupons",
            Some(ADMIN_TOKEN),
            Some(json!({"amount": 0, "expire_on": 3})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code_of(&resp), 1307);

    let (status, resp) = app
        .call(
            Method::POST,
            "/charge/v1/coupons",
            Some(ADMIN_TOKEN),
            Some(json!({"amount": 5, "expire_on": -1})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code_of(&resp), 1307);
}

#[tokio::test]
async fn test_create_rejects_out_of_range_values() {
    let app = TestApp::new().await;

    for body in [
        json!({"amount": 1.239, "expire_on": 3}),
        json!({"amount": 5, "expire_on": 1_000_000_000_000_000i64}),
        json!({"amount": 5, "expire_on": i64::MAX}),
    ] {
        let (status, resp) = app
            .call(
                Method::POST,
                "/charge/v1/coupons",
                Some(ADMIN_TOKEN),
                Some(body.clone()),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(code_of(&resp), 1307, "{body}");
    }

    let (status, resp) = app
        .call(Method::GET, "/charge/v1/coupons", Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["data"]["total"], 0);
}

// ==================
// Retrieve
// ==================

#[tokio::test]
async fn test_retrieve_marks_queried() {
    let app = TestApp::new().await;
    let data = app.create(20.0, 5).await;
    let code = data["code"].as_str().unwrap().to_lowercase();

    let (status, resp) = app
        .call(
            Method::GET,
            &format!("/charge/v1/coupons/{}", code),
            Some(USER_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(code_of(&resp), 0);
    assert_eq!(resp["data"]["status"], "available");
    assert_eq!(resp["data"]["serial"], data["serial"]);

    let (status, resp) = app
        .call(
            Method::GET,
            &format!("/charge/v1/coupons/{}", code),
            Some(USER_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["data"]["status"], "queried");
}

#[tokio::test]
async fn test_retrieve_unknown_code() {
    let app = TestApp::new().await;

    let (status, resp) = app
        .call(
            Method::GET,
            "/charge/v1/coupons/AAAA-BBBB-CCCC-DDDD",
            Some(USER_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(code_of(&resp), 1315);
}

// ==================
// Redeem
// ==================

#[tokio::test]
async fn test_redeem_credits_and_refuses_reuse() {
    let app = TestApp::new().await;
    let data = app.create(50.0, 1).await;
    let serial = data["serial"].as_str().unwrap();
    let code = data["code"].as_str().unwrap();

    let (status, resp) = app
        .call(
            Method::PUT,
            &format!("/charge/v1/coupons/use/{}?region=cn-north", serial),
            Some(USER_TOKEN),
            Some(json!({"code": code, "namespace": "alice-ns"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{resp}");
    assert_eq!(resp["data"]["amount"], json!(50.0));
    assert_eq!(resp["data"]["namespace"], "alice-ns");

    {
        let requests = app.notifier.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].username, "alice");
        assert_eq!(requests[0].namespace, "alice-ns");
        assert_eq!(requests[0].region.as_deref(), Some("cn-north"));
    }
    assert!(
        app.identity
            .regions
            .lock()
            .unwrap()
            .contains(&Some("cn-north".to_string()))
    );

    let record = app.engine.get(serial).await.unwrap().unwrap();
    assert_eq!(record.status, CouponStatus::Used);
    assert_eq!(record.username.as_deref(), Some("alice"));

    let (status, resp) = app
        .call(
            Method::PUT,
            &format!("/charge/v1/coupons/use/{}", serial),
            Some(USER_TOKEN),
            Some(json!({"code": code, "namespace": "alice-ns"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code_of(&resp), 1316);

    let (status, resp) = app
        .call(
            Method::GET,
            &format!("/charge/v1/coupons/{}", code),
            Some(USER_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code_of(&resp), 1316);
    assert_eq!(app.notifier.calls(), 1);
}

#[tokio::test]
async fn test_redeem_expired_coupon() {
    let app = TestApp::new().await;
    // Expires at the start of today in the storage offset.
    let data = app.create(10.0, 0).await;
    let serial = data["serial"].as_str().unwrap();
    let code = data["code"].as_str().unwrap();

    let (status, resp) = app
        .call(
            Method::PUT,
            &format!("/charge/v1/coupons/use/{}", serial),
            Some(USER_TOKEN),
            Some(json!({"code": code, "namespace": "ns"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code_of(&resp), 1317);
    assert_eq!(app.notifier.calls(), 0);

    let (status, resp) = app
        .call(
            Method::GET,
            &format!("/charge/v1/coupons/{}", code),
            Some(USER_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code_of(&resp), 1317);
}

#[tokio::test]
async fn test_redeem_wrong_code() {
    let app = TestApp::new().await;
    let data = app.create(10.0, 2).await;

    let (status, resp) = app
        .call(
            Method::PUT,
            &format!("/charge/v1/coupons/use/{}", data["serial"].as_str().unwrap()),
            Some(USER_TOKEN),
            Some(json!({"code": "zzzzzzzzzzzzzzzz", "namespace": "ns"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(code_of(&resp), 1315);
}

#[tokio::test]
async fn test_recharge_failure_leaves_coupon_available() {
    let app = TestApp::builder()
        .notifier(StubNotifier {
            fail: true,
            ..StubNotifier::default()
        })
        .build()
        .await;
    let data = app.create(30.0, 2).await;
    let serial = data["serial"].as_str().unwrap();

    let (status, resp) = app
        .call(
            Method::PUT,
            &format!("/charge/v1/coupons/use/{}", serial),
            Some(USER_TOKEN),
            Some(json!({"code": data["code"], "namespace": "ns"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(code_of(&resp), 1313);

    let record = app.engine.get(serial).await.unwrap().unwrap();
    assert_eq!(record.status, CouponStatus::Available);
    assert!(record.username.is_none());
}

#[tokio::test]
async fn test_redeem_missing_fields_is_parse_error() {
    let app = TestApp::new().await;
    let data = app.create(30.0, 2).await;

    let (status, resp) = app
        .call(
            Method::PUT,
            &format!("/charge/v1/coupons/use/{}", data["serial"].as_str().unwrap()),
            Some(USER_TOKEN),
            Some(json!({"namespace": "ns"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code_of(&resp), 1302);
}

// ==================
// Delete
// ==================

#[tokio::test]
async fn test_delete_semantics() {
    let app = TestApp::new().await;
    let data = app.create(10.0, 2).await;
    let serial = data["serial"].as_str().unwrap();
    let uri = format!("/charge/v1/coupons/{}", serial);

    let (status, resp) = app.call(Method::DELETE, &uri, Some(ADMIN_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(code_of(&resp), 0);
    assert!(resp.get("data").is_none());

    // Already withdrawn is not an error.
    let (status, _) = app.call(Method::DELETE, &uri, Some(ADMIN_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, resp) = app
        .call(
            Method::GET,
            &format!("/charge/v1/coupons/{}", data["code"].as_str().unwrap()),
            Some(USER_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code_of(&resp), 1318);

    let (status, resp) = app
        .call(
            Method::DELETE,
            "/charge/v1/coupons/df000000000000000r",
            Some(ADMIN_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(code_of(&resp), 1315);
}

#[tokio::test]
async fn test_delete_used_coupon_conflicts() {
    let app = TestApp::new().await;
    let data = app.create(10.0, 2).await;
    let serial = data["serial"].as_str().unwrap();

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/charge/v1/coupons/use/{}", serial),
            Some(USER_TOKEN),
            Some(json!({"code": data["code"], "namespace": "ns"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, resp) = app
        .call(
            Method::DELETE,
            &format!("/charge/v1/coupons/{}", serial),
            Some(ADMIN_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(code_of(&resp), 1322);
}

// ==================
// List
// ==================

#[tokio::test]
async fn test_list_pages() {
    let app = TestApp::new().await;
    for days in 1..=3 {
        app.create(10.0, days).await;
    }

    let (status, resp) = app
        .call(
            Method::GET,
            "/charge/v1/coupons?page=1&size=2",
            Some(ADMIN_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["data"]["total"], 3);
    let results = resp["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    // Latest expiry first.
    assert!(results[0]["expire_on"].as_str().unwrap() > results[1]["expire_on"].as_str().unwrap());

    let (status, resp) = app
        .call(
            Method::GET,
            "/charge/v1/coupons?kind=nothing",
            Some(ADMIN_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["data"]["total"], 0);
}

// ==================
// Provide
// ==================

#[tokio::test]
async fn test_provide_to_recipient_once() {
    let app = TestApp::new().await;
    app.create(10.0, 2).await;
    app.create(10.0, 2).await;

    let (status, resp) = app
        .call(
            Method::POST,
            "/charge/v1/coupons/provide?number=1&amount=10",
            None,
            Some(json!({"openId": "wx-123", "provideTime": 1700000000})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{resp}");
    assert_eq!(resp["data"]["isProvide"], false);
    let code = resp["data"]["code"].as_str().unwrap();
    assert_eq!(code.len(), 19);
    assert_eq!(code.matches('-').count(), 3);
    assert_eq!(code, code.to_uppercase());

    let (status, resp) = app
        .call(
            Method::POST,
            "/charge/v1/coupons/provide?number=1",
            None,
            Some(json!({"openId": "wx-123"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["data"]["isProvide"], true);
    assert_eq!(resp["data"]["code"], "");

    // The provided coupon can be looked up with its grouped code.
    let (status, resp) = app
        .call(
            Method::GET,
            &format!("/charge/v1/coupons/{}", code),
            Some(USER_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["data"]["status"], "provided");
}

#[tokio::test]
async fn test_provide_without_body_and_exhaustion() {
    let app = TestApp::new().await;
    app.create(10.0, 2).await;

    let (status, resp) = app
        .call(Method::POST, "/charge/v1/coupons/provide?number=2", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code_of(&resp), 1320);

    let (status, resp) = app
        .call(Method::POST, "/charge/v1/coupons/provide", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["data"]["codes"].as_array().unwrap().len(), 1);

    let (status, resp) = app
        .call(Method::POST, "/charge/v1/coupons/provide", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code_of(&resp), 1320);
}

#[tokio::test]
async fn test_provide_rejects_bad_parameters() {
    let app = TestApp::new().await;

    for uri in [
        "/charge/v1/coupons/provide?number=abc",
        "/charge/v1/coupons/provide?number=0",
        "/charge/v1/coupons/provide?amount=ten",
    ] {
        let (status, resp) = app.call(Method::POST, uri, None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(code_of(&resp), 1307, "{uri}");
    }
}

// ==================
// Server
// ==================

#[tokio::test]
async fn test_unknown_route() {
    let app = TestApp::new().await;

    let (status, resp) = app.call(Method::GET, "/charge/v2/plans", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(code_of(&resp), 1303);
    assert_eq!(resp["msg"], "unsupported url");
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;

    let (status, resp) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["data"]["phase"], "serving");
    assert_eq!(resp["data"]["database"], "ok");
}

#[tokio::test]
async fn test_closed_gate_answers_unavailable() {
    let app = TestApp::builder().not_serving().build().await;

    let (status, resp) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp["data"]["phase"], "unknown");

    let (status, resp) = app
        .call(
            Method::GET,
            "/charge/v1/coupons/abcdabcdabcdabcd",
            Some(USER_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(code_of(&resp), 1304);
}

#[tokio::test]
async fn test_slow_request_times_out_but_completes() {
    let app = TestApp::builder()
        .notifier(StubNotifier {
            delay: Some(Duration::from_millis(300)),
            ..StubNotifier::default()
        })
        .timeout(Duration::from_millis(100))
        .build()
        .await;
    let data = app.create(40.0, 2).await;
    let serial = data["serial"].as_str().unwrap();

    let (status, resp) = app
        .call(
            Method::PUT,
            &format!("/charge/v1/coupons/use/{}", serial),
            Some(USER_TOKEN),
            Some(json!({"code": data["code"], "namespace": "ns"})),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(code_of(&resp), 1321);

    // The handler keeps running and commits.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(app.notifier.calls(), 1);
    let record = app.engine.get(serial).await.unwrap().unwrap();
    assert_eq!(record.status, CouponStatus::Used);
}
