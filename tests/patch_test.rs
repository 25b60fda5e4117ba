//! §8 end-to-end scenarios 3-4: PATCH active=false and PATCH via a
//! multi-valued filter path.
mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn patch_active_false_disables_in_directory() {
    let server = common::test_server(vec![
        common::success(&json!({"ObjectGUID": "11111111-1111-1111-1111-111111111111"}).to_string()),
        common::success(&json!({"SamAccountName": "alice"}).to_string()),
        common::success(&json!({"Enabled": false}).to_string()),
        common::success(&json!({"Enabled": false}).to_string()),
    ])
    .await;

    server
        .post("/scim/v2/Users")
        .add_header("authorization", format!("Bearer {}", common::API_KEY))
        .json(&json!({"userName": "alice@ex.com", "externalId": "abc", "active": true}))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .patch("/scim/v2/Users/abc")
        .add_header("authorization", format!("Bearer {}", common::API_KEY))
        .json(&json!({
            "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
            "Operations": [{"op": "replace", "path": "active", "value": false}]
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["active"], json!(false));
}

#[tokio::test]
async fn patch_email_via_multi_valued_filter_path() {
    let server = common::test_server(vec![
        common::success(&json!({"ObjectGUID": "11111111-1111-1111-1111-111111111111"}).to_string()),
        common::success(&json!({"SamAccountName": "alice"}).to_string()),
        common::success(&json!({"EmailAddress": "alice.new@ex.com"}).to_string()),
        common::success(&json!({"EmailAddress": "alice.new@ex.com"}).to_string()),
    ])
    .await;

    server
        .post("/scim/v2/Users")
        .add_header("authorization", format!("Bearer {}", common::API_KEY))
        .json(&json!({"userName": "alice@ex.com", "externalId": "abc"}))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .patch("/scim/v2/Users/abc")
        .add_header("authorization", format!("Bearer {}", common::API_KEY))
        .json(&json!({
            "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
            "Operations": [{
                "op": "add",
                "path": r#"emails[type eq "work"].value"#,
                "value": "alice.new@ex.com"
            }]
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(
        body["emails"],
        json!([{"type": "work", "value": "alice.new@ex.com"}])
    );
}

#[tokio::test]
async fn patch_empty_operations_is_bad_request() {
    let server = common::test_server(vec![
        common::success(&json!({"ObjectGUID": "11111111-1111-1111-1111-111111111111"}).to_string()),
        common::success(&json!({"SamAccountName": "alice"}).to_string()),
    ])
    .await;

    server
        .post("/scim/v2/Users")
        .add_header("authorization", format!("Bearer {}", common::API_KEY))
        .json(&json!({"userName": "alice@ex.com", "externalId": "abc"}))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .patch("/scim/v2/Users/abc")
        .add_header("authorization", format!("Bearer {}", common::API_KEY))
        .json(&json!({
            "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
            "Operations": []
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}
