//! HTTP-level tests for the Google client against a mock server
//!
//! Run with: cargo test --test google_client_tests

use productivity_bff::google::{ChannelRequest, GoogleApi, GoogleClient};
use productivity_bff::GoogleConfig;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> GoogleClient {
    GoogleClient::new(&GoogleConfig {
        token_url: format!("{}/token", server.uri()),
        calendar_base_url: format!("{}/calendar/", server.uri()),
        gmail_base_url: format!("{}/gmail", server.uri()),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_refresh_posts_form_and_parses_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("client_id=cid"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "new", "expires_in": 1800, "scope": "x" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let refreshed = client_for(&server)
        .refresh_access_token("cid", "secret", "rt")
        .await
        .unwrap();
    assert_eq!(refreshed.access_token, "new");
    assert_eq!(refreshed.expires_in, Some(1800));
}

#[tokio::test]
async fn test_non_success_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .refresh_access_token("cid", "secret", "revoked")
        .await
        .unwrap_err()
        .to_string();
    assert!(err.contains("400"), "{}", err);
    assert!(err.contains("invalid_grant"), "{}", err);
}

#[tokio::test]
async fn test_calendar_watch_and_stop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendar/calendars/primary/events/watch"))
        .and(header("authorization", "Bearer at"))
        .and(body_json(json!({
            "id": "chan-1",
            "type": "web_hook",
            "address": "https://bff.test/api/webhooks/calendar",
            "token": "tok",
            "expiration": 1700000000000i64
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "api#channel",
            "id": "chan-1",
            "resourceId": "res-1",
            "expiration": "1700000000000"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/calendar/channels/stop"))
        .and(body_json(json!({ "id": "chan-1", "resourceId": "res-1" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let resp = client
        .watch_calendar(
            "at",
            &ChannelRequest {
                id: "chan-1".into(),
                kind: "web_hook".into(),
                address: "https://bff.test/api/webhooks/calendar".into(),
                token: Some("tok".into()),
                expiration: 1_700_000_000_000,
            },
        )
        .await
        .unwrap();
    assert_eq!(resp.resource_id.as_deref(), Some("res-1"));
    assert_eq!(resp.expiration.as_deref(), Some("1700000000000"));

    assert_ok!(client.stop_channel("at", "chan-1", Some("res-1")).await);
}

#[tokio::test]
async fn test_gmail_list_get_and_history() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gmail/users/me/messages"))
        .and(query_param("q", "after:2025/01/01"))
        .and(query_param("maxResults", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "id": "m1", "threadId": "t1" }],
            "resultSizeEstimate": 1
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gmail/users/me/messages/m1"))
        .and(query_param("format", "full"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "m1",
            "labelIds": ["INBOX"],
            "payload": { "mimeType": "text/plain", "body": { "size": 0 } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gmail/users/me/history"))
        .and(query_param("startHistoryId", "100"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "history": [{ "id": "101", "messagesDeleted": [{ "message": { "id": "m0" } }] }],
            "historyId": "102"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let list = client
        .list_gmail_messages("at", "after:2025/01/01", 5)
        .await
        .unwrap();
    assert_eq!(list.messages.len(), 1);
    assert!(list.next_page_token.is_none());

    let message = client.get_gmail_message("at", "m1").await.unwrap();
    assert_eq!(message.label_ids, vec!["INBOX"]);

    let history = client
        .list_gmail_history("at", "100", Some("p2"))
        .await
        .unwrap();
    assert_eq!(history.history_id.as_deref(), Some("102"));
    assert_eq!(history.history[0].messages_deleted[0].message.id, "m0");
}

#[tokio::test]
async fn test_gmail_watch_and_stop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gmail/users/me/watch"))
        .and(body_json(json!({
            "labelIds": ["INBOX"],
            "topicName": "projects/p/topics/gmail-push"
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "historyId": "555", "expiration": "1700000000000" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/gmail/users/me/stop"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let watch = client
        .watch_gmail("at", "projects/p/topics/gmail-push", &["INBOX"])
        .await
        .unwrap();
    assert_eq!(watch.history_id.as_deref(), Some("555"));

    assert_err!(client.stop_gmail("at").await);
}

#[tokio::test]
async fn test_gmail_modify_sends_label_changes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gmail/users/me/messages/m1/modify"))
        .and(header("authorization", "Bearer at"))
        .and(body_json(json!({
            "addLabelIds": ["UNREAD"],
            "removeLabelIds": []
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "m1",
            "threadId": "t1",
            "labelIds": ["INBOX", "UNREAD"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let updated = client_for(&server)
        .modify_gmail_message("at", "m1", &["UNREAD"], &[])
        .await
        .unwrap();
    assert_eq!(updated.label_ids, vec!["INBOX", "UNREAD"]);
}
