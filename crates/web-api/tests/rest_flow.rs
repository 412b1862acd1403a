mod support;

use reqwest::StatusCode;
use serde_json::json;

use support::TestServer;

#[tokio::test]
async fn health_and_unauthenticated_access() {
    let server = TestServer::spawn().await;

    let health = server.client.get(server.url("/health")).send().await.expect("health");
    assert_eq!(health.status(), StatusCode::OK);

    let anonymous = server
        .client
        .get(server.url("/api/v1/friends"))
        .send()
        .await
        .expect("friends");
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let forged = server
        .client
        .get(server.url("/api/v1/profiles/me"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .expect("me");
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = forged.json().await.expect("json");
    assert_eq!(body["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn profile_registration_and_update() {
    let server = TestServer::spawn().await;
    let alice = server.register("alice").await;

    let (status, me) = server.get(&alice, "/api/v1/profiles/me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["nickname"], "alice");
    assert!(me["icon"].as_str().is_some_and(|icon| !icon.is_empty()));

    let duplicate = server
        .client
        .post(server.url("/api/v1/profiles"))
        .json(&json!({ "nickname": "alice" }))
        .send()
        .await
        .expect("duplicate");
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let response = server
        .client
        .patch(server.url("/api/v1/profiles/me"))
        .bearer_auth(&alice.token)
        .json(&json!({ "nickname": "alicia", "icon": "🟢" }))
        .send()
        .await
        .expect("patch");
    assert_eq!(response.status(), StatusCode::OK);
    let updated: serde_json::Value = response.json().await.expect("json");
    assert_eq!(updated["nickname"], "alicia");
    assert_eq!(updated["icon"], "🟢");
}

#[tokio::test]
async fn friend_request_handshake_over_rest() {
    let server = TestServer::spawn().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;

    let (status, _) = server
        .post(&alice, "/api/v1/friends/requests", json!({ "query": "bob" }))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = server
        .post(&alice, "/api/v1/friends/requests", json!({ "query": "bob" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ALREADY_REQUESTED");

    let (status, body) = server
        .post(&alice, "/api/v1/friends/requests", json!({ "query": "alice" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "SELF_TARGET");

    let (status, body) = server
        .post(&alice, "/api/v1/friends/requests", json!({ "query": "nobody" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (_, sent) = server.get(&alice, "/api/v1/friends/requests/sent").await;
    assert_eq!(sent[0]["toUid"], bob.uid.as_str());
    let (_, received) = server.get(&bob, "/api/v1/friends/requests/received").await;
    assert_eq!(received[0]["fromUid"], alice.uid.as_str());
    assert_eq!(received[0]["nickname"], "alice");

    let (status, _) = server
        .post(
            &bob,
            "/api/v1/friends/requests/respond",
            json!({ "fromUid": alice.uid, "accept": true }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, alice_friends) = server.get(&alice, "/api/v1/friends").await;
    let (_, bob_friends) = server.get(&bob, "/api/v1/friends").await;
    assert_eq!(alice_friends[0]["uid"], bob.uid.as_str());
    assert_eq!(alice_friends[0]["online"], false);
    assert_eq!(bob_friends[0]["uid"], alice.uid.as_str());

    let (_, received) = server.get(&bob, "/api/v1/friends/requests/received").await;
    assert_eq!(received, json!([]));
}

#[tokio::test]
async fn party_lifecycle_over_rest() {
    let server = TestServer::spawn().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;
    let carol = server.register("carol").await;

    let (_, info) = server.get(&alice, "/api/v1/party").await;
    assert!(info["party"].is_null());

    let (status, invite) = server
        .post(&alice, "/api/v1/party/invite", json!({ "targetUid": bob.uid }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let party_id = invite["partyId"].as_str().expect("party id").to_owned();

    let (status, body) = server
        .post(&carol, "/api/v1/party/join", json!({ "partyId": party_id }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_INVITED");

    let (status, snapshot) = server
        .post(&bob, "/api/v1/party/join", json!({ "partyId": party_id }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["leaderId"], alice.uid.as_str());
    assert_eq!(snapshot["state"], "active");
    assert_eq!(snapshot["members"][1]["nickname"], "bob");
    assert_eq!(snapshot["invites"], json!([]));

    let (status, _) = server.post(&alice, "/api/v1/party/leave", json!({})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, info) = server.get(&bob, "/api/v1/party").await;
    assert_eq!(info["party"]["leaderId"], bob.uid.as_str());
    assert_eq!(info["party"]["state"], "forming");

    let (status, body) = server.post(&alice, "/api/v1/party/leave", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_IN_PARTY");

    let (status, body) = server
        .post(&bob, "/api/v1/party/invite", json!({ "targetUid": bob.uid }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "SELF_TARGET");
}

#[tokio::test]
async fn matchmaking_hooks_accept_authenticated_callers() {
    let server = TestServer::spawn().await;
    let alice = server.register("alice").await;

    let (status, _) = server
        .post(&alice, "/api/v1/matchmaking/join", json!({ "mode": "duo" }))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _) = server.post(&alice, "/api/v1/matchmaking/leave", json!({})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let anonymous = server
        .client
        .post(server.url("/api/v1/matchmaking/join"))
        .send()
        .await
        .expect("join");
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
}
