//! 好友关系图集成测试

mod common;

use application::ApplicationError;
use common::{drain, event_names, Harness};
use domain::UserId;
use uuid::Uuid;

#[tokio::test]
async fn request_by_nickname_then_retry_is_rejected() {
    let h = Harness::new();
    let a = h.register("alice").await;
    let b = h.register("bob").await;

    h.friend_service.send_request(a, "bob").await.unwrap();
    let received = h.friend_service.list_received_requests(b).await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].from_uid, Uuid::from(a));
    assert_eq!(received[0].nickname, "alice");

    let sent = h.friend_service.list_sent_requests(a).await.unwrap();
    assert_eq!(sent[0].to_uid, Uuid::from(b));

    assert_eq!(
        h.friend_service.send_request(a, "bob").await,
        Err(ApplicationError::AlreadyRequested)
    );
    assert_eq!(h.profile(b).await.friend_requests_received, vec![a]);
}

#[tokio::test]
async fn request_by_uid_and_error_cases() {
    let h = Harness::new();
    let a = h.register("alice").await;
    let b = h.register("bob").await;

    assert_eq!(
        h.friend_service.send_request(a, "alice").await,
        Err(ApplicationError::SelfTarget)
    );
    assert_eq!(
        h.friend_service.send_request(a, "nobody").await,
        Err(ApplicationError::not_found("user"))
    );

    h.friend_service.send_request(a, &b.to_string()).await.unwrap();
    h.friend_service.respond(b, a, true).await.unwrap();
    assert_eq!(
        h.friend_service.send_request(a, "bob").await,
        Err(ApplicationError::AlreadyFriends)
    );
}

#[tokio::test]
async fn accept_is_symmetric_and_notifies_requester() {
    let h = Harness::new();
    let a = h.register("alice").await;
    let b = h.register("bob").await;
    let mut rx_a = h.connect(a).await;
    let mut rx_b = h.connect(b).await;

    h.friend_service.send_request(a, "bob").await.unwrap();
    let frames = drain(&mut rx_b);
    assert_eq!(event_names(&frames), vec!["friendRequestReceived"]);
    assert_eq!(frames[0]["data"]["fromUid"], a.to_string());

    h.friend_service.respond(b, a, true).await.unwrap();
    let frames = drain(&mut rx_a);
    assert_eq!(event_names(&frames), vec!["friendRequestAccepted"]);
    assert_eq!(frames[0]["data"]["fromUid"], b.to_string());

    let (alice, bob) = (h.profile(a).await, h.profile(b).await);
    assert_eq!(alice.friends, vec![b]);
    assert_eq!(bob.friends, vec![a]);
    assert!(alice.friend_requests_sent.is_empty());
    assert!(bob.friend_requests_received.is_empty());

    let friends = h.friend_service.list_friends(a).await.unwrap();
    assert_eq!(friends[0].nickname, "bob");
    assert!(friends[0].online);
}

#[tokio::test]
async fn decline_removes_request_without_friendship() {
    let h = Harness::new();
    let a = h.register("alice").await;
    let b = h.register("bob").await;

    h.friend_service.send_request(a, "bob").await.unwrap();
    h.friend_service.respond(b, a, false).await.unwrap();

    let (alice, bob) = (h.profile(a).await, h.profile(b).await);
    assert!(alice.friends.is_empty() && bob.friends.is_empty());
    assert!(alice.friend_requests_sent.is_empty());
    assert!(bob.friend_requests_received.is_empty());
}

#[tokio::test]
async fn responding_to_unknown_request_is_idempotent() {
    let h = Harness::new();
    let a = h.register("alice").await;
    let b = h.register("bob").await;
    let before = h.profile(a).await;

    h.friend_service.respond(a, b, false).await.unwrap();
    h.friend_service.respond(a, b, true).await.unwrap();
    h.friend_service
        .respond(a, UserId::from(Uuid::new_v4()), false)
        .await
        .unwrap();
    assert_eq!(h.profile(a).await, before);
}

#[tokio::test]
async fn presence_announcements_reach_friends() {
    let h = Harness::new();
    let a = h.register("alice").await;
    let b = h.register("bob").await;
    h.friend_service.send_request(a, "bob").await.unwrap();
    h.friend_service.respond(b, a, true).await.unwrap();

    let mut rx_b = h.connect(b).await;
    h.friend_service.announce_presence(a, true).await.unwrap();
    h.friend_service.announce_presence(a, false).await.unwrap();

    let frames = drain(&mut rx_b);
    assert_eq!(event_names(&frames), vec!["friendOnline", "friendOffline"]);
    assert_eq!(frames[0]["data"]["uid"], a.to_string());
    assert_eq!(frames[0]["data"]["friendUid"], b.to_string());
}
