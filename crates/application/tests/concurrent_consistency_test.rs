//! 并发一致性测试
//!
//! 验证同一聚合上的并发操作串行化后，好友对称性与派对成员唯一性仍然成立。

mod common;

use std::sync::Arc;
use std::time::Duration;

use application::{ApplicationError, InMemoryPartyRepository, PartyRepository};
use async_trait::async_trait;
use common::Harness;
use domain::{Party, PartyId, RepositoryError, Timestamp, UserId};
use futures::future::join_all;

/// 按成员查询时先停顿，拉开“检查”与“写入”之间的窗口
struct SlowMemberLookup {
    inner: Arc<InMemoryPartyRepository>,
    delay: Duration,
}

#[async_trait]
impl PartyRepository for SlowMemberLookup {
    async fn create(&self, party: Party) -> Result<Party, RepositoryError> {
        self.inner.create(party).await
    }

    async fn update(&self, party: Party) -> Result<Party, RepositoryError> {
        self.inner.update(party).await
    }

    async fn delete(&self, id: PartyId, expected_version: i64) -> Result<(), RepositoryError> {
        self.inner.delete(id, expected_version).await
    }

    async fn find_by_id(&self, id: PartyId) -> Result<Option<Party>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_member(&self, user: UserId) -> Result<Option<Party>, RepositoryError> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_by_member(user).await
    }

    async fn delete_created_before(&self, cutoff: Timestamp) -> Result<u64, RepositoryError> {
        self.inner.delete_created_before(cutoff).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_to_different_parties_admit_only_one() {
    let h = Arc::new(Harness::new());
    let a = h.register("alice").await;
    let b = h.register("bob").await;
    let c = h.register("carol").await;
    let first = h.party_service.invite(a, b).await.unwrap();
    let second = h.party_service.invite(c, b).await.unwrap();

    let results = join_all([first, second].map(|party_id| {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.party_service.join(b, party_id).await })
    }))
    .await;
    let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| *r == Err(ApplicationError::AlreadyInParty)));

    let mut memberships = 0;
    for party_id in [first, second] {
        let party = h.parties.find_by_id(party_id).await.unwrap().unwrap();
        if party.members.contains(&b) {
            memberships += 1;
        }
    }
    assert_eq!(memberships, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn joins_through_separate_lock_tables_admit_only_one() {
    let h = Harness::new();
    let a = h.register("alice").await;
    let b = h.register("bob").await;
    let c = h.register("carol").await;
    let first = h.party_service.invite(a, b).await.unwrap();
    let second = h.party_service.invite(c, b).await.unwrap();

    let slow: Arc<dyn PartyRepository> = Arc::new(SlowMemberLookup {
        inner: h.parties.clone(),
        delay: Duration::from_millis(50),
    });
    let (east, west) = (h.party_node(slow.clone()), h.party_node(slow));

    let (left, right) = tokio::join!(east.join(b, first), west.join(b, second));
    let results = [left, right];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| *r == Err(ApplicationError::AlreadyInParty)));

    let mut memberships = 0;
    for party_id in [first, second] {
        let party = h.parties.find_by_id(party_id).await.unwrap().unwrap();
        if party.members.contains(&b) {
            memberships += 1;
        }
    }
    assert_eq!(memberships, 1);
    let joined = h.parties.find_by_member(b).await.unwrap().unwrap();
    assert!(joined.id == first || joined.id == second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_to_one_party_all_land() {
    let h = Arc::new(Harness::new());
    let leader = h.register("leader").await;
    let mut guests = Vec::new();
    for i in 0..8 {
        guests.push(h.register(&format!("guest{i}")).await);
    }
    let mut party_id = None;
    for guest in &guests {
        party_id = Some(h.party_service.invite(leader, *guest).await.unwrap());
    }
    let party_id = party_id.unwrap();

    let results = join_all(guests.iter().map(|guest| {
        let h = Arc::clone(&h);
        let guest = *guest;
        tokio::spawn(async move { h.party_service.join(guest, party_id).await })
    }))
    .await;
    for result in results {
        result.unwrap().unwrap();
    }

    let party = h.parties.find_by_id(party_id).await.unwrap().unwrap();
    assert_eq!(party.members.len(), guests.len() + 1);
    assert_eq!(party.members[0], leader);
    assert!(party.invites.is_empty());
    let mut unique = party.members.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), party.members.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn crossed_requests_and_accepts_stay_symmetric() {
    let h = Arc::new(Harness::new());
    let a = h.register("alice").await;
    let b = h.register("bob").await;

    let sends = join_all([(a, "bob"), (b, "alice")].map(|(from, query)| {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.friend_service.send_request(from, query).await })
    }))
    .await;
    for send in sends {
        send.unwrap().unwrap();
    }

    let accepts = join_all([(a, b), (b, a)].map(|(user, from)| {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.friend_service.respond(user, from, true).await })
    }))
    .await;
    for accept in accepts {
        accept.unwrap().unwrap();
    }

    let (alice, bob) = (h.profile(a).await, h.profile(b).await);
    assert_eq!(alice.friends, vec![b]);
    assert_eq!(bob.friends, vec![a]);
    for user in [&alice, &bob] {
        assert!(user.friend_requests_sent.is_empty());
        assert!(user.friend_requests_received.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_concurrent_requests_record_once() {
    let h = Arc::new(Harness::new());
    let a = h.register("alice").await;
    let b = h.register("bob").await;

    let results = join_all((0..6).map(|_| {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.friend_service.send_request(a, "bob").await })
    }))
    .await;
    let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| *r == Err(ApplicationError::AlreadyRequested)));
    assert_eq!(h.profile(a).await.friend_requests_sent, vec![b]);
    assert_eq!(h.profile(b).await.friend_requests_received, vec![a]);
}
