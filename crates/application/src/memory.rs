//! 内存实现的仓储（用于测试和无数据库的开发模式）

use std::collections::HashMap;

use async_trait::async_trait;
use domain::{Party, PartyId, RepositoryError, Timestamp, User, UserId};
use tokio::sync::RwLock;

use crate::repository::{PartyRepository, ProfileRepository};

#[derive(Default)]
pub struct InMemoryProfileRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_version(users: &HashMap<UserId, User>, user: &User) -> Result<(), RepositoryError> {
        match users.get(&user.id) {
            Some(stored) if stored.version == user.version => Ok(()),
            _ => Err(RepositoryError::Conflict),
        }
    }

    fn check_nickname(users: &HashMap<UserId, User>, user: &User) -> Result<(), RepositoryError> {
        let taken = users
            .values()
            .any(|other| other.id != user.id && other.nickname == user.nickname);
        if taken {
            return Err(RepositoryError::duplicate("nickname"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(RepositoryError::duplicate("uid"));
        }
        Self::check_nickname(&users, &user)?;
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, mut user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        Self::check_version(&users, &user)?;
        Self::check_nickname(&users, &user)?;
        user.version += 1;
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save_pair(
        &self,
        mut first: User,
        mut second: User,
    ) -> Result<(User, User), RepositoryError> {
        let mut users = self.users.write().await;
        Self::check_version(&users, &first)?;
        Self::check_version(&users, &second)?;
        first.version += 1;
        second.version += 1;
        users.insert(first.id, first.clone());
        users.insert(second.id, second.clone());
        Ok((first, second))
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_nickname(&self, nickname: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| user.nickname.as_str() == nickname)
            .cloned())
    }

    async fn find_many(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.users.read().await.values().cloned().collect())
    }
}

#[derive(Default)]
struct PartyTable {
    parties: HashMap<PartyId, Party>,
    /// 成员 -> 所在派对，一个用户至多占一行
    members: HashMap<UserId, PartyId>,
}

impl PartyTable {
    fn check_members(&self, party: &Party) -> Result<(), RepositoryError> {
        let taken = party
            .members
            .iter()
            .any(|member| matches!(self.members.get(member), Some(id) if *id != party.id));
        if taken {
            return Err(RepositoryError::duplicate("member"));
        }
        Ok(())
    }

    fn store(&mut self, party: Party) {
        self.members
            .retain(|member, id| *id != party.id || party.members.contains(member));
        for member in &party.members {
            self.members.insert(*member, party.id);
        }
        self.parties.insert(party.id, party);
    }

    fn remove(&mut self, id: PartyId) {
        self.parties.remove(&id);
        self.members.retain(|_, party| *party != id);
    }
}

#[derive(Default)]
pub struct InMemoryPartyRepository {
    table: RwLock<PartyTable>,
}

impl InMemoryPartyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PartyRepository for InMemoryPartyRepository {
    async fn create(&self, party: Party) -> Result<Party, RepositoryError> {
        let mut table = self.table.write().await;
        if table.parties.contains_key(&party.id) {
            return Err(RepositoryError::duplicate("party_id"));
        }
        table.check_members(&party)?;
        table.store(party.clone());
        Ok(party)
    }

    async fn update(&self, mut party: Party) -> Result<Party, RepositoryError> {
        let mut table = self.table.write().await;
        match table.parties.get(&party.id) {
            Some(stored) if stored.version == party.version => {}
            _ => return Err(RepositoryError::Conflict),
        }
        table.check_members(&party)?;
        party.version += 1;
        table.store(party.clone());
        Ok(party)
    }

    async fn delete(&self, id: PartyId, expected_version: i64) -> Result<(), RepositoryError> {
        let mut table = self.table.write().await;
        match table.parties.get(&id) {
            Some(stored) if stored.version == expected_version => {
                table.remove(id);
                Ok(())
            }
            _ => Err(RepositoryError::Conflict),
        }
    }

    async fn find_by_id(&self, id: PartyId) -> Result<Option<Party>, RepositoryError> {
        Ok(self.table.read().await.parties.get(&id).cloned())
    }

    async fn find_by_member(&self, user: UserId) -> Result<Option<Party>, RepositoryError> {
        let table = self.table.read().await;
        Ok(table
            .members
            .get(&user)
            .and_then(|id| table.parties.get(id))
            .cloned())
    }

    async fn delete_created_before(&self, cutoff: Timestamp) -> Result<u64, RepositoryError> {
        let mut table = self.table.write().await;
        let expired: Vec<PartyId> = table
            .parties
            .values()
            .filter(|party| party.created_at < cutoff)
            .map(|party| party.id)
            .collect();
        for id in &expired {
            table.remove(*id);
        }
        Ok(expired.len() as u64)
    }
}
