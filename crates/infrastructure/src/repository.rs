use std::collections::HashMap;
use std::sync::Arc;

use application::{PartyRepository, ProfileRepository};
use async_trait::async_trait;
use domain::{Icon, Nickname, Party, PartyId, RepositoryError, Timestamp, User, UserId};
use sqlx::{postgres::PgPoolOptions, FromRow, PgConnection, PgExecutor, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some("profiles_nickname_key") => "nickname",
                Some("party_members_pkey") => "member",
                _ => "id",
            };
            return RepositoryError::duplicate(field);
        }
    }
    RepositoryError::storage(err.to_string())
}

/// 让 `party_members` 与派对成员列表一致。
///
/// 成员已属于其他派对时违反 `party_members_pkey`，映射为 `Duplicate { field: "member" }`。
/// 并发事务写入同一用户时后提交者等待前者结束后失败。
async fn claim_members(conn: &mut PgConnection, party: &Party) -> Result<(), RepositoryError> {
    let members = uuids(&party.members);
    sqlx::query("DELETE FROM party_members WHERE party_id = $1 AND user_id <> ALL($2)")
        .bind(Uuid::from(party.id))
        .bind(&members)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_err)?;

    sqlx::query(
        "INSERT INTO party_members (user_id, party_id) \
         SELECT m.user_id, $1 FROM UNNEST($2::uuid[]) AS m(user_id) \
         WHERE NOT EXISTS ( \
             SELECT 1 FROM party_members pm WHERE pm.user_id = m.user_id AND pm.party_id = $1 \
         )",
    )
    .bind(Uuid::from(party.id))
    .bind(&members)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx_err)?;
    Ok(())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().copied().map(Into::into).collect()
}

const PROFILE_COLUMNS: &str = "id, nickname, icon, friends, friend_requests_sent, \
     friend_requests_received, version, created_at, updated_at";

const PARTY_COLUMNS: &str = "id, leader_id, members, invites, version, created_at, updated_at";

#[derive(Debug, FromRow)]
struct ProfileRecord {
    id: Uuid,
    nickname: String,
    icon: String,
    friends: Vec<Uuid>,
    friend_requests_sent: Vec<Uuid>,
    friend_requests_received: Vec<Uuid>,
    version: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<ProfileRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: ProfileRecord) -> Result<Self, Self::Error> {
        let nickname = Nickname::parse(value.nickname).map_err(|err| invalid_data(err.to_string()))?;
        let icon = Icon::parse(value.icon).map_err(|err| invalid_data(err.to_string()))?;

        Ok(User {
            id: UserId::from(value.id),
            nickname,
            icon,
            friends: value.friends.into_iter().map(UserId::from).collect(),
            friend_requests_sent: value
                .friend_requests_sent
                .into_iter()
                .map(UserId::from)
                .collect(),
            friend_requests_received: value
                .friend_requests_received
                .into_iter()
                .map(UserId::from)
                .collect(),
            version: value.version,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PartyRecord {
    id: Uuid,
    leader_id: Uuid,
    members: Vec<Uuid>,
    invites: Vec<Uuid>,
    version: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<PartyRecord> for Party {
    type Error = RepositoryError;

    fn try_from(value: PartyRecord) -> Result<Self, Self::Error> {
        if value.members.is_empty() {
            return Err(invalid_data(format!("party {} has no members", value.id)));
        }
        Ok(Party {
            id: PartyId::from(value.id),
            leader_id: UserId::from(value.leader_id),
            members: value.members.into_iter().map(UserId::from).collect(),
            invites: value.invites.into_iter().map(UserId::from).collect(),
            version: value.version,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgProfileRepository {
    pool: PgPool,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 按版本号更新，版本不匹配时返回 `Conflict`
    async fn update_with<'e, E>(executor: E, user: &User) -> Result<User, RepositoryError>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!(
            "UPDATE profiles \
             SET nickname = $2, icon = $3, friends = $4, friend_requests_sent = $5, \
                 friend_requests_received = $6, updated_at = $7, version = version + 1 \
             WHERE id = $1 AND version = $8 \
             RETURNING {PROFILE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ProfileRecord>(&sql)
            .bind(Uuid::from(user.id))
            .bind(user.nickname.as_str())
            .bind(user.icon.as_str())
            .bind(uuids(&user.friends))
            .bind(uuids(&user.friend_requests_sent))
            .bind(uuids(&user.friend_requests_received))
            .bind(user.updated_at)
            .bind(user.version)
            .fetch_optional(executor)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(RepositoryError::Conflict)?;

        User::try_from(record)
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let sql = format!(
            "INSERT INTO profiles ({PROFILE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {PROFILE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ProfileRecord>(&sql)
            .bind(Uuid::from(user.id))
            .bind(user.nickname.as_str())
            .bind(user.icon.as_str())
            .bind(uuids(&user.friends))
            .bind(uuids(&user.friend_requests_sent))
            .bind(uuids(&user.friend_requests_received))
            .bind(user.version)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        User::try_from(record)
    }

    async fn update(&self, user: User) -> Result<User, RepositoryError> {
        Self::update_with(&self.pool, &user).await
    }

    async fn save_pair(&self, first: User, second: User) -> Result<(User, User), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        let first = Self::update_with(&mut *tx, &first).await?;
        let second = Self::update_with(&mut *tx, &second).await?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok((first, second))
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
        let record = sqlx::query_as::<_, ProfileRecord>(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_by_nickname(&self, nickname: &str) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE nickname = $1");
        let record = sqlx::query_as::<_, ProfileRecord>(&sql)
            .bind(nickname)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_many(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ANY($1)");
        let records = sqlx::query_as::<_, ProfileRecord>(&sql)
            .bind(uuids(ids))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let mut by_id = records
            .into_iter()
            .map(|record| User::try_from(record).map(|user| (user.id, user)))
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at");
        let records = sqlx::query_as::<_, ProfileRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        records.into_iter().map(User::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgPartyRepository {
    pool: PgPool,
}

impl PgPartyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PartyRepository for PgPartyRepository {
    async fn create(&self, party: Party) -> Result<Party, RepositoryError> {
        let sql = format!(
            "INSERT INTO parties ({PARTY_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {PARTY_COLUMNS}"
        );
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        let record = sqlx::query_as::<_, PartyRecord>(&sql)
            .bind(Uuid::from(party.id))
            .bind(Uuid::from(party.leader_id))
            .bind(uuids(&party.members))
            .bind(uuids(&party.invites))
            .bind(party.version)
            .bind(party.created_at)
            .bind(party.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        let party = Party::try_from(record)?;

        claim_members(&mut *tx, &party).await?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(party)
    }

    async fn update(&self, party: Party) -> Result<Party, RepositoryError> {
        let sql = format!(
            "UPDATE parties \
             SET leader_id = $2, members = $3, invites = $4, updated_at = $5, version = version + 1 \
             WHERE id = $1 AND version = $6 \
             RETURNING {PARTY_COLUMNS}"
        );
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        let record = sqlx::query_as::<_, PartyRecord>(&sql)
            .bind(Uuid::from(party.id))
            .bind(Uuid::from(party.leader_id))
            .bind(uuids(&party.members))
            .bind(uuids(&party.invites))
            .bind(party.updated_at)
            .bind(party.version)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(RepositoryError::Conflict)?;
        let party = Party::try_from(record)?;

        claim_members(&mut *tx, &party).await?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(party)
    }

    async fn delete(&self, id: PartyId, expected_version: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM parties WHERE id = $1 AND version = $2")
            .bind(Uuid::from(id))
            .bind(expected_version)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: PartyId) -> Result<Option<Party>, RepositoryError> {
        let sql = format!("SELECT {PARTY_COLUMNS} FROM parties WHERE id = $1");
        let record = sqlx::query_as::<_, PartyRecord>(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        record.map(Party::try_from).transpose()
    }

    async fn find_by_member(&self, user: UserId) -> Result<Option<Party>, RepositoryError> {
        let sql = format!(
            "SELECT {PARTY_COLUMNS} FROM parties \
             WHERE id = (SELECT party_id FROM party_members WHERE user_id = $1)"
        );
        let record = sqlx::query_as::<_, PartyRecord>(&sql)
            .bind(Uuid::from(user))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        record.map(Party::try_from).transpose()
    }

    async fn delete_created_before(&self, cutoff: Timestamp) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM parties WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}

pub struct PgStorage {
    pub pool: PgPool,
    pub profile_repository: Arc<PgProfileRepository>,
    pub party_repository: Arc<PgPartyRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            profile_repository: Arc::new(PgProfileRepository::new(pool.clone())),
            party_repository: Arc::new(PgPartyRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
