use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = OffsetDateTime;

/// 用户唯一标识（由外部身份服务分配）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<UserId> for Uuid {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl FromStr for UserId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| DomainError::invalid_argument("uid", "not a valid uuid"))
    }
}

/// 派对唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub Uuid);

impl PartyId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PartyId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<PartyId> for Uuid {
    fn from(value: PartyId) -> Self {
        value.0
    }
}

/// 经过验证的昵称。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nickname(String);

impl Nickname {
    pub const MAX_CHARS: usize = 32;

    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("nickname", "cannot be empty"));
        }
        if value.chars().count() > Self::MAX_CHARS {
            return Err(DomainError::invalid_argument("nickname", "too long"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nickname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 用户头像图标（通常是单个 emoji）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Icon(String);

impl Icon {
    /// 新用户随机分配的默认调色板
    pub const PALETTE: [&'static str; 8] = ["🔴", "🟠", "🟡", "🟢", "🔵", "🟣", "🟤", "⚫"];

    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("icon", "cannot be empty"));
        }
        if value.chars().count() > 16 {
            return Err(DomainError::invalid_argument("icon", "too long"));
        }
        Ok(Self(value))
    }

    /// 按下标从调色板取图标，越界时回绕。
    pub fn from_palette(index: usize) -> Self {
        Self(Self::PALETTE[index % Self::PALETTE.len()].to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Icon {
    fn default() -> Self {
        Self("🔵".to_owned())
    }
}

impl fmt::Display for Icon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nickname_is_trimmed_and_bounded() {
        assert_eq!(Nickname::parse("  bob ").unwrap().as_str(), "bob");
        assert!(Nickname::parse("   ").is_err());
        assert!(Nickname::parse("x".repeat(33)).is_err());
        assert!(Nickname::parse("x".repeat(32)).is_ok());
    }

    #[test]
    fn user_id_parses_from_string() {
        let raw = Uuid::new_v4();
        let parsed: UserId = raw.to_string().parse().unwrap();
        assert_eq!(parsed, UserId::from(raw));
        assert!("bob".parse::<UserId>().is_err());
    }

    #[test]
    fn palette_wraps_around() {
        assert_eq!(Icon::from_palette(0).as_str(), "🔴");
        assert_eq!(Icon::from_palette(9).as_str(), "🟠");
    }
}
