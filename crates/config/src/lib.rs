//! 统一配置中心
//!
//! 配置按以下优先级合并：内置默认值 -> 可选配置文件（`APP_CONFIG_FILE`，
//! 支持 yaml/json/toml）-> `APP_` 前缀的环境变量（层级以 `__` 分隔，
//! 例如 `APP_SERVER__PORT=9000`）。

use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 内置的开发用密钥，生产环境必须覆盖
pub const DEVELOPMENT_JWT_SECRET: &str = "development-only-secret-change-me-before-deploying";

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub jwt: JwtConfig,
    #[validate(nested)]
    pub party: PartyConfig,
    #[validate(nested)]
    pub coordination: CoordinationConfig,
    #[validate(nested)]
    pub fanout: FanoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

/// 数据库配置，未设置 `url` 时使用内存存储
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[validate(url)]
    pub url: Option<String>,
    #[validate(range(min = 1))]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JwtConfig {
    /// 至少 256 位
    #[validate(length(min = 32))]
    pub secret: String,
    #[validate(range(min = 1))]
    pub expiration_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PartyConfig {
    /// 派对自创建起的存活时间
    #[validate(range(min = 1))]
    pub ttl_hours: u32,
    #[validate(range(min = 1))]
    pub sweep_interval_seconds: u64,
}

/// 并发控制与外部协作方调用
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CoordinationConfig {
    #[validate(range(min = 1))]
    pub max_conflict_retries: u32,
    pub retry_base_delay_ms: u64,
    #[validate(range(min = 1))]
    pub collaborator_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FanoutConfig {
    /// 每个连接可积压的帧数
    #[validate(range(min = 1))]
    pub connection_buffer: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: DEVELOPMENT_JWT_SECRET.into(),
                expiration_hours: 24 * 30,
            },
            party: PartyConfig {
                ttl_hours: 24,
                sweep_interval_seconds: 300,
            },
            coordination: CoordinationConfig {
                max_conflict_retries: 3,
                retry_base_delay_ms: 10,
                collaborator_timeout_ms: 2000,
            },
            fanout: FanoutConfig {
                connection_buffer: 256,
            },
        }
    }
}

impl PartyConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl CoordinationConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }
}

impl AppConfig {
    /// 按默认值、配置文件、环境变量的顺序加载并校验
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            figment = if path.ends_with(".yml") || path.ends_with(".yaml") {
                figment.merge(Yaml::file(path))
            } else if path.ends_with(".json") {
                figment.merge(Json::file(path))
            } else {
                figment.merge(Toml::file(path))
            };
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment
            .extract()
            .map_err(|err| ConfigError::Load(Box::new(err)))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        Validate::validate(self)?;
        if self.jwt.secret.trim().is_empty() {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT secret cannot be blank".to_string(),
            ));
        }
        Ok(())
    }

    pub fn uses_development_secret(&self) -> bool {
        self.jwt.secret == DEVELOPMENT_JWT_SECRET
    }

    /// 日志用的脱敏描述
    pub fn sanitize(&self) -> String {
        let database = match &self.database.url {
            Some(url) => match url.split_once('@') {
                Some((_, host)) => format!("postgres://[REDACTED]@{host}"),
                None => "[REDACTED]".to_string(),
            },
            None => "memory".to_string(),
        };
        format!(
            "server={}:{} database={} party_ttl_hours={} retries={} timeout_ms={} buffer={}",
            self.server.host,
            self.server.port,
            database,
            self.party.ttl_hours,
            self.coordination.max_conflict_retries,
            self.coordination.collaborator_timeout_ms,
            self.fanout.connection_buffer,
        )
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(Box<figment::Error>),
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
}
