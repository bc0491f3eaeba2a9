//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址，例如 "0.0.0.0:3333"
    pub addr: String,
    /// 优雅关闭超时时间（秒）
    pub graceful_shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库连接 URL（未配置时使用内存存储）
    #[serde(default)]
    pub url: Option<Secret<String>>,
    /// 最大连接数
    pub max_connections: u32,
    /// 最小连接数
    pub min_connections: u32,
    /// 获取连接超时时间（秒）
    pub acquire_timeout_secs: u64,
    /// 空闲连接超时时间（秒）
    pub idle_timeout_secs: u64,
    /// 连接最大生命周期（秒）
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// JWT 密钥（使用 Secret 包装，防止日志泄露）
    pub jwt_secret: Secret<String>,
    /// 访问令牌过期时间（秒）
    pub access_token_exp_secs: u64,
    /// 非交互式调用方携带 org key 的请求头
    pub org_key_header: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthzConfig {
    /// 启用细粒度授权；关闭时退化为组织成员即可操作
    pub fga_enabled: bool,
    /// 批量 GraphQL 查询的顶层选择数上限（0 表示不限制）
    pub batch_selection_limit: u32,
    /// 列表接口单页最大条数
    pub page_size_max: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// 同步队列容量
    pub queue_capacity: usize,
    /// 同步 worker 数量
    pub worker_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// 超过该时长未更新视为 inactive（秒）
    pub inactive_window_secs: i64,
    /// 超过该时长未更新视为 zombie（秒）
    pub zombie_window_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub authz: AuthzConfig,
    pub sync: SyncConfig,
    pub cluster: ClusterConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("server.addr", "0.0.0.0:3333")?
            .set_default("server.graceful_shutdown_timeout_secs", 30)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("database.max_lifetime_secs", 1800)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("security.jwt_secret", "change-this-secret-in-production-min-32-chars!")?
            .set_default("security.access_token_exp_secs", 3600)?
            .set_default("security.org_key_header", "org-key")?
            .set_default("authz.fga_enabled", false)?
            .set_default("authz.batch_selection_limit", 0)?
            .set_default("authz.page_size_max", 500)?
            .set_default("sync.queue_capacity", 1024)?
            .set_default("sync.worker_count", 2)?
            .set_default("cluster.inactive_window_secs", 86_400)?
            .set_default("cluster.zombie_window_secs", 2_592_000)?;

        // 从环境变量加载配置（前缀为 FLEET_）
        settings = settings.add_source(
            Environment::with_prefix("FLEET")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        // 验证数据库连接池配置
        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::Message(
                "max_connections must be >= min_connections".to_string(),
            ));
        }

        // 验证 JWT 密钥长度（至少 32 字符）
        if self.security.jwt_secret.expose_secret().len() < 32 {
            return Err(ConfigError::Message(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        if self.security.org_key_header.trim().is_empty() {
            return Err(ConfigError::Message("org_key_header must not be empty".to_string()));
        }

        if self.authz.page_size_max == 0 {
            return Err(ConfigError::Message("page_size_max must be > 0".to_string()));
        }

        if self.sync.worker_count == 0 || self.sync.queue_capacity == 0 {
            return Err(ConfigError::Message(
                "sync worker_count and queue_capacity must be > 0".to_string(),
            ));
        }

        // 验证集群活跃度窗口
        if self.cluster.inactive_window_secs <= 0
            || self.cluster.inactive_window_secs >= self.cluster.zombie_window_secs
        {
            return Err(ConfigError::Message(
                "inactive_window_secs must be > 0 and < zombie_window_secs".to_string(),
            ));
        }

        Ok(())
    }

    /// 集群活跃度分类窗口
    pub fn activity_windows(&self) -> crate::models::ActivityWindows {
        crate::models::ActivityWindows {
            inactive: chrono::Duration::seconds(self.cluster.inactive_window_secs),
            zombie: chrono::Duration::seconds(self.cluster.zombie_window_secs),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use secrecy::Secret;
    use serial_test::serial;

    /// 单元测试使用的固定配置（不读取环境变量）
    pub(crate) fn test_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                addr: "127.0.0.1:0".to_string(),
                graceful_shutdown_timeout_secs: 5,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 4,
                min_connections: 1,
                acquire_timeout_secs: 5,
                idle_timeout_secs: 60,
                max_lifetime_secs: 300,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
            },
            security: SecurityConfig {
                jwt_secret: Secret::new("test_secret_key_32_characters_long!".to_string()),
                access_token_exp_secs: 900,
                org_key_header: "org-key".to_string(),
            },
            authz: AuthzConfig {
                fga_enabled: true,
                batch_selection_limit: 2,
                page_size_max: 50,
            },
            sync: SyncConfig {
                queue_capacity: 64,
                worker_count: 2,
            },
            cluster: ClusterConfig {
                inactive_window_secs: 86_400,
                zombie_window_secs: 2_592_000,
            },
        }
    }

    #[test]
    fn test_fixed_config_is_valid() {
        assert!(test_config().validate().is_ok());
    }

    fn clear_env() {
        for key in [
            "FLEET_DATABASE__URL",
            "FLEET_LOGGING__LEVEL",
            "FLEET_LOGGING__FORMAT",
            "FLEET_AUTHZ__FGA_ENABLED",
            "FLEET_AUTHZ__BATCH_SELECTION_LIMIT",
            "FLEET_CLUSTER__INACTIVE_WINDOW_SECS",
            "FLEET_SECURITY__JWT_SECRET",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env();

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.server.addr, "0.0.0.0:3333");
        assert_eq!(config.logging.level, "info");
        assert!(!config.authz.fga_enabled);
        assert_eq!(config.authz.batch_selection_limit, 0);
        assert!(config.database.url.is_none());
        assert_eq!(config.activity_windows().inactive, chrono::Duration::days(1));
    }

    #[test]
    #[serial]
    fn test_config_env_overrides() {
        clear_env();
        std::env::set_var("FLEET_AUTHZ__FGA_ENABLED", "true");
        std::env::set_var("FLEET_AUTHZ__BATCH_SELECTION_LIMIT", "2");

        let config = AppConfig::from_env().unwrap();
        assert!(config.authz.fga_enabled);
        assert_eq!(config.authz.batch_selection_limit, 2);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_validation_invalid_log_level() {
        clear_env();
        std::env::set_var("FLEET_LOGGING__LEVEL", "invalid");

        let result = AppConfig::from_env();
        assert!(result.is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_validation_inactive_window() {
        clear_env();
        std::env::set_var("FLEET_CLUSTER__INACTIVE_WINDOW_SECS", "99999999");

        let result = AppConfig::from_env();
        assert!(result.is_err());

        clear_env();
    }
}
