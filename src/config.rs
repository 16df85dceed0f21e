use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub catalog: CatalogConfig,
    pub claim_authority: ClaimAuthorityConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expires_in: i64, // seconds
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimAuthorityConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 单次领取最多尝试的兑换码数量（None = 奖池大小）
    #[serde(default)]
    pub max_attempts: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// 倒计时刷新间隔（毫秒），上限 1000
    #[serde(default = "default_countdown_tick_ms")]
    pub countdown_tick_ms: u64,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            countdown_tick_ms: default_countdown_tick_ms(),
        }
    }
}

impl RewardsConfig {
    pub fn countdown_tick(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.countdown_tick_ms.clamp(1, 1000))
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_countdown_tick_ms() -> u64 {
    1000
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => Self::parse(&config_str)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fn get_env(name: &str) -> Option<String> {
                    env::var(name).ok()
                }
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                // 无配置文件时，两个远端地址必须提供
                let catalog_url = get_env("CATALOG_BASE_URL")
                    .ok_or("缺少 CATALOG_BASE_URL 环境变量，且未找到配置文件 config.toml")?;
                let authority_url = get_env("CLAIM_AUTHORITY_BASE_URL").ok_or(
                    "缺少 CLAIM_AUTHORITY_BASE_URL 环境变量，且未找到配置文件 config.toml",
                )?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
                        port: get_env_parse("SERVER_PORT", 8090u16),
                    },
                    database: DatabaseConfig {
                        url: get_env("DATABASE_URL")
                            .unwrap_or_else(|| "sqlite://play_state.db?mode=rwc".to_string()),
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 5u32),
                    },
                    jwt: JwtConfig {
                        secret: get_env("JWT_SECRET")
                            .unwrap_or_else(|| "change-me-in-production".to_string()),
                        access_token_expires_in: get_env_parse("JWT_ACCESS_EXPIRES_IN", 7200i64),
                    },
                    catalog: CatalogConfig {
                        base_url: catalog_url,
                        timeout_secs: get_env_parse("CATALOG_TIMEOUT_SECS", default_timeout_secs()),
                    },
                    claim_authority: ClaimAuthorityConfig {
                        base_url: authority_url,
                        api_key: get_env("CLAIM_AUTHORITY_API_KEY").unwrap_or_default(),
                        timeout_secs: get_env_parse(
                            "CLAIM_AUTHORITY_TIMEOUT_SECS",
                            default_timeout_secs(),
                        ),
                        max_attempts: get_env("CLAIM_MAX_ATTEMPTS").and_then(|v| v.parse().ok()),
                    },
                    rewards: RewardsConfig {
                        countdown_tick_ms: get_env_parse(
                            "COUNTDOWN_TICK_MS",
                            default_countdown_tick_ms(),
                        ),
                    },
                }
            }
            Err(e) => {
                return Err(format!("无法读取配置文件 {config_path}: {e}").into());
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(config_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        toml::from_str(config_str).map_err(|e| format!("解析配置文件失败: {e}").into())
    }

    // 环境变量覆盖（即便文件存在时也覆盖）
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            self.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            self.database.max_connections = mc;
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.jwt.secret = v;
        }
        if let Ok(v) = env::var("JWT_ACCESS_EXPIRES_IN")
            && let Ok(n) = v.parse()
        {
            self.jwt.access_token_expires_in = n;
        }
        if let Ok(v) = env::var("CATALOG_BASE_URL") {
            self.catalog.base_url = v;
        }
        if let Ok(v) = env::var("CATALOG_TIMEOUT_SECS")
            && let Ok(n) = v.parse()
        {
            self.catalog.timeout_secs = n;
        }
        if let Ok(v) = env::var("CLAIM_AUTHORITY_BASE_URL") {
            self.claim_authority.base_url = v;
        }
        if let Ok(v) = env::var("CLAIM_AUTHORITY_API_KEY") {
            self.claim_authority.api_key = v;
        }
        if let Ok(v) = env::var("CLAIM_AUTHORITY_TIMEOUT_SECS")
            && let Ok(n) = v.parse()
        {
            self.claim_authority.timeout_secs = n;
        }
        if let Ok(v) = env::var("CLAIM_MAX_ATTEMPTS")
            && let Ok(n) = v.parse()
        {
            self.claim_authority.max_attempts = Some(n);
        }
        if let Ok(v) = env::var("COUNTDOWN_TICK_MS")
            && let Ok(n) = v.parse()
        {
            self.rewards.countdown_tick_ms = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        host = "0.0.0.0"
        port = 8090

        [database]
        url = "sqlite::memory:"
        max_connections = 1

        [jwt]
        secret = "test-secret"
        access_token_expires_in = 3600

        [catalog]
        base_url = "http://catalog.local"

        [claim_authority]
        base_url = "http://claims.local"
        api_key = "k"
        max_attempts = 3
    "#;

    #[test]
    fn test_parse_applies_defaults() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.catalog.timeout_secs, 10);
        assert_eq!(config.claim_authority.max_attempts, Some(3));
        assert_eq!(config.rewards.countdown_tick_ms, 1000);
    }

    #[test]
    fn test_countdown_tick_is_capped_at_one_second() {
        let rewards = RewardsConfig {
            countdown_tick_ms: 5000,
        };
        assert_eq!(rewards.countdown_tick(), std::time::Duration::from_secs(1));

        let rewards = RewardsConfig {
            countdown_tick_ms: 0,
        };
        assert_eq!(rewards.countdown_tick(), std::time::Duration::from_millis(1));
    }

    #[test]
    fn test_parse_rejects_missing_sections() {
        assert!(Config::parse("[server]\nhost = \"x\"\nport = 1").is_err());
    }
}
