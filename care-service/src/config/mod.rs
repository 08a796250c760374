use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct CareConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Token signing material. RS256 key files take precedence over a shared
/// HS256 secret.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub private_key_path: Option<String>,
    pub public_key_path: Option<String>,
    pub hmac_secret: Option<String>,
    pub issuer: String,
    pub session_expiry_minutes: i64,
    pub selection_expiry_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub admin_api_key: String,
    pub lockout_threshold: i32,
    pub lockout_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl CareConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = CareConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("care-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            jwt: JwtConfig {
                private_key_path: env::var("JWT_PRIVATE_KEY_PATH").ok(),
                public_key_path: env::var("JWT_PUBLIC_KEY_PATH").ok(),
                hmac_secret: env::var("JWT_HMAC_SECRET").ok(),
                issuer: get_env("JWT_ISSUER", Some("care-service"), is_prod)?,
                session_expiry_minutes: parse_env("JWT_SESSION_EXPIRY_MINUTES", "30", is_prod)?,
                selection_expiry_minutes: parse_env(
                    "JWT_SELECTION_EXPIRY_MINUTES",
                    "5",
                    is_prod,
                )?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
                admin_api_key: get_env("ADMIN_API_KEY", None, true)?,
                lockout_threshold: parse_env("LOCKOUT_THRESHOLD", "5", is_prod)?,
                lockout_minutes: parse_env("LOCKOUT_MINUTES", "15", is_prod)?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "10", is_prod)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", is_prod)?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "300", is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.session_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SESSION_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.selection_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SELECTION_EXPIRY_MINUTES must be positive"
            )));
        }

        let has_rsa = self.jwt.private_key_path.is_some() && self.jwt.public_key_path.is_some();
        let has_hmac = self
            .jwt
            .hmac_secret
            .as_deref()
            .is_some_and(|s| !s.is_empty());
        if !has_rsa && !has_hmac {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Either JWT_PRIVATE_KEY_PATH/JWT_PUBLIC_KEY_PATH or JWT_HMAC_SECRET must be set"
            )));
        }

        if self.security.lockout_threshold <= 0 || self.security.lockout_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "LOCKOUT_THRESHOLD and LOCKOUT_MINUTES must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if !has_rsa {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "RS256 key files are required in production"
                )));
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CareConfig {
        CareConfig {
            common: core_config::Config {
                port: 8080,
                log_level: "info".to_string(),
                otlp_endpoint: None,
            },
            environment: Environment::Dev,
            service_name: "care-service".to_string(),
            service_version: "test".to_string(),
            database: DatabaseConfig {
                url: "postgres://localhost/care".to_string(),
                max_connections: 5,
                min_connections: 1,
            },
            jwt: JwtConfig {
                private_key_path: None,
                public_key_path: None,
                hmac_secret: Some("secret".to_string()),
                issuer: "care-service".to_string(),
                session_expiry_minutes: 30,
                selection_expiry_minutes: 5,
            },
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
                admin_api_key: "key".to_string(),
                lockout_threshold: 5,
                lockout_minutes: 15,
            },
            rate_limit: RateLimitConfig {
                login_attempts: 10,
                login_window_seconds: 900,
                global_ip_limit: 300,
                global_ip_window_seconds: 60,
            },
        }
    }

    #[test]
    fn accepts_hmac_in_dev() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn rejects_missing_signing_material() {
        let mut cfg = sample();
        cfg.jwt.hmac_secret = None;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn production_requires_rsa_keys_and_explicit_origins() {
        let mut cfg = sample();
        cfg.environment = Environment::Prod;
        assert!(cfg.validate().is_err());

        cfg.jwt.private_key_path = Some("/keys/private.pem".to_string());
        cfg.jwt.public_key_path = Some("/keys/public.pem".to_string());
        assert!(cfg.validate().is_ok());

        cfg.security.allowed_origins = vec!["*".to_string()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_expiry() {
        let mut cfg = sample();
        cfg.jwt.session_expiry_minutes = 0;
        assert!(cfg.validate().is_err());
    }
}
