//! Engine configuration.
//!
//! A plain struct constructed either manually or from the environment.
//! No config-file parsing crate is introduced — callers that want
//! TOML/YAML can layer it on top of `from_env`/the struct literal
//! themselves.

/// Global configuration for the simulation engine and its task runtime.
///
/// # Example
///
/// ```rust
/// use crisis_sim_engine::config::EngineConfig;
///
/// let config = EngineConfig {
///     redis_url: "redis://localhost:6379/0".to_string(),
///     jwt_secret: "change-me".to_string(),
///     jwt_expiration_minutes: 60,
///     oracle_api_key: None,
///     database_url: None,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Broker URL backing the task queue / delayed scheduler.
    pub redis_url: String,
    /// HS256 signing secret for JWTs consumed by the access gate.
    pub jwt_secret: String,
    /// Minutes a minted JWT remains valid for.
    pub jwt_expiration_minutes: i64,
    /// API key for the LLM oracle backend, if the configured oracle needs one.
    pub oracle_api_key: Option<String>,
    /// Connection string for the external rating store, if one is wired up.
    pub database_url: Option<String>,
}

const INSECURE_DEFAULT_SECRET: &str = "insecure-default-change-me";

impl EngineConfig {
    /// Builds configuration from environment variables, applying the same
    /// defaults the original process used.
    ///
    /// - `REDIS_URL` defaults to `redis://localhost:6379/0`.
    /// - `JWT_EXPIRATION_MINUTES` defaults to `60`.
    /// - `JWT_SECRET` defaults to an insecure placeholder; a warning is
    ///   logged (never a panic) when that default is left in place.
    pub fn from_env() -> Self {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/0".to_string());

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            log::warn!("JWT_SECRET not set in environment; using an insecure default");
            INSECURE_DEFAULT_SECRET.to_string()
        });

        let jwt_expiration_minutes = std::env::var("JWT_EXPIRATION_MINUTES")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(60);

        let oracle_api_key = std::env::var("OPENAI_API_KEY").ok();

        let database_url = std::env::var("DATABASE_URL").ok().or_else(|| {
            let (host, port, name, user, password) = (
                std::env::var("DB_HOST").ok()?,
                std::env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string()),
                std::env::var("DB_NAME").ok()?,
                std::env::var("DB_USER").ok()?,
                std::env::var("DB_PASSWORD").unwrap_or_default(),
            );
            Some(format!(
                "postgres://{}:{}@{}:{}/{}",
                user, password, host, port, name
            ))
        });

        EngineConfig {
            redis_url,
            jwt_secret,
            jwt_expiration_minutes,
            oracle_api_key,
            database_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_defaults_when_unset() {
        // Note: this only exercises the default path reliably when the
        // relevant vars are absent from the test process's environment.
        std::env::remove_var("REDIS_URL");
        std::env::remove_var("JWT_EXPIRATION_MINUTES");
        let config = EngineConfig::from_env();
        assert_eq!(config.redis_url, "redis://localhost:6379/0");
        assert_eq!(config.jwt_expiration_minutes, 60);
    }
}
