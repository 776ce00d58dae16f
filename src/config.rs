// Application configuration
// Read once at startup from the environment (after `.env` is loaded)

use std::path::PathBuf;

use chrono::Duration;
use thiserror::Error;

use crate::auth::token::{CredentialProvider, Credentials};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 30 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;
const MAX_TOKEN_TTL_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Failed to read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid signing key: {0}")]
    Key(String),
}

/// Token signing material
#[derive(Clone, PartialEq, Eq)]
pub enum SigningKey {
    /// HS256 shared secret (`JWT_SECRET`)
    Secret(String),
    /// RS256 key pair (`JWT_PRIVATE_KEY_PATH` + `JWT_PUBLIC_KEY_PATH`)
    RsaPem {
        private_key_path: PathBuf,
        public_key_path: PathBuf,
    },
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SigningKey::Secret(_) => f.write_str("Secret(..)"),
            SigningKey::RsaPem {
                private_key_path,
                public_key_path,
            } => f
                .debug_struct("RsaPem")
                .field("private_key_path", private_key_path)
                .field("public_key_path", public_key_path)
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub signing_key: SigningKey,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

impl AppConfig {
    /// Reads the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`
    ///
    /// `DATABASE_URL` wins over the `POSTGRES_*` variables. The signing key
    /// is either `JWT_SECRET` or the pair of PEM paths; setting both is an
    /// error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_url = match var("DATABASE_URL") {
            Some(url) => url,
            None => postgres_url(&var)?,
        };

        let host = var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or(var("PORT"), "PORT", DEFAULT_PORT)?;
        let db_max_connections =
            parse_or(var("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;
        if db_max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "DB_MAX_CONNECTIONS",
                reason: "must be at least 1".to_string(),
            });
        }

        let signing_key = match (
            var("JWT_SECRET"),
            var("JWT_PRIVATE_KEY_PATH"),
            var("JWT_PUBLIC_KEY_PATH"),
        ) {
            (Some(secret), None, None) => SigningKey::Secret(secret),
            (None, Some(private_key_path), Some(public_key_path)) => SigningKey::RsaPem {
                private_key_path: PathBuf::from(private_key_path),
                public_key_path: PathBuf::from(public_key_path),
            },
            (None, None, None) => return Err(ConfigError::Missing("JWT_SECRET")),
            (Some(_), _, _) => {
                return Err(ConfigError::Invalid {
                    name: "JWT_SECRET",
                    reason: "cannot be combined with JWT_PRIVATE_KEY_PATH/JWT_PUBLIC_KEY_PATH".to_string(),
                })
            }
            (None, None, Some(_)) => return Err(ConfigError::Missing("JWT_PRIVATE_KEY_PATH")),
            (None, Some(_), None) => return Err(ConfigError::Missing("JWT_PUBLIC_KEY_PATH")),
        };

        let access_secs = parse_or(
            var("ACCESS_TOKEN_TTL_SECS"),
            "ACCESS_TOKEN_TTL_SECS",
            DEFAULT_ACCESS_TOKEN_TTL_SECS,
        )?;
        let refresh_secs = parse_or(
            var("REFRESH_TOKEN_TTL_SECS"),
            "REFRESH_TOKEN_TTL_SECS",
            DEFAULT_REFRESH_TOKEN_TTL_SECS,
        )?;
        let access_token_ttl = token_ttl("ACCESS_TOKEN_TTL_SECS", access_secs)?;
        let refresh_token_ttl = token_ttl("REFRESH_TOKEN_TTL_SECS", refresh_secs)?;
        if refresh_token_ttl <= access_token_ttl {
            return Err(ConfigError::Invalid {
                name: "REFRESH_TOKEN_TTL_SECS",
                reason: "must be greater than ACCESS_TOKEN_TTL_SECS".to_string(),
            });
        }

        Ok(Self {
            database_url,
            host,
            port,
            db_max_connections,
            signing_key,
            access_token_ttl,
            refresh_token_ttl,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Loads the key material and builds the credential provider
    pub fn credential_provider(&self) -> Result<CredentialProvider, ConfigError> {
        let credentials = match &self.signing_key {
            SigningKey::Secret(secret) => Credentials::from_secret(secret.as_bytes()),
            SigningKey::RsaPem {
                private_key_path,
                public_key_path,
            } => {
                let private_pem = read_key(private_key_path)?;
                let public_pem = read_key(public_key_path)?;
                Credentials::from_rsa_pem(&private_pem, &public_pem)
                    .map_err(|e| ConfigError::Key(e.to_string()))?
            }
        };

        Ok(CredentialProvider::new(credentials)
            .with_access_ttl(self.access_token_ttl)
            .with_refresh_ttl(self.refresh_token_ttl))
    }
}

fn postgres_url<F>(var: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let user = var("POSTGRES_USER").ok_or(ConfigError::Missing("DATABASE_URL"))?;
    let password = var("POSTGRES_PASSWORD").ok_or(ConfigError::Missing("POSTGRES_PASSWORD"))?;
    let db = var("POSTGRES_DB").ok_or(ConfigError::Missing("POSTGRES_DB"))?;
    let host = var("POSTGRES_HOST").unwrap_or_else(|| "localhost".to_string());
    let port = var("POSTGRES_PORT").unwrap_or_else(|| "5432".to_string());
    let ssl_mode = var("POSTGRES_SSL_MODE").unwrap_or_else(|| "disable".to_string());

    Ok(format!(
        "postgres://{}:{}@{}:{}/{}?sslmode={}",
        user, password, host, port, db, ssl_mode
    ))
}

fn parse_or<T>(value: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn token_ttl(name: &'static str, secs: i64) -> Result<Duration, ConfigError> {
    if secs <= 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be positive".to_string(),
        });
    }
    if secs > MAX_TOKEN_TTL_SECS {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("must not exceed {} seconds", MAX_TOKEN_TTL_SECS),
        });
    }
    Duration::try_seconds(secs).ok_or(ConfigError::Invalid {
        name,
        reason: "out of range".to_string(),
    })
}

fn read_key(path: &PathBuf) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::KeyFile {
        path: path.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("DATABASE_URL", "postgres://localhost/app"), ("JWT_SECRET", "s3cret")]).unwrap();

        assert_eq!(cfg.database_url, "postgres://localhost/app");
        assert_eq!(cfg.bind_address(), "0.0.0.0:8080");
        assert_eq!(cfg.db_max_connections, 10);
        assert_eq!(cfg.signing_key, SigningKey::Secret("s3cret".to_string()));
        assert_eq!(cfg.access_token_ttl, Duration::minutes(30));
        assert_eq!(cfg.refresh_token_ttl, Duration::days(7));
    }

    #[test]
    fn test_database_url_from_postgres_parts() {
        let cfg = config(&[
            ("POSTGRES_USER", "fit"),
            ("POSTGRES_PASSWORD", "pw"),
            ("POSTGRES_HOST", "db"),
            ("POSTGRES_PORT", "6543"),
            ("POSTGRES_DB", "fitness"),
            ("POSTGRES_SSL_MODE", "require"),
            ("JWT_SECRET", "s3cret"),
        ])
        .unwrap();

        assert_eq!(cfg.database_url, "postgres://fit:pw@db:6543/fitness?sslmode=require");
    }

    #[test]
    fn test_missing_database_settings() {
        let err = config(&[("JWT_SECRET", "s3cret")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_missing_signing_key() {
        let err = config(&[("DATABASE_URL", "postgres://localhost/app")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn test_rsa_paths_select_pem_key() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("JWT_PRIVATE_KEY_PATH", "keys/private.pem"),
            ("JWT_PUBLIC_KEY_PATH", "keys/public.pem"),
        ])
        .unwrap();

        assert!(matches!(cfg.signing_key, SigningKey::RsaPem { .. }));
    }

    #[test]
    fn test_rsa_key_files_are_loaded() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/src/auth/testdata");
        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("JWT_PRIVATE_KEY_PATH", &format!("{}/rsa_private.pem", dir)),
            ("JWT_PUBLIC_KEY_PATH", &format!("{}/rsa_public.pem", dir)),
        ])
        .unwrap();

        let provider = cfg.credential_provider().unwrap();
        assert_eq!(provider.access_ttl(), Duration::minutes(30));
    }

    #[test]
    fn test_missing_key_file_is_reported() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("JWT_PRIVATE_KEY_PATH", "/nonexistent/private.pem"),
            ("JWT_PUBLIC_KEY_PATH", "/nonexistent/public.pem"),
        ])
        .unwrap();

        assert!(matches!(cfg.credential_provider(), Err(ConfigError::KeyFile { .. })));
    }

    #[test]
    fn test_secret_and_pem_are_exclusive() {
        let err = config(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("JWT_SECRET", "s3cret"),
            ("JWT_PRIVATE_KEY_PATH", "keys/private.pem"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "JWT_SECRET", .. }));
    }

    #[test]
    fn test_refresh_ttl_must_exceed_access_ttl() {
        let err = config(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("JWT_SECRET", "s3cret"),
            ("ACCESS_TOKEN_TTL_SECS", "3600"),
            ("REFRESH_TOKEN_TTL_SECS", "3600"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "REFRESH_TOKEN_TTL_SECS", .. }));
    }

    #[test]
    fn test_oversized_ttl_is_rejected() {
        for secs in [i64::MAX.to_string(), "10000000000000".to_string()] {
            let err = config(&[
                ("DATABASE_URL", "postgres://localhost/app"),
                ("JWT_SECRET", "s3cret"),
                ("REFRESH_TOKEN_TTL_SECS", secs.as_str()),
            ])
            .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { name: "REFRESH_TOKEN_TTL_SECS", .. }));
        }
    }

    #[test]
    fn test_non_positive_access_ttl_is_rejected() {
        let err = config(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("JWT_SECRET", "s3cret"),
            ("ACCESS_TOKEN_TTL_SECS", "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "ACCESS_TOKEN_TTL_SECS", .. }));
    }

    #[test]
    fn test_invalid_port() {
        let err = config(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("JWT_SECRET", "s3cret"),
            ("PORT", "eighty"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }
}
