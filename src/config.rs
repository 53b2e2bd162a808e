//! Bot configuration from the environment.
//!
//! A `.env` file in the working directory is loaded first when present;
//! variables already set in the environment take precedence over it.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::git::cherry_pick::FallbackStrategy;
use crate::git::{CommitIdentity, DEFAULT_GIT_TIMEOUT, GitConfig};

pub const DEFAULT_SERVE_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVE_PORT: u16 = 3000;
pub const DEFAULT_REMOTE_BASE: &str = "https://github.com";
pub const PRIVATE_KEY_FILENAME: &str = "private-key.pem";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name} has an invalid value `{value}`: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("cannot determine the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

/// Everything the binary needs to run.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub app_id: u64,
    pub private_key_path: PathBuf,
    pub webhook_secret: SecretString,
    pub serve_host: String,
    pub serve_port: u16,
    /// Holds `cache/` and `work/`.
    pub root_dir: PathBuf,
    pub git_remote_base: String,
    /// Owners whose events are handled; empty allows everyone.
    pub allowed_owners: Vec<String>,
    pub conflict_strategy: FallbackStrategy,
    pub git_timeout: Duration,
    /// Overrides the app name from `GET /app` for the commit identity.
    pub bot_name: Option<String>,
}

impl BotConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Missing .env is fine.
        let _ = dotenvy::dotenv();
        let cwd = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
        Self::from_lookup(cwd, |name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(cwd: PathBuf, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let app_id = parse_var("APP_ID", var("APP_ID").ok_or(ConfigError::Missing("APP_ID"))?)?;
        let webhook_secret = var("WEBHOOK_SECRET")
            .map(SecretString::from)
            .ok_or(ConfigError::Missing("WEBHOOK_SECRET"))?;

        let root_dir = var("ROOT_DIR").map(PathBuf::from).unwrap_or(cwd);
        let private_key_path = var("PRIVATE_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| root_dir.join(PRIVATE_KEY_FILENAME));

        let serve_port = match var("SERVE_PORT") {
            Some(value) => parse_var("SERVE_PORT", value)?,
            None => DEFAULT_SERVE_PORT,
        };

        let conflict_strategy = match var("CONFLICT_STRATEGY") {
            Some(value) => parse_var("CONFLICT_STRATEGY", value)?,
            None => FallbackStrategy::default(),
        };

        let git_timeout = match var("GIT_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(parse_var("GIT_TIMEOUT_SECS", value)?),
            None => DEFAULT_GIT_TIMEOUT,
        };

        let allowed_owners = var("ALLOWED_OWNERS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|owner| !owner.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(BotConfig {
            app_id,
            private_key_path,
            webhook_secret,
            serve_host: var("SERVE_HOST").unwrap_or_else(|| DEFAULT_SERVE_HOST.to_string()),
            serve_port,
            root_dir,
            git_remote_base: var("GIT_REMOTE_BASE")
                .unwrap_or_else(|| DEFAULT_REMOTE_BASE.to_string()),
            allowed_owners,
            conflict_strategy,
            git_timeout,
            bot_name: var("BOT_NAME"),
        })
    }

    /// Whether events from repositories of `owner` are handled.
    ///
    /// GitHub logins are case-insensitive.
    pub fn is_owner_allowed(&self, owner: &str) -> bool {
        owner_allowed(&self.allowed_owners, owner)
    }

    /// Git settings for an app called `app_name`.
    pub fn git_config(&self, app_name: &str) -> GitConfig {
        let name = self.bot_name.as_deref().unwrap_or(app_name);
        GitConfig {
            root_dir: self.root_dir.clone(),
            remote_base: self.git_remote_base.clone(),
            commit_identity: CommitIdentity::for_app(name),
            timeout: self.git_timeout,
        }
    }
}

fn parse_var<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
        value,
    })
}

/// Whether `owner` passes the allowlist. An empty allowlist admits everyone.
pub fn owner_allowed(allowed_owners: &[String], owner: &str) -> bool {
    allowed_owners.is_empty()
        || allowed_owners
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(owner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<BotConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_lookup(PathBuf::from("/srv/backport"), |name| vars.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [("APP_ID", "123"), ("WEBHOOK_SECRET", "s3cret")];

    #[test]
    fn defaults() {
        let config = config(&REQUIRED).unwrap();
        assert_eq!(config.app_id, 123);
        assert_eq!(config.webhook_secret.expose_secret(), "s3cret");
        assert_eq!(config.serve_host, "0.0.0.0");
        assert_eq!(config.serve_port, 3000);
        assert_eq!(config.root_dir, PathBuf::from("/srv/backport"));
        assert_eq!(
            config.private_key_path,
            PathBuf::from("/srv/backport/private-key.pem")
        );
        assert_eq!(config.git_remote_base, "https://github.com");
        assert!(config.allowed_owners.is_empty());
        assert_eq!(config.conflict_strategy, FallbackStrategy::Ours);
        assert_eq!(config.git_timeout, Duration::from_secs(600));
        assert_eq!(config.bot_name, None);
    }

    #[test]
    fn overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("ROOT_DIR", "/data"),
            ("SERVE_PORT", "8080"),
            ("CONFLICT_STRATEGY", "theirs"),
            ("GIT_TIMEOUT_SECS", "30"),
            ("ALLOWED_OWNERS", "nextcloud, nextcloud-libraries,,"),
            ("BOT_NAME", "backportbot"),
        ]);
        let config = config(&vars).unwrap();
        assert_eq!(config.root_dir, PathBuf::from("/data"));
        assert_eq!(config.private_key_path, PathBuf::from("/data/private-key.pem"));
        assert_eq!(config.serve_port, 8080);
        assert_eq!(config.conflict_strategy, FallbackStrategy::Theirs);
        assert_eq!(config.git_timeout, Duration::from_secs(30));
        assert_eq!(
            config.allowed_owners,
            vec!["nextcloud", "nextcloud-libraries"]
        );

        let git = config.git_config("Backport");
        assert_eq!(git.commit_identity.name, "backportbot[bot]");
        assert_eq!(git.root_dir, PathBuf::from("/data"));
    }

    #[test]
    fn missing_required() {
        let err = config(&[("APP_ID", "1")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("WEBHOOK_SECRET")));

        let err = config(&[("WEBHOOK_SECRET", "x"), ("APP_ID", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("APP_ID")));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("SERVE_PORT", "http"));
        let err = config(&vars).unwrap_err();
        assert!(err.to_string().starts_with("SERVE_PORT has an invalid value `http`"));

        let mut vars = REQUIRED.to_vec();
        vars.push(("CONFLICT_STRATEGY", "recursive"));
        assert!(matches!(
            config(&vars).unwrap_err(),
            ConfigError::Invalid {
                name: "CONFLICT_STRATEGY",
                ..
            }
        ));
    }

    #[test]
    fn owner_allow_list() {
        let mut config = config(&REQUIRED).unwrap();
        assert!(config.is_owner_allowed("anyone"));

        config.allowed_owners = vec!["Nextcloud".to_string()];
        assert!(config.is_owner_allowed("nextcloud"));
        assert!(!config.is_owner_allowed("owncloud"));
    }

    #[test]
    fn app_name_used_without_override() {
        let config = config(&REQUIRED).unwrap();
        let git = config.git_config("Nextcloud Backport");
        assert_eq!(git.commit_identity.name, "Nextcloud Backport[bot]");
    }
}
