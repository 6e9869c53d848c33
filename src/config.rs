//! Application configuration loaded from environment variables.

use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::errors::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Simulated,
    None,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" => Ok(ProviderKind::Simulated),
            "none" => Ok(ProviderKind::None),
            other => Err(format!("unknown wallet provider `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a wallet session lasts before it is closed automatically
    pub length: Duration,
    /// Countdown granularity
    pub tick: Duration,
    /// Where users without a wallet extension are sent
    pub install_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            length: Duration::from_millis(600_000),
            tick: Duration::from_millis(1_000),
            install_url: "https://phantom.app/".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Persist to MongoDB when set, to `storage_dir` otherwise
    pub mongodb_uri: Option<String>,
    pub database_name: String,
    pub storage_dir: PathBuf,
    /// Fill empty storage with the demo subscriptions and friends
    pub seed_demo_data: bool,
    pub session: SessionConfig,
    /// Key used to sign session tokens
    pub session_secret: String,
    pub wallet_provider: ProviderKind,
    /// Seed the simulated wallet derives its account keys from
    pub wallet_seed: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = SessionConfig::default();
        let session_secret = match env::var("SESSION_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("SESSION_SECRET not set, session tokens will not survive a restart");
                uuid::Uuid::new_v4().simple().to_string()
            }
        };
        let tick_ms: u64 = parse_or("SESSION_TICK_MS", 1_000)?;
        if tick_ms == 0 {
            return Err(StoreError::Config("SESSION_TICK_MS must be positive".to_string()));
        }
        Ok(Config {
            port: parse_or("PORT", 8080)?,
            mongodb_uri: env::var("MONGODB_URI").ok().filter(|uri| !uri.is_empty()),
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "SubSplit".to_string()),
            storage_dir: env::var("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            seed_demo_data: parse_or("SEED_DEMO_DATA", true)?,
            session: SessionConfig {
                length: Duration::from_secs(parse_or("SESSION_LENGTH_SECS", 600)?),
                tick: Duration::from_millis(tick_ms),
                install_url: env::var("WALLET_INSTALL_URL").unwrap_or(defaults.install_url),
            },
            session_secret,
            wallet_provider: parse_or("WALLET_PROVIDER", ProviderKind::Simulated)?,
            wallet_seed: wallet_seed(env::var("WALLET_SEED").ok()),
        })
    }
}

fn wallet_seed(raw: Option<String>) -> String {
    raw.filter(|seed| !seed.is_empty())
        .unwrap_or_else(|| "subsplit-wallet".to_string())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => {
            info!("{key} not set, using default: {default:?}");
            Ok(default)
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| StoreError::Config(format!("Invalid {key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_kind() {
        assert_eq!("Simulated".parse::<ProviderKind>(), Ok(ProviderKind::Simulated));
        assert_eq!("none".parse::<ProviderKind>(), Ok(ProviderKind::None));
        assert!("metamask".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn rejects_malformed_values() {
        assert_eq!(parse_value::<u16>("PORT", " 3001 ").unwrap(), 3001);
        let err = parse_value::<u16>("PORT", "eighty").unwrap_err();
        assert!(err.to_string().contains("Invalid PORT"));
    }

    #[test]
    fn wallet_seed_is_its_own_setting() {
        assert_eq!(wallet_seed(None), "subsplit-wallet");
        assert_eq!(wallet_seed(Some(String::new())), "subsplit-wallet");
        assert_eq!(wallet_seed(Some("demo".to_string())), "demo");
    }

    #[test]
    fn default_session_lasts_ten_minutes() {
        let session = SessionConfig::default();
        assert_eq!(session.length.as_millis(), 600_000);
        assert_eq!(session.tick.as_millis(), 1_000);
    }
}
