//! Process-wide configuration
//!
//! Values are layered with figment: built-in defaults, then an optional
//! `loyalty.toml` next to the binary, then environment variables (after
//! `.env` has been loaded by `main`). The resulting [`Config`] is read-only
//! and shared by reference.

use std::time::Duration;

use chrono::{FixedOffset, NaiveTime};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use log::LevelFilter;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Optional config file merged under the environment
pub const CONFIG_FILE: &str = "loyalty.toml";

/// Environment keys understood by [`Config::load`]
pub const ENV_KEYS: &[&str] = &[
    "TELEGRAM_BOT_TOKEN",
    "TELEGRAM_ADMIN_ID",
    "TIMEZONE",
    "BIRTHDAY_BONUS",
    "REGISTRATION_BONUS",
    "LOG_LEVEL",
    "LOG_FILE_PATH",
    "DATABASE_PATH",
    "BIRTHDAY_CHECK_TIME",
    "NOTIFICATION_INTERVAL_SECS",
    "SESSION_TIMEOUT_SECS",
    "SHUTDOWN_GRACE_SECS",
    "PURCHASE_ACCRUAL_PERCENT",
];

/// Scheduler and shutdown constants that are not worth a config key
pub mod scheduler {
    use super::Duration;

    /// Upper bound `stop()` waits for an in-flight run before aborting it
    pub const STOP_GRACE_SECS: u64 = 5;

    pub fn stop_grace() -> Duration {
        Duration::from_secs(STOP_GRACE_SECS)
    }
}

/// Per-chat execution lanes
pub mod lanes {
    use super::Duration;

    /// A lane worker with no events for this long retires
    pub const IDLE_SECS: u64 = 300;

    pub fn idle() -> Duration {
        Duration::from_secs(IDLE_SECS)
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for Bot API calls (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 60;

    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set. Add it to .env or the environment")]
    Missing(&'static str),

    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Failed to read configuration: {0}")]
    Extract(#[from] Box<figment::Error>),
}

/// Raw, stringly shape of the configuration as figment extracts it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RawConfig {
    telegram_bot_token: Option<String>,
    telegram_admin_id: Option<i64>,
    timezone: String,
    birthday_bonus: i64,
    registration_bonus: i64,
    log_level: String,
    log_file_path: String,
    database_path: String,
    birthday_check_time: String,
    notification_interval_secs: u64,
    session_timeout_secs: Option<u64>,
    shutdown_grace_secs: u64,
    purchase_accrual_percent: u8,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_admin_id: None,
            timezone: "Europe/Kaliningrad".to_string(),
            birthday_bonus: 10,
            registration_bonus: 0,
            log_level: "info".to_string(),
            log_file_path: "loyalty-bot.log".to_string(),
            database_path: "loyalty.sqlite".to_string(),
            birthday_check_time: "09:00".to_string(),
            notification_interval_secs: 60,
            session_timeout_secs: None,
            shutdown_grace_secs: 10,
            purchase_accrual_percent: 5,
        }
    }
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: SecretString,
    pub admin_id: i64,
    pub timezone: FixedOffset,
    pub birthday_bonus: i64,
    pub registration_bonus: i64,
    pub log_level: LevelFilter,
    pub log_file_path: String,
    pub database_path: String,
    pub birthday_check_time: NaiveTime,
    pub notification_interval: Duration,
    /// `None` keeps sessions open until the user finishes or cancels them
    pub session_timeout: Option<Duration>,
    pub shutdown_grace: Duration,
    pub purchase_accrual_percent: u8,
}

impl Config {
    /// Loads defaults, `loyalty.toml` and the environment, then validates.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(RawConfig::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw().only(ENV_KEYS))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let raw: RawConfig = figment.extract().map_err(Box::new)?;

        let token = raw
            .telegram_bot_token
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;
        let admin_id = raw
            .telegram_admin_id
            .filter(|id| *id != 0)
            .ok_or(ConfigError::Missing("TELEGRAM_ADMIN_ID"))?;

        let timezone = parse_timezone(&raw.timezone).ok_or_else(|| ConfigError::Invalid {
            key: "TIMEZONE",
            value: raw.timezone.clone(),
            reason: "expected a UTC offset like +02:00, UTC+3 or a supported zone name",
        })?;

        let log_level = raw
            .log_level
            .parse::<LevelFilter>()
            .map_err(|_| ConfigError::Invalid {
                key: "LOG_LEVEL",
                value: raw.log_level.clone(),
                reason: "expected one of off, error, warn, info, debug, trace",
            })?;

        let birthday_check_time =
            NaiveTime::parse_from_str(raw.birthday_check_time.trim(), "%H:%M").map_err(|_| ConfigError::Invalid {
                key: "BIRTHDAY_CHECK_TIME",
                value: raw.birthday_check_time.clone(),
                reason: "expected HH:MM",
            })?;

        if raw.notification_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "NOTIFICATION_INTERVAL_SECS",
                value: "0".to_string(),
                reason: "must be positive",
            });
        }
        if raw.birthday_bonus < 0 || raw.registration_bonus < 0 {
            return Err(ConfigError::Invalid {
                key: "BIRTHDAY_BONUS/REGISTRATION_BONUS",
                value: format!("{}/{}", raw.birthday_bonus, raw.registration_bonus),
                reason: "bonuses cannot be negative",
            });
        }
        if raw.purchase_accrual_percent > 100 {
            return Err(ConfigError::Invalid {
                key: "PURCHASE_ACCRUAL_PERCENT",
                value: raw.purchase_accrual_percent.to_string(),
                reason: "must be between 0 and 100",
            });
        }

        Ok(Self {
            bot_token: SecretString::from(token),
            admin_id,
            timezone,
            birthday_bonus: raw.birthday_bonus,
            registration_bonus: raw.registration_bonus,
            log_level,
            log_file_path: raw.log_file_path,
            database_path: raw.database_path,
            birthday_check_time,
            notification_interval: Duration::from_secs(raw.notification_interval_secs),
            session_timeout: raw.session_timeout_secs.filter(|s| *s > 0).map(Duration::from_secs),
            shutdown_grace: Duration::from_secs(raw.shutdown_grace_secs),
            purchase_accrual_percent: raw.purchase_accrual_percent,
        })
    }
}

/// Zones without DST that can be named instead of written as an offset
const NAMED_ZONES: &[(&str, i32)] = &[
    ("Europe/Kaliningrad", 2),
    ("Europe/Moscow", 3),
    ("Europe/Samara", 4),
    ("Asia/Yekaterinburg", 5),
    ("Asia/Novosibirsk", 7),
    ("Asia/Vladivostok", 10),
];

/// Parses `UTC`, `Z`, `+02:00`, `-5`, `UTC+3`, `GMT+03:30` or a name from [`NAMED_ZONES`].
pub fn parse_timezone(raw: &str) -> Option<FixedOffset> {
    let s = raw.trim();
    if let Some((_, hours)) = NAMED_ZONES.iter().find(|(name, _)| name.eq_ignore_ascii_case(s)) {
        return FixedOffset::east_opt(hours * 3600);
    }

    let s = s
        .strip_prefix("UTC")
        .or_else(|| s.strip_prefix("GMT"))
        .unwrap_or(s)
        .trim();
    if s.is_empty() || s == "Z" {
        return FixedOffset::east_opt(0);
    }

    let sign = match s.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let rest = &s[1..];
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use secrecy::ExposeSecret;

    #[test]
    fn test_parse_timezone_variants() {
        assert_eq!(parse_timezone("UTC"), FixedOffset::east_opt(0));
        assert_eq!(parse_timezone("+02:00"), FixedOffset::east_opt(7200));
        assert_eq!(parse_timezone("UTC+3"), FixedOffset::east_opt(10800));
        assert_eq!(parse_timezone("GMT-05:30"), FixedOffset::east_opt(-(5 * 3600 + 1800)));
        assert_eq!(parse_timezone("Europe/Kaliningrad"), FixedOffset::east_opt(7200));
        assert_eq!(parse_timezone("Mars/Olympus"), None);
        assert_eq!(parse_timezone("+25"), None);
    }

    #[test]
    fn test_load_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("TELEGRAM_BOT_TOKEN", "123:abc");
            jail.set_env("TELEGRAM_ADMIN_ID", "42");
            jail.set_env("TIMEZONE", "+03:00");
            jail.set_env("BIRTHDAY_BONUS", "25");
            jail.set_env("SESSION_TIMEOUT_SECS", "900");

            let config = Config::from_figment(Config::figment()).expect("config should load");
            assert_eq!(config.bot_token.expose_secret(), "123:abc");
            assert_eq!(config.admin_id, 42);
            assert_eq!(config.timezone, FixedOffset::east_opt(10800).expect("offset"));
            assert_eq!(config.birthday_bonus, 25);
            assert_eq!(config.registration_bonus, 0);
            assert_eq!(config.session_timeout, Some(Duration::from_secs(900)));
            assert_eq!(config.log_level, LevelFilter::Info);
            Ok(())
        });
    }

    #[test]
    fn test_missing_token_prevents_startup() {
        Jail::expect_with(|jail| {
            jail.set_env("TELEGRAM_ADMIN_ID", "42");
            let err = Config::from_figment(Config::figment()).unwrap_err();
            assert!(matches!(err, ConfigError::Missing("TELEGRAM_BOT_TOKEN")));
            Ok(())
        });
    }

    #[test]
    fn test_missing_admin_prevents_startup() {
        Jail::expect_with(|jail| {
            jail.set_env("TELEGRAM_BOT_TOKEN", "123:abc");
            let err = Config::from_figment(Config::figment()).unwrap_err();
            assert!(matches!(err, ConfigError::Missing("TELEGRAM_ADMIN_ID")));
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_is_overridden_by_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                telegram_bot_token = "from-file"
                telegram_admin_id = 7
                log_level = "debug"
                birthday_check_time = "10:30"
            "#,
            )?;
            jail.set_env("TELEGRAM_BOT_TOKEN", "from-env");

            let config = Config::from_figment(Config::figment()).expect("config should load");
            assert_eq!(config.bot_token.expose_secret(), "from-env");
            assert_eq!(config.admin_id, 7);
            assert_eq!(config.log_level, LevelFilter::Debug);
            assert_eq!(
                config.birthday_check_time,
                NaiveTime::from_hms_opt(10, 30, 0).expect("time")
            );
            Ok(())
        });
    }

    #[test]
    fn test_invalid_check_time_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("TELEGRAM_BOT_TOKEN", "123:abc");
            jail.set_env("TELEGRAM_ADMIN_ID", "42");
            jail.set_env("BIRTHDAY_CHECK_TIME", "nine");
            let err = Config::from_figment(Config::figment()).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: "BIRTHDAY_CHECK_TIME", .. }));
            Ok(())
        });
    }
}
