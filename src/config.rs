//! Environment-driven configuration, read once at startup

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::debounce::ConfirmThreshold;
use crate::error::ConfigError;
use crate::sources::{EpicSettings, ItadSettings};

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_webhook_url: String,
    pub state_path: PathBuf,
    pub history_database_url: String,
    /// Cron expression (with seconds) for periodic checks
    pub check_schedule: String,
    pub confirm_threshold: ConfirmThreshold,
    pub request_timeout: Duration,
    pub force_publish_on_boot: bool,
    pub user_agent: String,
    pub epic: EpicSettings,
    /// `None` when no API key is configured
    pub itad: Option<ItadSettings>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; empty values count as unset
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String> + 'static,
    ) -> Result<Self, ConfigError> {
        let env = Env(Box::new(move |key: &str| {
            lookup(key).filter(|v| !v.trim().is_empty())
        }));

        let data_dir = PathBuf::from(env.or("DATA_DIR", "data"));
        let state_path = env
            .get("STATE_PATH")
            .map_or_else(|| data_dir.join("state.json"), PathBuf::from);
        let history_database_url = env.get("HISTORY_DATABASE_URL").unwrap_or_else(|| {
            format!("sqlite:{}", data_dir.join("history.db").display())
        });

        let itad = env.get("ITAD_API_KEY").map(|api_key| -> Result<_, ConfigError> {
            Ok(ItadSettings {
                api_key,
                country: env.or("ITAD_COUNTRY", "IT"),
                max_final_eur: env.parse("STEAM_MAX_FINAL_EUR", 9.0)?,
                min_discount_pct: env.parse("STEAM_MIN_DISCOUNT_PCT", 50)?,
                max_results: env.parse("STEAM_MAX_RESULTS", 60)?,
                strict_aaa: env.parse("STEAM_STRICT_AAA", false)?,
                aaa_target: env.parse("STEAM_AAA_TARGET", 12)?,
                aaa_keywords: env
                    .or("STEAM_AAA_KEYWORDS", "")
                    .split('|')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect(),
                aaa_min_token_len: env.parse("STEAM_AAA_MIN_TOKEN_LEN", 4)?,
                max_pages: env.parse("ITAD_MAX_PAGES", 10)?,
                endpoint: env.get("ITAD_ENDPOINT"),
            })
        });

        Ok(Self {
            discord_webhook_url: env
                .get("DISCORD_WEBHOOK_URL")
                .ok_or(ConfigError::Missing("DISCORD_WEBHOOK_URL"))?,
            state_path,
            history_database_url,
            check_schedule: env.or("CHECK_SCHEDULE", "0 */10 * * * *"),
            confirm_threshold: ConfirmThreshold::new(env.parse("CONFIRM_THRESHOLD", 2)?),
            request_timeout: Duration::from_secs(env.parse("REQUEST_TIMEOUT_SECS", 20)?),
            force_publish_on_boot: env.parse("FORCE_PUBLISH_ON_BOOT", false)?,
            user_agent: env.or("HTTP_USER_AGENT", "free-games-watch/0.1"),
            epic: EpicSettings {
                locale: env.or("EPIC_LOCALE", "it"),
                country: env.or("EPIC_COUNTRY", "IT"),
                endpoint: env.get("EPIC_ENDPOINT"),
            },
            itad: itad.transpose()?,
        })
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String>>;

struct Env(Lookup);

impl Env {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value
                .trim()
                .to_ascii_lowercase()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn webhook_is_required() {
        assert!(matches!(
            config(&[]),
            Err(ConfigError::Missing("DISCORD_WEBHOOK_URL"))
        ));
        assert!(matches!(
            config(&[("DISCORD_WEBHOOK_URL", "  ")]),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("DISCORD_WEBHOOK_URL", "https://discord.com/api/webhooks/1/x")])
            .unwrap();

        assert_eq!(config.state_path, PathBuf::from("data/state.json"));
        assert_eq!(config.history_database_url, "sqlite:data/history.db");
        assert_eq!(config.confirm_threshold.get(), 2);
        assert_eq!(config.request_timeout, Duration::from_secs(20));
        assert!(!config.force_publish_on_boot);
        assert_eq!(config.epic.locale, "it");
        assert!(config.itad.is_none());
    }

    #[test]
    fn deals_source_is_configured_with_an_api_key() {
        let config = config(&[
            ("DISCORD_WEBHOOK_URL", "https://discord.com/api/webhooks/1/x"),
            ("DATA_DIR", "/var/lib/watch"),
            ("ITAD_API_KEY", "key"),
            ("STEAM_STRICT_AAA", "TRUE"),
            ("STEAM_AAA_KEYWORDS", "elden ring| gta ||tomb raider"),
            ("CONFIRM_THRESHOLD", "0"),
        ])
        .unwrap();

        let itad = config.itad.unwrap();
        assert!(itad.strict_aaa);
        assert_eq!(itad.aaa_keywords, vec!["elden ring", "gta", "tomb raider"]);
        assert_eq!(itad.max_final_eur, 9.0);
        assert_eq!(config.state_path, PathBuf::from("/var/lib/watch/state.json"));
        assert_eq!(config.confirm_threshold.get(), 1);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = config(&[
            ("DISCORD_WEBHOOK_URL", "https://discord.com/api/webhooks/1/x"),
            ("CONFIRM_THRESHOLD", "two"),
        ])
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { key: "CONFIRM_THRESHOLD", .. }));
    }
}
