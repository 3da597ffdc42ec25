use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    errors::Error, fetcher::DEFAULT_FETCH_LIMIT, poll::DEFAULT_POLL_INTERVAL, utils::Timezone,
    Result,
};

pub const DEFAULT_AUTH_URL: &str =
    "https://auth.21-school.ru/auth/realms/EduPowerKeycloak/protocol/openid-connect/token";
pub const DEFAULT_API_URL: &str = "https://platform.21-school.ru";

const MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Typed process configuration (environment + optional `.env`).
///
/// Values the user edits through the chat menu live in [`crate::settings`];
/// the ones here act as seeds/defaults for them.
#[derive(Clone)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub admin_chat_id: Option<i64>,
    /// Upper bound on outgoing message length; the messenger's own limit wins if lower.
    pub telegram_message_limit: usize,
    pub button_label_max_length: usize,

    // Platform
    pub platform_login: Option<String>,
    pub platform_password: Option<String>,
    pub platform_auth_url: String,
    pub platform_api_url: String,
    pub http_timeout: Duration,

    // Monitoring
    pub poll_interval: Duration,
    pub notifications_limit: u32,
    pub timezone: Timezone,

    // Storage
    pub settings_file: PathBuf,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("admin_chat_id", &self.admin_chat_id)
            .field("platform_login", &self.platform_login)
            .field("platform_auth_url", &self.platform_auth_url)
            .field("platform_api_url", &self.platform_api_url)
            .field("poll_interval", &self.poll_interval)
            .field("notifications_limit", &self.notifications_limit)
            .field("timezone", &self.timezone)
            .field("settings_file", &self.settings_file)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|k| env::var(k).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let admin_chat_id = match get("ADMIN_CHAT_ID").and_then(non_empty) {
            Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| {
                Error::Config(format!("ADMIN_CHAT_ID must be a numeric chat id, got {raw:?}"))
            })?),
            None => None,
        };

        let telegram_message_limit = parse_num(&get, "TELEGRAM_MESSAGE_LIMIT").unwrap_or(4096);
        let button_label_max_length = parse_num(&get, "BUTTON_LABEL_MAX_LENGTH").unwrap_or(30);

        let platform_login = get("PLATFORM_LOGIN").and_then(non_empty);
        let platform_password = get("PLATFORM_PASSWORD").and_then(non_empty);
        let platform_auth_url = get("PLATFORM_AUTH_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_AUTH_URL.to_string());
        let platform_api_url = get("PLATFORM_API_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let http_timeout = Duration::from_secs(parse_num(&get, "HTTP_TIMEOUT_SECS").unwrap_or(15));

        let poll_interval = parse_num(&get, "POLL_INTERVAL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
            .max(MIN_POLL_INTERVAL);
        let notifications_limit =
            parse_num(&get, "NOTIFICATIONS_LIMIT").unwrap_or(DEFAULT_FETCH_LIMIT);

        let timezone = match get("TIMEZONE").and_then(non_empty) {
            Some(raw) => Timezone::parse(&raw)?,
            None => Timezone::parse("UTC+3")?,
        };

        let settings_file = PathBuf::from(
            get("SETTINGS_FILE")
                .and_then(non_empty)
                .unwrap_or_else(|| "bot_config.json".to_string()),
        );

        Ok(Self {
            telegram_bot_token,
            admin_chat_id,
            telegram_message_limit,
            button_label_max_length,
            platform_login,
            platform_password,
            platform_auth_url,
            platform_api_url,
            http_timeout,
            poll_interval,
            notifications_limit,
            timezone,
            settings_file,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_num<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    get(key).and_then(|s| s.trim().parse::<T>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn requires_bot_token() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn applies_defaults() {
        let cfg = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "123:abc")])).unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_secs(300));
        assert_eq!(cfg.notifications_limit, 50);
        assert_eq!(cfg.telegram_message_limit, 4096);
        assert_eq!(cfg.timezone.label(), "UTC+3");
        assert_eq!(cfg.platform_api_url, DEFAULT_API_URL);
        assert_eq!(cfg.settings_file, PathBuf::from("bot_config.json"));
        assert!(cfg.admin_chat_id.is_none());
        assert!(cfg.platform_password.is_none());
    }

    #[test]
    fn reads_overrides_and_clamps_interval() {
        let cfg = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("ADMIN_CHAT_ID", "-100500"),
            ("POLL_INTERVAL_SECS", "1"),
            ("TIMEZONE", "Asia/Yekaterinburg"),
            ("PLATFORM_API_URL", "http://localhost:8080/"),
            ("PLATFORM_PASSWORD", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(cfg.admin_chat_id, Some(-100500));
        assert_eq!(cfg.poll_interval, MIN_POLL_INTERVAL);
        assert_eq!(cfg.timezone.label(), "Asia/Yekaterinburg");
        assert_eq!(cfg.platform_api_url, "http://localhost:8080");
        assert!(!format!("{cfg:?}").contains("s3cret"));
    }

    #[test]
    fn rejects_bad_admin_chat_id_and_timezone() {
        assert!(Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("ADMIN_CHAT_ID", "me")
        ]))
        .is_err());
        assert!(Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TIMEZONE", "Mars/Olympus")
        ]))
        .is_err());
    }

    #[test]
    fn dotenv_parsing_strips_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# comment\nTELEGRAM_BOT_TOKEN=\"1:x\"\nexport PLATFORM_LOGIN='student'\nbroken line\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TELEGRAM_BOT_TOKEN".to_string(), "1:x".to_string()),
                ("PLATFORM_LOGIN".to_string(), "student".to_string()),
            ]
        );
    }
}
