//! User-editable settings persisted as JSON.
//!
//! The platform password is never written to disk; it lives in memory (seeded
//! from `PLATFORM_PASSWORD`).

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    config::Config,
    domain::{Campus, ChatId, Credentials},
    utils::{iso_timestamp_utc, Timezone},
    Result,
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub platform_login: String,
    pub school_id: String,
    pub campus_name: String,
    #[serde(deserialize_with = "chat_id_from_any")]
    pub admin_chat_id: Option<i64>,
    pub timezone: String,
    pub last_update: Option<String>,
}

impl Settings {
    pub fn campus(&self) -> Option<Campus> {
        if self.school_id.trim().is_empty() {
            return None;
        }
        Some(Campus {
            id: self.school_id.clone(),
            name: if self.campus_name.is_empty() {
                self.school_id.clone()
            } else {
                self.campus_name.clone()
            },
        })
    }

    pub fn admin_chat(&self) -> Option<ChatId> {
        self.admin_chat_id.map(ChatId)
    }

    pub fn zone(&self) -> Timezone {
        Timezone::parse(&self.timezone).unwrap_or(Timezone::UTC)
    }
}

/// Settings plus the in-memory password, backed by a JSON file.
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
    password: Option<String>,
}

impl SettingsStore {
    /// Load `cfg.settings_file`, then fill gaps from the environment config.
    pub fn load(cfg: &Config) -> Self {
        let mut settings = read_settings(&cfg.settings_file).unwrap_or_default();

        if settings.platform_login.is_empty() {
            if let Some(login) = &cfg.platform_login {
                settings.platform_login = login.clone();
            }
        }
        if settings.admin_chat_id.is_none() {
            settings.admin_chat_id = cfg.admin_chat_id;
        }
        if Timezone::parse(&settings.timezone).is_err() {
            settings.timezone = cfg.timezone.label();
        }

        Self {
            path: cfg.settings_file.clone(),
            settings,
            password: cfg.platform_password.clone(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn credentials(&self) -> Option<Credentials> {
        let login = self.settings.platform_login.trim();
        let password = self.password.as_deref()?;
        if login.is_empty() {
            return None;
        }
        Some(Credentials::new(login, password))
    }

    /// Human names of the settings still missing before monitoring can start.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.settings.platform_login.trim().is_empty() {
            missing.push("login");
        }
        if !self.has_password() {
            missing.push("password");
        }
        if self.settings.campus().is_none() {
            missing.push("campus");
        }
        if self.settings.admin_chat_id.is_none() {
            missing.push("admin chat");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    pub fn set_login(&mut self, login: &str) -> Result<()> {
        self.settings.platform_login = login.trim().to_string();
        self.save()
    }

    /// Memory only.
    pub fn set_password(&mut self, password: &str) {
        self.password = Some(password.to_string());
    }

    pub fn set_campus(&mut self, campus: &Campus) -> Result<()> {
        self.settings.school_id = campus.id.clone();
        self.settings.campus_name = campus.name.clone();
        self.save()
    }

    pub fn set_admin_chat(&mut self, chat_id: ChatId) -> Result<()> {
        self.settings.admin_chat_id = Some(chat_id.0);
        self.save()
    }

    pub fn set_timezone(&mut self, raw: &str) -> Result<Timezone> {
        let zone = Timezone::parse(raw)?;
        self.settings.timezone = zone.label();
        self.save()?;
        Ok(zone)
    }

    /// Forget everything except the admin chat binding.
    pub fn reset(&mut self) -> Result<()> {
        let admin_chat_id = self.settings.admin_chat_id;
        let timezone = self.settings.timezone.clone();
        self.settings = Settings {
            admin_chat_id,
            timezone,
            ..Settings::default()
        };
        self.password = None;
        self.save()
    }

    fn save(&mut self) -> Result<()> {
        self.settings.last_update = Some(iso_timestamp_utc());
        write_settings(&self.path, &self.settings)?;
        tracing::info!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

/// Older files keep the chat id as a string, with `""` for "not bound yet".
fn chat_id_from_any<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawChatId {
        Number(i64),
        Text(String),
    }

    match Option::<RawChatId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawChatId::Number(id)) => Ok(Some(id)),
        Some(RawChatId::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(RawChatId::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid admin_chat_id: {text:?}"))),
    }
}

fn read_settings(path: &Path) -> Option<Settings> {
    let txt = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Settings>(&txt) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::error!(path = %path.display(), "invalid settings file, using defaults: {e}");
            None
        }
    }
}

fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
