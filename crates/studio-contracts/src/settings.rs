use std::env;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::errors::StudioError;
use crate::types::Language;

pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const EVENTS_FILE_NAME: &str = "events.jsonl";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 120.0;

pub const KEY_API_KEY: &str = "api_key";
pub const KEY_LANGUAGE: &str = "language";
pub const KEY_TEXT_MODEL: &str = "text_model";
pub const KEY_IMAGE_MODEL: &str = "image_model";
pub const KEY_TRANSLATE: &str = "translate";

/// Flat key-value settings persisted as one JSON object.
///
/// The file holds the API key, so it is written owner-only. An unreadable file
/// reads as empty but is never overwritten.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SETTINGS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.read_lenient()?
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.read_lenient()?.get(key).and_then(Value::as_bool)
    }

    pub fn set(&self, key: &str, value: Value) -> Result<(), StudioError> {
        let mut payload = self.read_strict()?;
        payload.insert(key.to_string(), value);
        self.write(&payload)
    }

    pub fn remove(&self, key: &str) -> Result<(), StudioError> {
        let mut payload = self.read_strict()?;
        if payload.remove(key).is_none() {
            return Ok(());
        }
        self.write(&payload)
    }

    pub fn api_key(&self) -> Option<String> {
        self.get(KEY_API_KEY)
    }

    pub fn save_api_key(&self, key: &str) -> Result<(), StudioError> {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(StudioError::validation("Enter an API key to save."));
        }
        self.set(KEY_API_KEY, Value::String(trimmed.to_string()))
    }

    pub fn clear_api_key(&self) -> Result<(), StudioError> {
        self.remove(KEY_API_KEY)
    }

    fn read_lenient(&self) -> Option<Map<String, Value>> {
        match read_json_object(&self.path) {
            Ok(payload) => Some(payload),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "settings unreadable; using defaults");
                None
            }
        }
    }

    fn read_strict(&self) -> Result<Map<String, Value>, StudioError> {
        read_json_object(&self.path).map_err(|err| {
            StudioError::store(format!(
                "settings at {} cannot be read ({err:#}); fix or remove the file first",
                self.path.display()
            ))
        })
    }

    fn write(&self, payload: &Map<String, Value>) -> Result<(), StudioError> {
        write_json_object(&self.path, payload)
            .map_err(|err| StudioError::store(format!("failed to save settings: {err:#}")))
    }
}

/// Values a command line can override on top of settings and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub home: Option<PathBuf>,
    pub api_key: Option<String>,
    pub text_model: Option<String>,
    pub image_model: Option<String>,
    pub language: Option<Language>,
    pub translate: Option<bool>,
    pub dryrun: bool,
}

/// Resolved studio configuration.
///
/// Precedence, lowest first: built-in defaults, `settings.json`,
/// environment, explicit overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct StudioConfig {
    pub home: PathBuf,
    pub api_key: Option<String>,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub language: Language,
    pub translate: bool,
    pub request_timeout_s: f64,
    pub dryrun: bool,
}

impl StudioConfig {
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, StudioError> {
        let home = overrides
            .home
            .clone()
            .or_else(|| non_empty_env("STUDIO_HOME").map(PathBuf::from))
            .or_else(default_home)
            .ok_or_else(|| {
                StudioError::Config("could not determine a data directory; set STUDIO_HOME".to_string())
            })?;
        Self::resolve_in(home, overrides)
    }

    pub fn resolve_in(home: PathBuf, overrides: ConfigOverrides) -> Result<Self, StudioError> {
        let settings = SettingsStore::in_dir(&home);

        let language = match overrides.language {
            Some(language) => language,
            None => match non_empty_env("STUDIO_LANGUAGE").or_else(|| settings.get(KEY_LANGUAGE)) {
                Some(raw) => raw.parse()?,
                None => Language::default(),
            },
        };
        let translate = overrides
            .translate
            .or_else(|| settings.get_bool(KEY_TRANSLATE))
            .unwrap_or(language != Language::English);

        let api_key = overrides
            .api_key
            .clone()
            .or_else(|| non_empty_env("GEMINI_API_KEY"))
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
            .or_else(|| settings.api_key());
        let api_base = non_empty_env("GEMINI_API_BASE")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let text_model = overrides
            .text_model
            .clone()
            .or_else(|| non_empty_env("STUDIO_TEXT_MODEL"))
            .or_else(|| settings.get(KEY_TEXT_MODEL))
            .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string());
        let image_model = overrides
            .image_model
            .clone()
            .or_else(|| non_empty_env("STUDIO_IMAGE_MODEL"))
            .or_else(|| settings.get(KEY_IMAGE_MODEL))
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string());
        let request_timeout_s = non_empty_env("STUDIO_REQUEST_TIMEOUT")
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value > 0.0)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_S);

        Ok(Self {
            home,
            api_key,
            api_base,
            text_model,
            image_model,
            language,
            translate,
            request_timeout_s,
            dryrun: overrides.dryrun,
        })
    }

    pub fn settings(&self) -> SettingsStore {
        SettingsStore::in_dir(&self.home)
    }

    pub fn history_path(&self) -> PathBuf {
        self.home.join(crate::history::HISTORY_FILE_NAME)
    }

    pub fn events_path(&self) -> PathBuf {
        self.home.join(EVENTS_FILE_NAME)
    }

    pub fn require_api_key(&self) -> Result<&str, StudioError> {
        self.api_key.as_deref().ok_or_else(|| {
            StudioError::Config(
                "no API key configured; run `sentient-studio settings set-key` or set GEMINI_API_KEY"
                    .to_string(),
            )
        })
    }
}

/// `AIzaSyABCD...wxyz` style preview that never prints the whole key.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.trim().chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

fn default_home() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("sentient-studio"))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Missing or blank files read as empty; anything else must be a JSON object.
fn read_json_object(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
        Err(err) => return Err(err.into()),
    };
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&raw)? {
        Value::Object(payload) => Ok(payload),
        _ => anyhow::bail!("expected a JSON object"),
    }
}

/// Atomic owner-only write through `<file>.tmp`.
fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&tmp)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // `mode` only applies when the temp file is created.
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    serde_json::to_writer_pretty(&mut file, payload)?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn api_key_round_trip_and_clear() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = SettingsStore::in_dir(temp.path());
        assert_eq!(settings.api_key(), None);

        settings.save_api_key("  AIzaSy-test-key  ")?;
        assert_eq!(settings.api_key().as_deref(), Some("AIzaSy-test-key"));

        settings.clear_api_key()?;
        assert_eq!(settings.api_key(), None);
        settings.clear_api_key()?;
        Ok(())
    }

    #[test]
    fn blank_api_key_is_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = SettingsStore::in_dir(temp.path());
        assert!(matches!(
            settings.save_api_key("   "),
            Err(StudioError::Validation(_))
        ));
        assert!(!settings.path().exists());
        Ok(())
    }

    #[test]
    fn set_preserves_other_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = SettingsStore::in_dir(temp.path());
        settings.set(KEY_LANGUAGE, json!("english"))?;
        settings.save_api_key("k-123")?;
        assert_eq!(settings.get(KEY_LANGUAGE).as_deref(), Some("english"));
        assert_eq!(settings.api_key().as_deref(), Some("k-123"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn settings_file_is_owner_only() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir()?;
        let settings = SettingsStore::in_dir(temp.path());
        fs::write(settings.path(), "{}")?;
        fs::set_permissions(settings.path(), fs::Permissions::from_mode(0o644))?;

        settings.save_api_key("AIzaSy-secret")?;
        let mode = fs::metadata(settings.path())?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert!(!temp.path().join("settings.json.tmp").exists());
        Ok(())
    }

    #[test]
    fn corrupt_settings_are_never_overwritten() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = SettingsStore::in_dir(temp.path());
        settings.save_api_key("AIzaSy-keep-me")?;
        let truncated = "{\"api_key\": \"AIzaSy-ke";
        fs::write(settings.path(), truncated)?;

        assert_eq!(settings.api_key(), None);
        let err = settings.set(KEY_LANGUAGE, json!("english")).err();
        assert!(matches!(err, Some(StudioError::Store(_))));
        assert!(settings.clear_api_key().is_err());
        assert_eq!(fs::read_to_string(settings.path())?, truncated);
        Ok(())
    }

    #[test]
    fn overrides_win_over_settings_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = SettingsStore::in_dir(temp.path());
        settings.set(KEY_TEXT_MODEL, json!("from-settings-text"))?;
        settings.set(KEY_IMAGE_MODEL, json!("from-settings-image"))?;
        settings.set(KEY_TRANSLATE, json!(false))?;

        let config = StudioConfig::resolve_in(
            temp.path().to_path_buf(),
            ConfigOverrides {
                image_model: Some("from-flag".to_string()),
                language: Some(Language::Korean),
                ..ConfigOverrides::default()
            },
        )?;
        assert_eq!(config.image_model, "from-flag");
        assert!(!config.translate);
        assert_eq!(config.language, Language::Korean);
        assert_eq!(config.history_path(), temp.path().join("history.json"));
        Ok(())
    }

    #[test]
    fn english_disables_translation_by_default() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = StudioConfig::resolve_in(
            temp.path().to_path_buf(),
            ConfigOverrides {
                language: Some(Language::English),
                ..ConfigOverrides::default()
            },
        )?;
        assert!(!config.translate);
        Ok(())
    }

    #[test]
    fn mask_secret_hides_the_middle() {
        assert_eq!(mask_secret("AIzaSyABCDEFGHwxyz"), "AIza…wxyz");
        assert_eq!(mask_secret("short"), "*****");
    }
}
