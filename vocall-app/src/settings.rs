//! Persistent application settings (JSON file in app data directory).
//!
//! Environment variables override the file for the session only:
//! `VOCALL_API_KEY`, `VOCALL_MODEL`, `VOCALL_ENDPOINT`, `VOCALL_INPUT_DEVICE`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vocall_core::session::gemini::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use vocall_core::{AgentConfig, EngineConfig, GeminiLiveConfig};

use crate::agents::default_agents;

const MIN_BLOCK_SIZE: usize = 256;
const MAX_BLOCK_SIZE: usize = 16_384;
const MAX_CONNECT_TIMEOUT_SECS: u64 = 600;

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    /// Samples per captured block at 16 kHz.
    pub block_size: usize,
    /// 0 disables the connect timeout.
    pub connect_timeout_secs: u64,
    pub agents: Vec<AgentConfig>,
    pub default_agent: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            api_key: None,
            model: DEFAULT_MODEL.into(),
            endpoint: DEFAULT_ENDPOINT.into(),
            block_size: 4_096,
            connect_timeout_secs: 0,
            agents: default_agents(),
            default_agent: "job".into(),
        }
    }
}

impl std::fmt::Debug for AppSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSettings")
            .field("preferred_input_device", &self.preferred_input_device)
            .field("has_api_key", &self.api_key.is_some())
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("block_size", &self.block_size)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("agents", &self.agents.len())
            .field("default_agent", &self.default_agent)
            .finish()
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.preferred_input_device = trimmed(self.preferred_input_device.take());
        self.api_key = trimmed(self.api_key.take());

        let model = self.model.trim();
        let model = model.strip_prefix("models/").unwrap_or(model);
        self.model = if model.is_empty() {
            DEFAULT_MODEL.into()
        } else {
            model.into()
        };

        let endpoint = self.endpoint.trim();
        self.endpoint = if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
            endpoint.into()
        } else {
            DEFAULT_ENDPOINT.into()
        };

        self.block_size = self.block_size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);
        self.connect_timeout_secs = self.connect_timeout_secs.min(MAX_CONNECT_TIMEOUT_SECS);

        self.agents = normalize_agents(std::mem::take(&mut self.agents));
        if self.agents.is_empty() {
            self.agents = default_agents();
        }
        let default_agent = self.default_agent.trim().to_ascii_lowercase();
        self.default_agent = if self.agents.iter().any(|a| a.id == default_agent) {
            default_agent
        } else {
            self.agents[0].id.clone()
        };
    }

    /// Apply `VOCALL_*` environment overrides, then re-normalize.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("VOCALL_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("VOCALL_MODEL") {
            self.model = model;
        }
        if let Some(endpoint) = lookup("VOCALL_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(device) = lookup("VOCALL_INPUT_DEVICE") {
            self.preferred_input_device = Some(device);
        }
        self.normalize();
    }

    /// Look an agent up by id, case-insensitively.
    pub fn agent(&self, id: &str) -> Option<&AgentConfig> {
        let id = id.trim();
        self.agents.iter().find(|a| a.id.eq_ignore_ascii_case(id))
    }

    pub fn default_agent(&self) -> Option<&AgentConfig> {
        self.agent(&self.default_agent)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            block_size: self.block_size,
            connect_timeout: (self.connect_timeout_secs > 0)
                .then(|| Duration::from_secs(self.connect_timeout_secs)),
            preferred_input_device: self.preferred_input_device.clone(),
            ..EngineConfig::default()
        }
    }

    /// `None` without an API key.
    pub fn live_config(&self) -> Option<GeminiLiveConfig> {
        let key = self.api_key.as_ref()?;
        let mut config = GeminiLiveConfig::new(key.clone());
        config.model = self.model.clone();
        config.endpoint = self.endpoint.clone();
        Some(config)
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn normalize_agents(raw: Vec<AgentConfig>) -> Vec<AgentConfig> {
    let mut out: Vec<AgentConfig> = Vec::new();
    for mut agent in raw {
        agent.id = agent.id.trim().to_ascii_lowercase();
        if agent.id.is_empty() || out.iter().any(|a| a.id == agent.id) {
            continue;
        }
        agent.name = agent.name.trim().to_string();
        if agent.name.is_empty() {
            agent.name = agent.id.clone();
        }
        agent.system_instruction = agent.system_instruction.trim().to_string();
        out.push(agent);
    }
    out
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Vocall")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("vocall")
            .join("settings.json")
    }
}

/// Missing or unreadable files yield defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| match serde_json::from_str::<AppSettings>(&raw) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(path = ?path, "ignoring malformed settings file: {e}");
                None
            }
        })
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn normalize_clamps_and_trims() {
        let mut s = AppSettings {
            preferred_input_device: Some("   ".into()),
            api_key: Some("  k-123 \n".into()),
            model: " models/gemini-live ".into(),
            endpoint: "https://not-a-socket".into(),
            block_size: 12,
            connect_timeout_secs: 99_999,
            ..AppSettings::default()
        };
        s.normalize();
        assert_eq!(s.preferred_input_device, None);
        assert_eq!(s.api_key.as_deref(), Some("k-123"));
        assert_eq!(s.model, "gemini-live");
        assert_eq!(s.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(s.block_size, MIN_BLOCK_SIZE);
        assert_eq!(s.connect_timeout_secs, MAX_CONNECT_TIMEOUT_SECS);
    }

    #[test]
    fn unknown_default_agent_falls_back_to_first() {
        let mut s = AppSettings {
            agents: vec![
                AgentConfig::new(" Travel ", "Travel", "plan"),
                AgentConfig::new("travel", "Duplicate", ""),
                AgentConfig::new("", "No id", ""),
            ],
            default_agent: "lawyer".into(),
            ..AppSettings::default()
        };
        s.normalize();
        assert_eq!(s.agents.len(), 1);
        assert_eq!(s.agents[0].id, "travel");
        assert_eq!(s.default_agent, "travel");
        assert_eq!(s.default_agent().unwrap().name, "Travel");
    }

    #[test]
    fn empty_agent_list_restores_catalog() {
        let mut s = AppSettings {
            agents: Vec::new(),
            ..AppSettings::default()
        };
        s.normalize();
        assert!(s.agent("job").is_some());
        assert!(s.agent("POLYGLOT").is_some());
    }

    #[test]
    fn env_overrides_win_over_file() {
        let env: HashMap<&str, &str> = [
            ("VOCALL_API_KEY", "from-env"),
            ("VOCALL_MODEL", "other-model"),
            ("VOCALL_INPUT_DEVICE", "USB Mic"),
        ]
        .into_iter()
        .collect();
        let mut s = AppSettings::default();
        s.apply_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(s.api_key.as_deref(), Some("from-env"));
        assert_eq!(s.model, "other-model");
        assert_eq!(s.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(s.preferred_input_device.as_deref(), Some("USB Mic"));
    }

    #[test]
    fn engine_and_live_config_follow_settings() {
        let mut s = AppSettings {
            connect_timeout_secs: 15,
            block_size: 2_048,
            ..AppSettings::default()
        };
        assert!(s.live_config().is_none());
        let config = s.engine_config();
        assert_eq!(config.block_size, 2_048);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(15)));

        s.api_key = Some("secret".into());
        let live = s.live_config().unwrap();
        assert_eq!(live.model, DEFAULT_MODEL);
        assert!(!format!("{s:?}").contains("secret"));
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = std::env::temp_dir().join(format!("vocall-settings-{}", std::process::id()));
        let path = dir.join("settings.json");
        let mut s = AppSettings {
            default_agent: "travel".into(),
            connect_timeout_secs: 20,
            ..AppSettings::default()
        };
        s.normalize();
        save_settings(&path, &s).unwrap();

        let loaded = load_settings(&path);
        assert_eq!(loaded.default_agent, "travel");
        assert_eq!(loaded.connect_timeout_secs, 20);
        assert_eq!(loaded.agents, s.agents);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let s = load_settings(Path::new("/nonexistent/vocall/settings.json"));
        assert_eq!(s.default_agent, "job");
        assert_eq!(s.block_size, 4_096);
    }
}
