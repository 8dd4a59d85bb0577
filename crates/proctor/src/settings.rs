//! Layered client settings
//!
//! Defaults, then an optional TOML file, then `PROCTOR__`-prefixed
//! environment variables (`PROCTOR__POLICY__WARNING__GRACE_PERIOD_MS=5000`).

use evidence::UploaderConfig;
use perception::CameraConfig;
use serde::{Deserialize, Serialize};
use session::PolicyConfig;

/// Status server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:9187".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// JSON file backing the strike ledger
    pub ledger_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            ledger_path: "proctor-ledger.json".to_string(),
        }
    }
}

/// Recorded landmark stream used in place of a live model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    pub path: Option<String>,
    pub looped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Host description fed to the system check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub user_agent: String,
    pub fullscreen: bool,
    /// Probed for the latency check; the upload URL when unset
    pub latency_probe_url: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("ExamProctor/{}", env!("CARGO_PKG_VERSION")),
            fullscreen: false,
            latency_probe_url: None,
        }
    }
}

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub policy: PolicyConfig,
    pub uploader: UploaderConfig,
    pub camera: CameraConfig,
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub replay: ReplaySettings,
    pub logging: LoggingSettings,
    pub client: ClientSettings,
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&Settings::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("PROCTOR")
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.align();
        Ok(settings)
    }

    /// The uploader posts for the course the policy monitors
    fn align(&mut self) {
        if self.uploader.course_id == 0 {
            self.uploader.course_id = self.policy.course_id;
        }
    }

    pub fn latency_probe_url(&self) -> &str {
        self.client
            .latency_probe_url
            .as_deref()
            .unwrap_or(&self.uploader.upload_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.policy.warning.grace_period_ms, 8_000);
        assert_eq!(settings.uploader.backlog_limit, 20);
        assert_eq!(settings.server.listen_addr, "127.0.0.1:9187");
        assert!(settings.replay.path.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[policy]
course_id = 17
start_in_strict_mode = true

[policy.warning]
grace_period_ms = 5000

[policy.loop]
frame_interval_ms = 200

[replay]
path = "session.jsonl"
looped = true
"#
        )
        .unwrap();

        let settings = Settings::load(file.path().to_str()).unwrap();
        assert_eq!(settings.policy.course_id, 17);
        assert!(settings.policy.start_in_strict_mode);
        assert_eq!(settings.policy.warning.grace_period_ms, 5_000);
        assert_eq!(settings.policy.warning.cooldown_ms, 15_000);
        assert_eq!(settings.policy.timing.frame_interval_ms, 200);
        assert_eq!(settings.uploader.course_id, 17);
        assert_eq!(settings.replay.path.as_deref(), Some("session.jsonl"));
    }

    #[test]
    fn test_latency_probe_falls_back_to_upload_url() {
        let mut settings = Settings::default();
        assert_eq!(settings.latency_probe_url(), settings.uploader.upload_url);
        settings.client.latency_probe_url = Some("http://probe.local/ping".to_string());
        assert_eq!(settings.latency_probe_url(), "http://probe.local/ping");
    }
}
