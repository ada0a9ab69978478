//! Local dashboard configuration.
//!
//! Everything the dashboard needs to find its device lives in one small TOML
//! file under the user's config directory. Missing or malformed configuration
//! degrades to defaults instead of preventing startup; broker parameters
//! normally come from the device itself and the overrides here exist for
//! debugging against a different broker.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::MqttInfo;

const CONFIG_DIR: &str = ".config/cortexlink-dash";
const CONFIG_FILE: &str = "dashboard.toml";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DashboardConfig {
    /// Base URL of the device's HTTP API
    pub device_url: String,
    /// Override the broker host announced by the device
    pub broker_host: Option<String>,
    /// Override the broker port announced by the device
    pub broker_port: Option<u16>,
    /// Override or supply broker credentials
    pub mqtt_user: Option<String>,
    pub mqtt_pass: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            // Factory AP address of the board
            device_url: "http://192.168.4.1".to_string(),
            broker_host: None,
            broker_port: None,
            mqtt_user: None,
            mqtt_pass: None,
        }
    }
}

impl DashboardConfig {
    /// Loads the config file, falling back to defaults when it is missing
    /// or unreadable.
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            warn!("no home directory, using default configuration");
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                debug!("no config at {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    fn parse(content: &str) -> Self {
        match toml::from_str(content) {
            Ok(config) => config,
            Err(e) => {
                warn!("malformed dashboard config, using defaults: {e}");
                Self::default()
            }
        }
    }

    /// Writes a default config file if none exists yet.
    pub fn ensure_default_file() -> std::io::Result<()> {
        let Some(path) = config_path() else {
            return Ok(());
        };
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, content)
    }

    /// Broker address to dial: local override first, else the device's answer.
    pub fn broker_address(&self, info: &MqttInfo) -> (String, u16) {
        (
            self.broker_host
                .clone()
                .unwrap_or_else(|| info.broker_ws_host.clone()),
            self.broker_port.unwrap_or(info.broker_ws_port),
        )
    }

    /// Credentials to use, override first, else whatever the device supplied.
    pub fn credentials(&self, info: &MqttInfo) -> Option<(String, String)> {
        let user = self
            .mqtt_user
            .clone()
            .or_else(|| info.broker_ws_user.clone())?;
        let pass = self
            .mqtt_pass
            .clone()
            .or_else(|| info.broker_ws_pass.clone())
            .unwrap_or_default();
        Some((user, pass))
    }
}

fn config_path() -> Option<PathBuf> {
    let mut path = dirs::home_dir()?;
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    Some(path)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn info() -> MqttInfo {
        serde_json::from_value(serde_json::json!({
            "clientId": "a8rm-01",
            "fullBase": "cortexlink/a8rm-01",
            "brokerWsHost": "192.168.4.1",
            "brokerWsPort": 9001,
            "brokerWsUser": "dash",
            "brokerWsPass": "secret"
        }))
        .unwrap()
    }

    #[test]
    fn malformed_toml_degrades_to_defaults() {
        let config = DashboardConfig::parse("device_url = [broken");
        assert_eq!(config, DashboardConfig::default());
    }

    #[test]
    fn partial_toml_fills_remaining_defaults() {
        let config = DashboardConfig::parse(r#"device_url = "http://10.0.0.7""#);
        assert_eq!(config.device_url, "http://10.0.0.7");
        assert_eq!(config.broker_host, None);
    }

    #[test]
    fn overrides_win_over_device_answer() {
        let mut config = DashboardConfig::default();
        assert_eq!(config.broker_address(&info()), ("192.168.4.1".to_string(), 9001));

        config.broker_host = Some("10.0.0.2".into());
        config.broker_port = Some(1883);
        assert_eq!(config.broker_address(&info()), ("10.0.0.2".to_string(), 1883));
    }

    #[test]
    fn credentials_pass_through_from_device() {
        let config = DashboardConfig::default();
        assert_eq!(
            config.credentials(&info()),
            Some(("dash".to_string(), "secret".to_string()))
        );

        let mut anonymous = info();
        anonymous.broker_ws_user = None;
        assert_eq!(config.credentials(&anonymous), None);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = DashboardConfig {
            device_url: "http://10.0.0.7".into(),
            broker_host: Some("10.0.0.2".into()),
            broker_port: Some(1883),
            mqtt_user: None,
            mqtt_pass: None,
        };
        let serialized = toml::to_string_pretty(&config).unwrap();
        assert_eq!(DashboardConfig::parse(&serialized), config);
    }
}
