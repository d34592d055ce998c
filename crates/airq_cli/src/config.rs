//! Optional TOML overlay for [`ClientConfig`].
//!
//! Every field is optional; whatever is present replaces the built-in default.
//! Command-line flags are applied on top of the file afterwards.
use std::fs;
use std::path::Path;
use std::time::Duration;

use airq_engine::{ClientConfig, TransportMode};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportSetting {
    Stream,
    Poll,
}

impl From<TransportSetting> for TransportMode {
    fn from(setting: TransportSetting) -> Self {
        match setting {
            TransportSetting::Stream => TransportMode::Stream,
            TransportSetting::Poll => TransportMode::Poll,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointOverrides {
    pub upload: Option<String>,
    pub basic: Option<String>,
    pub advanced_stream: Option<String>,
    pub advanced_start: Option<String>,
    pub advanced_status: Option<String>,
    pub data: Option<String>,
    pub data_info: Option<String>,
    pub outliers: Option<String>,
    pub forecast: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub transport: Option<TransportSetting>,
    pub pollutants: Option<Vec<String>>,
    pub accepted_extensions: Option<Vec<String>>,
    pub poll_interval_ms: Option<u64>,
    pub poll_step: Option<u8>,
    pub poll_ceiling: Option<u8>,
    pub stall_timeout_secs: Option<u64>,
    pub basic_timeout_secs: Option<u64>,
    pub display_delay_ms: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub endpoints: EndpointOverrides,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    pub fn apply(self, config: &mut ClientConfig) {
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(transport) = self.transport {
            config.transport_mode = transport.into();
        }
        if let Some(pollutants) = self.pollutants {
            config.pollutants = pollutants
                .into_iter()
                .map(|p| p.trim().to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect();
        }
        if let Some(extensions) = self.accepted_extensions {
            config.accepted_extensions = extensions;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(step) = self.poll_step {
            config.poll_step = step;
        }
        if let Some(ceiling) = self.poll_ceiling {
            config.poll_ceiling = ceiling;
        }
        if let Some(secs) = self.stall_timeout_secs {
            config.stall_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.basic_timeout_secs {
            config.basic_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.display_delay_ms {
            config.display_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }

        let paths = &mut config.paths;
        let overrides = self.endpoints;
        for (slot, value) in [
            (&mut paths.upload, overrides.upload),
            (&mut paths.basic, overrides.basic),
            (&mut paths.advanced_stream, overrides.advanced_stream),
            (&mut paths.advanced_start, overrides.advanced_start),
            (&mut paths.advanced_status, overrides.advanced_status),
            (&mut paths.data, overrides.data),
            (&mut paths.data_info, overrides.data_info),
            (&mut paths.outliers, overrides.outliers),
            (&mut paths.forecast, overrides.forecast),
        ] {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}
