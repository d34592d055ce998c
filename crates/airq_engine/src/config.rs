use std::time::Duration;

use url::Url;

/// Local development backend.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api/v1";

/// Pollutant series the backend trains, in display order.
pub const DEFAULT_POLLUTANTS: [&str; 7] = ["pm10", "pm25", "so2", "co", "o3", "no2", "hc"];

/// How the advanced job delivers progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// One long-lived server-sent event stream.
    #[default]
    Stream,
    /// Interval polling of a status endpoint; progress is partly estimated.
    Poll,
}

/// Endpoint paths relative to [`ClientConfig::base_url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPaths {
    pub upload: String,
    pub basic: String,
    pub advanced_stream: String,
    pub advanced_start: String,
    pub advanced_status: String,
    pub data: String,
    pub data_info: String,
    pub outliers: String,
    /// Prefix for `{forecast}/{pollutant}` and `{forecast}/{pollutant}/advanced`.
    pub forecast: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            upload: "/upload-csv".to_string(),
            basic: "/model/process-basic".to_string(),
            advanced_stream: "/model/process-advanced".to_string(),
            advanced_start: "/model/process-advanced/start".to_string(),
            advanced_status: "/model/process-advanced/status".to_string(),
            data: "/data".to_string(),
            data_info: "/data/info".to_string(),
            outliers: "/data/outliers".to_string(),
            forecast: "/forecast".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub transport_mode: TransportMode,
    pub paths: EndpointPaths,
    pub pollutants: Vec<String>,
    pub accepted_extensions: Vec<String>,
    pub poll_interval: Duration,
    /// Increment applied to the estimated percent on every poll tick.
    pub poll_step: u8,
    /// The estimate never passes this value; only a terminal status reaches 100.
    pub poll_ceiling: u8,
    /// A running advanced job with no transport activity for this long fails as stalled.
    pub stall_timeout: Duration,
    /// Longest wait for the basic job's single reply before it fails as stalled.
    pub basic_timeout: Duration,
    /// How long a terminal state stays visible before the client returns to idle.
    pub display_delay: Duration,
    pub connect_timeout: Duration,
    /// Applies to request/response calls, never to the event stream.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            transport_mode: TransportMode::Stream,
            paths: EndpointPaths::default(),
            pollutants: DEFAULT_POLLUTANTS.iter().map(|p| p.to_string()).collect(),
            accepted_extensions: vec!["csv".to_string()],
            poll_interval: Duration::from_millis(150),
            poll_step: 10,
            poll_ceiling: 90,
            stall_timeout: Duration::from_secs(120),
            basic_timeout: Duration::from_secs(600),
            display_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Joins `path` onto the base url, keeping any path prefix the base carries.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn forecast_endpoint(&self, pollutant: &str, advanced: bool) -> String {
        let base = self.endpoint(&format!(
            "{}/{}",
            self.paths.forecast.trim_end_matches('/'),
            pollutant
        ));
        if advanced {
            format!("{base}/advanced")
        } else {
            base
        }
    }

    /// Checks that the base url is an absolute http(s) url and that the
    /// polling and watchdog settings are usable.
    pub fn validate(&self) -> Result<(), String> {
        let parsed = Url::parse(&self.base_url)
            .map_err(|err| format!("invalid base url `{}`: {err}", self.base_url))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(format!("unsupported url scheme `{other}`")),
        }
        if self.poll_step == 0 {
            return Err("poll_step must be greater than zero".to_string());
        }
        if self.poll_ceiling > 99 {
            return Err("poll_ceiling must stay below 100".to_string());
        }
        for (name, value) in [
            ("poll_interval", self.poll_interval),
            ("stall_timeout", self.stall_timeout),
            ("basic_timeout", self.basic_timeout),
        ] {
            if value.is_zero() {
                return Err(format!("{name} must be greater than zero"));
            }
        }
        Ok(())
    }
}
