use airq_core::{DatasetInfo, ForecastAvailability, ServerSnapshot};
use futures_util::future::try_join_all;
use serde::Deserialize;
use serde_json::Value;

use crate::{ClientConfig, ReconcileError};

/// Fetches the authoritative server state after a terminal transition.
#[async_trait::async_trait]
pub trait Reconciler: Send + Sync {
    async fn refresh(&self) -> Result<ServerSnapshot, ReconcileError>;
}

#[derive(Debug, Clone)]
pub struct HttpReconciler {
    client: reqwest::Client,
    data_url: String,
    info_url: String,
    outliers_url: String,
    /// `(basic, advanced)` availability urls per pollutant.
    forecast_urls: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoWire {
    #[serde(default)]
    total_data: u64,
    #[serde(default)]
    outlier_clear: bool,
    #[serde(default)]
    nan_clear: bool,
    #[serde(default)]
    outlier_count: Option<u64>,
    #[serde(default)]
    nan_count: Option<u64>,
}

impl From<InfoWire> for DatasetInfo {
    fn from(wire: InfoWire) -> Self {
        Self {
            total_data: wire.total_data,
            outlier_clear: wire.outlier_clear,
            nan_clear: wire.nan_clear,
            outlier_count: wire.outlier_count,
            nan_count: wire.nan_count,
        }
    }
}

impl HttpReconciler {
    pub fn new(config: &ClientConfig) -> Result<Self, ReconcileError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ReconcileError::new(config.base_url.clone(), err.to_string()))?;
        let forecast_urls = config
            .pollutants
            .iter()
            .map(|pollutant| {
                (
                    config.forecast_endpoint(pollutant, false),
                    config.forecast_endpoint(pollutant, true),
                )
            })
            .collect();

        Ok(Self {
            client,
            data_url: config.endpoint(&config.paths.data),
            info_url: config.endpoint(&config.paths.data_info),
            outliers_url: config.endpoint(&config.paths.outliers),
            forecast_urls,
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value, ReconcileError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ReconcileError::new(url, err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReconcileError::new(url, format!("http status {}", status.as_u16())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ReconcileError::new(url, err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| ReconcileError::new(url, err.to_string()))
    }

    async fn dataset_rows(&self) -> Result<usize, ReconcileError> {
        let value = self.get_json(&self.data_url).await?;
        Ok(value
            .get("data")
            .and_then(Value::as_array)
            .map_or(0, Vec::len))
    }

    async fn dataset_info(&self) -> Result<DatasetInfo, ReconcileError> {
        let value = self.get_json(&self.info_url).await?;
        let wire: InfoWire = serde_json::from_value(value)
            .map_err(|err| ReconcileError::new(self.info_url.as_str(), err.to_string()))?;
        Ok(wire.into())
    }

    async fn outlier_count(&self) -> Result<usize, ReconcileError> {
        let value = self.get_json(&self.outliers_url).await?;
        Ok(value.as_array().map_or(0, Vec::len))
    }

    /// A forecast exists when the endpoint answers with a non-empty array.
    /// Missing forecasts usually come back as 404, which is not an error here.
    async fn is_available(&self, url: &str) -> Result<bool, ReconcileError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ReconcileError::new(url, err.to_string()))?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ReconcileError::new(url, err.to_string()))?;
        Ok(serde_json::from_slice::<Value>(&bytes)
            .ok()
            .and_then(|value| value.as_array().map(|rows| !rows.is_empty()))
            .unwrap_or(false))
    }

    async fn availability(&self) -> Result<ForecastAvailability, ReconcileError> {
        let basic = try_join_all(self.forecast_urls.iter().map(|(basic, _)| self.is_available(basic)));
        let advanced =
            try_join_all(self.forecast_urls.iter().map(|(_, advanced)| self.is_available(advanced)));
        let (basic, advanced) = tokio::try_join!(basic, advanced)?;
        Ok(ForecastAvailability {
            basic: basic.into_iter().any(|found| found),
            advanced: advanced.into_iter().any(|found| found),
        })
    }
}

#[async_trait::async_trait]
impl Reconciler for HttpReconciler {
    async fn refresh(&self) -> Result<ServerSnapshot, ReconcileError> {
        let (dataset_rows, info, outlier_count, availability) = tokio::try_join!(
            self.dataset_rows(),
            self.dataset_info(),
            self.outlier_count(),
            self.availability()
        )?;
        Ok(ServerSnapshot {
            dataset_rows,
            info,
            outlier_count,
            availability,
        })
    }
}
