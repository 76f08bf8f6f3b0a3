//! Package power from the local PCM sensor server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{MetricSource, SourceScope};
use crate::core::devices::DeviceDescriptor;
use crate::core::telemetry::{MetricSample, SourceKind};
use crate::platform::supports_power_daemon;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Raw counters of one `/persecond` window. Both fields are `None` when the
/// platform cannot run the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerReading {
    pub interval_us: Option<f64>,
    pub joules_consumed: Option<f64>,
}

impl PowerReading {
    /// Average package power over the window
    pub fn watts(&self) -> Option<f64> {
        match (self.interval_us, self.joules_consumed) {
            (Some(interval), Some(joules)) if interval > 0.0 => Some(joules / (interval / 1e6)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PerSecond {
    #[serde(rename = "Interval us")]
    interval_us: Option<f64>,
    #[serde(rename = "Uncore Aggregate")]
    uncore: Option<UncoreAggregate>,
}

#[derive(Debug, Deserialize)]
struct UncoreAggregate {
    #[serde(rename = "Uncore Counters")]
    counters: Option<UncoreCounters>,
}

#[derive(Debug, Deserialize)]
struct UncoreCounters {
    #[serde(rename = "Package Joules Consumed")]
    package_joules: Option<f64>,
}

pub struct PowerSource {
    base_url: String,
    client: reqwest::Client,
    platform_supported: bool,
}

impl PowerSource {
    pub fn new(port: u16) -> Self {
        Self::with_base_url(&format!("http://localhost:{}", port))
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            platform_supported: supports_power_daemon(),
        }
    }

    /// Override platform detection (the daemon only exists on Linux)
    pub fn with_platform_support(mut self, supported: bool) -> Self {
        self.platform_supported = supported;
        self
    }

    /// Fetch one window of counters.
    ///
    /// On platforms without the daemon this returns an empty reading without
    /// touching the network. Errors are transient and carry a reason.
    pub async fn read(&self) -> Result<PowerReading, String> {
        if !self.platform_supported {
            return Ok(PowerReading::default());
        }

        let url = format!("{}/persecond", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("power daemon unreachable: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("power daemon returned HTTP {}", status));
        }

        let body: PerSecond = response
            .json()
            .await
            .map_err(|e| format!("malformed power daemon response: {}", e))?;

        Ok(PowerReading {
            interval_us: body.interval_us,
            joules_consumed: body
                .uncore
                .and_then(|u| u.counters)
                .and_then(|c| c.package_joules),
        })
    }
}

#[async_trait]
impl MetricSource for PowerSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Power
    }

    fn scope(&self) -> SourceScope {
        SourceScope::Machine
    }

    async fn sample(&self, _device: Option<&DeviceDescriptor>) -> MetricSample {
        match self.read().await {
            Ok(reading) => match reading.watts() {
                Some(watts) => MetricSample::reading(SourceKind::Power, None, watts),
                None => MetricSample::unsupported(SourceKind::Power, None),
            },
            Err(reason) => {
                log::debug!("Power sample failed: {}", reason);
                MetricSample::transient(SourceKind::Power, None, reason)
            }
        }
    }
}
