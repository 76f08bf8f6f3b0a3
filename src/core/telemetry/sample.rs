use serde::{Deserialize, Serialize};
use std::fmt;

/// The telemetry providers the dashboard charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Cpu,
    Memory,
    GpuCompute,
    GpuMemory,
    Npu,
    Power,
}

impl SourceKind {
    pub const ALL: [SourceKind; 6] = [
        SourceKind::Cpu,
        SourceKind::Memory,
        SourceKind::GpuCompute,
        SourceKind::GpuMemory,
        SourceKind::Npu,
        SourceKind::Power,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Cpu => "cpu",
            SourceKind::Memory => "memory",
            SourceKind::GpuCompute => "gpu-compute",
            SourceKind::GpuMemory => "gpu-memory",
            SourceKind::Npu => "npu",
            SourceKind::Power => "power",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleErrorKind {
    /// Timeout, refused connection, malformed output: retried on the next tick
    Transient,
    /// Input rejected before reaching the OS: never retried
    Validation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleError {
    pub kind: SampleErrorKind,
    pub reason: String,
}

/// Outcome of one polling attempt against one source for one device
/// (or for the whole machine when `device_id` is `None`).
///
/// Fields are private so a sample carrying a value can never also carry an
/// error. A sample with neither is a terminal "not supported".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    source: SourceKind,
    device_id: Option<String>,
    value: Option<f64>,
    error: Option<SampleError>,
    /// Unix timestamp in milliseconds
    timestamp: i64,
}

impl MetricSample {
    fn new(
        source: SourceKind,
        device_id: Option<&str>,
        value: Option<f64>,
        error: Option<SampleError>,
    ) -> Self {
        Self {
            source,
            device_id: device_id.map(str::to_string),
            value,
            error,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// A successful reading. Non-finite values are a capability gap, not a fault.
    pub fn reading(source: SourceKind, device_id: Option<&str>, value: f64) -> Self {
        if value.is_finite() {
            Self::new(source, device_id, Some(value), None)
        } else {
            Self::unsupported(source, device_id)
        }
    }

    /// Terminal null: the metric does not exist on this device.
    pub fn unsupported(source: SourceKind, device_id: Option<&str>) -> Self {
        Self::new(source, device_id, None, None)
    }

    pub fn transient<S: Into<String>>(source: SourceKind, device_id: Option<&str>, reason: S) -> Self {
        Self::new(
            source,
            device_id,
            None,
            Some(SampleError {
                kind: SampleErrorKind::Transient,
                reason: reason.into(),
            }),
        )
    }

    /// Terminal error for input that failed validation (e.g. a malformed bus address).
    pub fn rejected<S: Into<String>>(source: SourceKind, device_id: Option<&str>, reason: S) -> Self {
        Self::new(
            source,
            device_id,
            None,
            Some(SampleError {
                kind: SampleErrorKind::Validation,
                reason: reason.into(),
            }),
        )
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn error(&self) -> Option<&SampleError> {
        self.error.as_ref()
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn is_transient_error(&self) -> bool {
        matches!(
            self.error,
            Some(SampleError {
                kind: SampleErrorKind::Transient,
                ..
            })
        )
    }

    pub fn is_unsupported(&self) -> bool {
        self.value.is_none() && self.error.is_none()
    }

    /// Key the aggregator merges under; machine-wide samples share the empty key
    pub(crate) fn device_key(&self) -> String {
        self.device_id.clone().unwrap_or_default()
    }
}
