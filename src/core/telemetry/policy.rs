use std::time::Duration;

use super::SourceKind;

/// Polling cadence and retry budget for one metric source.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Fixed tick cadence
    pub interval: Duration,
    /// Upper bound on a single sample call (process and HTTP backed sources)
    pub timeout: Option<Duration>,
    /// Extra attempts within one tick for samples that failed transiently
    pub retry_limit: u32,
    /// Delay before the first retry; doubles on each further attempt
    pub retry_delay: Duration,
}

const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_RETRY_LIMIT: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
const EXTERNAL_CALL_TIMEOUT: Duration = Duration::from_secs(4);

impl PollPolicy {
    pub fn for_source(kind: SourceKind) -> Self {
        let timeout = match kind {
            SourceKind::Cpu | SourceKind::Memory | SourceKind::Npu => None,
            SourceKind::GpuCompute | SourceKind::GpuMemory | SourceKind::Power => {
                Some(EXTERNAL_CALL_TIMEOUT)
            }
        };

        Self {
            interval: DEFAULT_INTERVAL,
            timeout,
            retry_limit: DEFAULT_RETRY_LIMIT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Backoff before retry number `attempt` (1-based), capped at one interval
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.retry_delay
            .saturating_mul(factor)
            .min(self.interval)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::for_source(SourceKind::Cpu)
    }
}
