use chrono::{DateTime, Utc};
use live_platforms::{DetectionResult, ErrorKind};

/// Why a poll could not tell live from offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownReason {
    Timeout,
    Detect(ErrorKind),
    /// No detector is configured for the binding's platform.
    NoDetector,
}

impl UnknownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Detect(kind) => kind.as_str(),
            Self::NoDetector => "no_detector",
        }
    }
}

/// Result of one poll, as fed to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Detected(DetectionResult),
    Unknown {
        reason: UnknownReason,
        observed_at: DateTime<Utc>,
    },
}

impl PollOutcome {
    pub fn unknown(reason: UnknownReason) -> Self {
        Self::Unknown {
            reason,
            observed_at: Utc::now(),
        }
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        match self {
            Self::Detected(result) => result.fetched_at,
            Self::Unknown { observed_at, .. } => *observed_at,
        }
    }
}
