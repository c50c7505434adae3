//! Failure taxonomy for remote calls.

use thiserror::Error;

/// Why the breaker was opened for the rest of the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableReason {
    MissingCredential,
    PermissionDenied { status: u16 },
    /// Remote reading switched off by configuration.
    Configured,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VisionError {
    #[error("no API key configured for the vision service")]
    MissingCredential,
    #[error("vision service rejected the credential (HTTP {status})")]
    PermissionDenied { status: u16 },
    #[error("vision service rate limited; cooling down for {cooldown_secs}s")]
    RateLimited { cooldown_secs: u64 },
    #[error("vision service cooling down, {remaining_secs}s remaining")]
    Cooldown { remaining_secs: u64 },
    #[error("vision service disabled for this session")]
    Disabled,
    #[error("vision request failed: {message}")]
    Transient { message: String },
}

impl VisionError {
    /// Errors that will keep recurring until the process is reconfigured.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential | Self::PermissionDenied { .. } | Self::Disabled
        )
    }

    /// Seconds until a retry could succeed, for time-bounded failures.
    #[must_use]
    pub const fn retry_in_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { cooldown_secs } => Some(*cooldown_secs),
            Self::Cooldown { remaining_secs } => Some(*remaining_secs),
            _ => None,
        }
    }
}

impl From<DisableReason> for VisionError {
    fn from(reason: DisableReason) -> Self {
        match reason {
            DisableReason::MissingCredential => Self::MissingCredential,
            DisableReason::PermissionDenied { status } => Self::PermissionDenied { status },
            DisableReason::Configured => Self::Disabled,
        }
    }
}
