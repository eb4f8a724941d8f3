use thiserror::Error;

use crate::classify::{classify_failure, FailureKind};

/// Result type alias for NetFast operations
pub type Result<T> = std::result::Result<T, FilterError>;

/// Message shown whenever an operation needs administrator rights.
const ELEVATION_HINT: &str = "NetFast needs administrator rights to change DNS settings. \
     Please re-run it as administrator (Windows) or with sudo (macOS/Linux).";

/// Message shown for every other failure.
const GENERIC_HINT: &str = "Something went wrong while updating your protection. \
     Please try again, or contact support if the problem continues.";

/// Errors that can occur while enforcing or verifying a DNS filter
#[derive(Error, Debug)]
pub enum FilterError {
    /// The current operating system has no implementation path
    #[error("unsupported platform: {platform}")]
    Unsupported {
        /// Name of the platform that was detected
        platform: String,
    },

    /// The command failed because it needs elevated privileges
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The command ran but reported a failure
    #[error("command failed: {0}")]
    ExecutionFailed(String),

    /// The requested filter profile is not in the built-in table
    #[error("unknown filter profile: {0}")]
    UnknownProfile(String),

    /// Persisted filter state could not be read or written
    #[error("state error: {0}")]
    State(String),

    /// Configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Delivery to the accountability collaborator failed
    #[error("notification failed: {0}")]
    Notify(String),

    /// The protection session has already ended
    #[error("protection session has ended")]
    Terminated,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FilterError {
    /// Build the error for a command that exited unsuccessfully.
    ///
    /// `output` is whatever the command printed (stderr first, then stdout).
    pub fn from_command_output(command: &str, output: &str) -> Self {
        let detail = output.trim();
        let message = if detail.is_empty() {
            format!("`{command}` exited unsuccessfully")
        } else {
            format!("`{command}`: {detail}")
        };

        match classify_failure(detail) {
            FailureKind::PermissionDenied => Self::PermissionDenied(message),
            FailureKind::NotFound | FailureKind::Other => Self::ExecutionFailed(message),
        }
    }

    /// Returns true if re-running with elevated privileges could fix this error
    #[must_use]
    pub const fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// Returns true if the operation has no implementation on this platform
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// User-facing text for this error.
    ///
    /// Permission failures get the specific re-run advice; everything else
    /// gets the generic retry message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied(_) => ELEVATION_HINT.to_string(),
            Self::Unsupported { platform } => {
                format!("NetFast cannot manage DNS settings on {platform} yet.")
            }
            Self::UnknownProfile(name) => format!("\"{name}\" is not a known filter provider."),
            _ => GENERIC_HINT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_classified_as_permission() {
        let err = FilterError::from_command_output(
            "netsh interface ipv4 set dnsservers",
            "The requested operation requires elevation (Run as administrator).",
        );
        assert!(err.is_permission_error());
        assert!(err.user_message().contains("re-run it as administrator"));
    }

    #[test]
    fn test_command_output_classified_as_failure() {
        let err = FilterError::from_command_output("resolvectl dns eth0", "Unknown link eth9");
        assert!(matches!(err, FilterError::ExecutionFailed(_)));
        assert!(err.to_string().contains("Unknown link eth9"));
        assert!(err.user_message().contains("try again"));
    }

    #[test]
    fn test_empty_output_still_names_command() {
        let err = FilterError::from_command_output("ipconfig /flushdns", "  ");
        assert_eq!(
            err.to_string(),
            "command failed: `ipconfig /flushdns` exited unsuccessfully"
        );
    }

    #[test]
    fn test_unsupported_message() {
        let err = FilterError::Unsupported {
            platform: "freebsd".into(),
        };
        assert!(err.is_unsupported());
        assert!(err.user_message().contains("freebsd"));
    }
}
