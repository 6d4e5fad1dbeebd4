use std::fmt;

/// Errors produced while resolving flags, talking to the remote, or
/// driving a batch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed flag, bad CSV, unknown column, missing required flag
    #[error("{0}")]
    Argument(String),
    /// Missing or unreadable config / credentials
    #[error("config: {0}")]
    Config(String),
    /// Token acquisition failed
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The remote answered with a non-success status
    #[error("{status}: {message}")]
    Remote {
        status: u16,
        reason: Option<String>,
        message: String,
    },
    /// A structured value could not be turned into a request field
    #[error("--{flag} {value:?}: {message}")]
    Composer {
        flag: String,
        value: String,
        message: String,
    },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    /// A spawned worker panicked or was aborted
    #[error("task failed: {0}")]
    Task(String),
    /// Interrupted before the call completed
    #[error("interrupted")]
    Cancelled,
}

/// Remote reasons that mean "slow down" even though they come back as 403
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

impl Error {
    pub fn argument(msg: impl fmt::Display) -> Self {
        Self::Argument(msg.to_string())
    }

    pub fn config(msg: impl fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    pub fn composer(flag: &str, value: &str, msg: impl fmt::Display) -> Self {
        Self::Composer {
            flag: flag.to_owned(),
            value: value.to_owned(),
            message: msg.to_string(),
        }
    }

    /// Whether a retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => {
                err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
            }
            Self::Remote { status, reason, .. } => match status {
                429 | 500 | 502 | 503 | 504 => true,
                403 => reason
                    .as_deref()
                    .map_or(false, |r| RATE_LIMIT_REASONS.contains(&r)),
                _ => false,
            },
            _ => false,
        }
    }

    /// Builds a [`Error::Remote`] from a status code and the raw error body
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        #[derive(serde::Deserialize)]
        struct Detail {
            reason: Option<String>,
        }

        #[derive(serde::Deserialize)]
        struct Inner {
            message: Option<String>,
            #[serde(default)]
            errors: Vec<Detail>,
            status: Option<String>,
        }

        #[derive(serde::Deserialize)]
        struct Envelope {
            error: Inner,
        }

        match serde_json::from_slice::<Envelope>(body) {
            Ok(env) => {
                let reason = env
                    .error
                    .errors
                    .into_iter()
                    .find_map(|d| d.reason)
                    .or(env.error.status);
                Self::Remote {
                    status,
                    reason,
                    message: env
                        .error
                        .message
                        .unwrap_or_else(|| format!("HTTP status {status}")),
                }
            }
            Err(_) => Self::Remote {
                status,
                reason: None,
                message: match std::str::from_utf8(body) {
                    Ok(s) if !s.trim().is_empty() => s.trim().to_owned(),
                    _ => format!("HTTP status {status}"),
                },
            },
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: u16, reason: Option<&str>) -> Error {
        Error::Remote {
            status,
            reason: reason.map(str::to_owned),
            message: String::new(),
        }
    }

    #[test]
    fn retryable_statuses() {
        for status in [429, 500, 502, 503, 504] {
            assert!(remote(status, None).is_retryable(), "{status}");
        }

        for status in [400, 401, 404, 409, 412] {
            assert!(!remote(status, None).is_retryable(), "{status}");
        }
    }

    #[test]
    fn forbidden_is_retryable_only_for_rate_limits() {
        assert!(remote(403, Some("userRateLimitExceeded")).is_retryable());
        assert!(remote(403, Some("rateLimitExceeded")).is_retryable());
        assert!(!remote(403, Some("forbidden")).is_retryable());
        assert!(!remote(403, None).is_retryable());
    }

    #[test]
    fn local_errors_are_terminal() {
        assert!(!Error::argument("bad").is_retryable());
        assert!(!Error::composer("x", "y", "z").is_retryable());
        assert!(!Error::config("missing").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn decodes_google_error_envelope() {
        let body = br#"{"error":{"code":403,"message":"Quota hit","errors":[{"reason":"userRateLimitExceeded"}]}}"#;
        match Error::from_response(403, body) {
            Error::Remote {
                status,
                reason,
                message,
            } => {
                assert_eq!(status, 403);
                assert_eq!(reason.as_deref(), Some("userRateLimitExceeded"));
                assert_eq!(message, "Quota hit");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_plain_body() {
        let err = Error::from_response(502, b"bad gateway");
        assert_eq!(err.to_string(), "502: bad gateway");

        let err = Error::from_response(500, b"");
        assert_eq!(err.to_string(), "500: HTTP status 500");
    }
}
