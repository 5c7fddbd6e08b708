use reqwest::StatusCode;
use thiserror::Error;

/// Failure talking to the issue tracker.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error("Invalid project key '{0}'")]
    InvalidProjectKey(String),

    #[error("Unexpected response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// HTTP status reported by the tracker, if the request got that far.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Http(e) => e.status(),
            FetchError::Decode { .. } | FetchError::InvalidProjectKey(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(StatusCode::TOO_MANY_REQUESTS)
    }

    /// The tracker could not be reached or failed on its side.
    pub fn is_upstream_unavailable(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_connect() || e.is_timeout(),
            FetchError::Status { status, .. } => status.is_server_error(),
            FetchError::Decode { .. } | FetchError::InvalidProjectKey(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let not_found = FetchError::Status {
            url: "http://jira/rest/api/2/issue/X-1".to_string(),
            status: StatusCode::NOT_FOUND,
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_rate_limited());
        assert!(!not_found.is_upstream_unavailable());

        let throttled = FetchError::Status {
            url: "http://jira/rest/api/2/search".to_string(),
            status: StatusCode::TOO_MANY_REQUESTS,
        };
        assert!(throttled.is_rate_limited());

        let broken = FetchError::Status {
            url: "http://jira/rest/api/2/search".to_string(),
            status: StatusCode::BAD_GATEWAY,
        };
        assert!(broken.is_upstream_unavailable());
        assert_eq!(
            broken.to_string(),
            "http://jira/rest/api/2/search returned 502 Bad Gateway"
        );
    }
}
