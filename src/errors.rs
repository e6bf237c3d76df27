/// Structured error types for the feed pipeline.
///
/// Errors are Clone so shared in-flight futures can hand one failure to
/// every waiter.

// =============================================================================
// MAIN ERROR TYPE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    // Network connectivity and HTTP status failures
    Network(NetworkError),

    // Malformed or inconsistent response payloads
    Data(DataError),
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::Network(e) => write!(f, "Network Error: {}", e),
            FeedError::Data(e) => write!(f, "Data Error: {}", e),
        }
    }
}

impl std::error::Error for FeedError {}

// =============================================================================
// NETWORK ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    Timeout {
        endpoint: String,
        timeout_ms: u64,
    },
    HttpStatus {
        endpoint: String,
        status: u16,
        body: Option<String>,
    },
    Transport {
        endpoint: String,
        message: String,
    },
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkError::Timeout { endpoint, timeout_ms } => {
                write!(f, "Request to {} timed out after {}ms", endpoint, timeout_ms)
            }
            NetworkError::HttpStatus { endpoint, status, body } => {
                match body {
                    Some(b) => write!(f, "HTTP {} from {}: {}", status, endpoint, b),
                    None => write!(f, "HTTP {} from {}", status, endpoint),
                }
            }
            NetworkError::Transport { endpoint, message } => {
                write!(f, "Transport failure for {}: {}", endpoint, message)
            }
        }
    }
}

// =============================================================================
// DATA ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    ParseFailed {
        context: String,
        message: String,
    },
    MissingField {
        context: String,
        field: String,
    },
    GraphqlErrors {
        messages: Vec<String>,
    },
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::ParseFailed { context, message } => {
                write!(f, "Failed to parse {}: {}", context, message)
            }
            DataError::MissingField { context, field } => {
                write!(f, "Missing field '{}' in {}", field, context)
            }
            DataError::GraphqlErrors { messages } => {
                write!(f, "GraphQL errors: {}", messages.join("; "))
            }
        }
    }
}

// =============================================================================
// CONVENIENCE CONSTRUCTORS
// =============================================================================

impl FeedError {
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        FeedError::Network(NetworkError::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
        })
    }

    pub fn http_status(endpoint: impl Into<String>, status: u16, body: Option<String>) -> Self {
        FeedError::Network(NetworkError::HttpStatus {
            endpoint: endpoint.into(),
            status,
            body,
        })
    }

    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        FeedError::Data(DataError::ParseFailed {
            context: context.into(),
            message: message.into(),
        })
    }

    /// HTTP statuses worth one retry: rate limit and transient gateway
    /// failures.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FeedError::Network(NetworkError::HttpStatus { status: 429 | 502 | 503, .. })
                | FeedError::Network(NetworkError::Timeout { .. })
        )
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
