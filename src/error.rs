use thiserror::Error;

/// Fatal problems found while resolving the configuration or loading routes.
///
/// None of these can happen once the server is listening.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid parameter regex `{pattern}`: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("either a static command or a route file must be given")]
    MissingCommandSource,
    #[error("failed to read route file: {0}")]
    RouteFile(#[from] std::io::Error),
    #[error("failed to parse route file: {0}")]
    RouteCsv(#[from] csv::Error),
    #[error("route row {row} is missing its {field}")]
    MalformedRoute { row: usize, field: &'static str },
}

/// Reasons a single parameter is refused for substitution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubstitutionError {
    #[error("parameter `{name}` must be given exactly once, got {count} values")]
    MultipleValues { name: String, count: usize },
    #[error("parameter `{name}` does not start with `$`")]
    MissingDollar { name: String },
    #[error("value of parameter `{name}` does not match the allowed pattern")]
    RegexMismatch { name: String },
}

/// Per-request failures. Every variant is recovered into a response.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("address not in allowlist")]
    AccessDenied,
    #[error("no route for path")]
    NotFound,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error(transparent)]
    Validation(#[from] SubstitutionError),
    #[error("internal fault: {0}")]
    Fault(String),
}
