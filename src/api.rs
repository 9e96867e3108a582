use std::time::Duration;

/// Body of a quiet-mode response for a successful command.
pub const OK_BODY: &str = "OK";
/// Body of a quiet-mode response for any failure.
pub const ERR_BODY: &str = "ERR";
/// Body of the response sent to callers outside the allowlist.
pub const NO_ACCESS_BODY: &str = "NOACCESS";
/// Body of the response for methods other than `GET`/`POST`.
pub const METHOD_NOT_ALLOWED_BODY: &str = "Method Not Allowed";
/// Body of the response for unmapped paths.
pub const NOT_FOUND_BODY: &str = "Not Found";

/// Name under which a `POST` body is offered for substitution.
pub const BODY_PARAM: &str = "$body";

/// Path of the liveness endpoint.
pub const METRICS_PATH: &str = "/metrics";
/// Fixed liveness gauge in the Prometheus text exposition format.
pub const METRICS_BODY: &str = "# TYPE isupdummy counter\nisupdummy 1\n";

/// Path served by a single static command.
pub const STATIC_COMMAND_PATH: &str = "/do";

/// Everything known about one finished (or failed) command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub status: RunStatus,
    /// Captured standard output. Holds stdout followed by stderr when
    /// output is combined.
    pub stdout: String,
    /// Captured standard error. Empty when output is combined.
    pub stderr: String,
    pub time_taken: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// The shell ran to completion.
    Completed {
        /// Exit code of the shell or -1001 if terminated by a signal
        exit_code: i32,
    },
    /// The shell could not be spawned or was killed before it finished.
    Failure { reason: String },
}

impl ExecutionOutcome {
    /// Only a zero exit code counts as success.
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Completed { exit_code: 0 })
    }
}
