//! The resolved configuration consumed by the request pipeline.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;

use crate::error::ConfigError;

/// Conservative default: no shell metacharacters, no quotes, no `$`.
pub const DEFAULT_PARAM_PATTERN: &str = "^[ a-zA-Z0-9/-]*$";

/// Requests allowed per path and minute unless configured otherwise.
pub const DEFAULT_RATE_LIMIT: u32 = 10;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Addresses that may reach the command routes.
    pub allowed_addresses: Vec<String>,
    /// When `false` every address is allowed.
    pub allowlist_enabled: bool,
    /// Requests per path and window, `0` disables the limiter.
    pub rate_limit: u32,
    pub window: WindowMode,
    pub substitution: SubstitutionConfig,
    pub response: ResponseMode,
    pub output: OutputCapture,
    /// Stream `POST` bodies to the command's stdin.
    pub pipe_body: bool,
    /// Accept `POST` in addition to `GET`.
    pub accept_post: bool,
    /// Kill commands running longer than this.
    pub timeout: Option<Duration>,
    /// Upper bound of simultaneously running commands.
    pub max_concurrent: Option<NonZeroUsize>,
    /// Shell invoked as `<shell> -c <command>`.
    pub shell: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            allowed_addresses: vec![String::from("127.0.0.1")],
            allowlist_enabled: true,
            rate_limit: DEFAULT_RATE_LIMIT,
            window: WindowMode::default(),
            substitution: SubstitutionConfig::default(),
            response: ResponseMode::default(),
            output: OutputCapture::default(),
            pipe_body: false,
            accept_post: true,
            timeout: None,
            max_concurrent: None,
            shell: PathBuf::from("bash"),
        }
    }
}

impl GatewayConfig {
    /// Builds the allowlist from a comma separated list.
    ///
    /// An empty (or all blank) list disables filtering.
    #[must_use]
    pub fn with_allowed_list(mut self, list: &str) -> Self {
        self.allowed_addresses = list
            .split(',')
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(String::from)
            .collect();
        self.allowlist_enabled = !self.allowed_addresses.is_empty();
        self
    }
}

/// How the rate limiter places its 60 second windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WindowMode {
    /// Every path has its own window.
    #[default]
    PerPath,
    /// One deadline for the whole table. Crossing it only clears the
    /// counter of the path being accessed.
    Shared,
}

/// What to do with a parameter that fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RejectPolicy {
    /// Fail the whole request.
    #[default]
    Abort,
    /// Drop the parameter and keep going.
    Skip,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseMode {
    /// `OK` / `ERR` bodies.
    #[default]
    Quiet,
    /// Captured output as the body.
    Verbose,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputCapture {
    #[default]
    Separate,
    /// stdout followed by stderr in one buffer.
    Combined,
}

#[derive(Debug, Clone)]
pub struct SubstitutionConfig {
    pub enabled: bool,
    /// Every value must fully match this before it is spliced in.
    pub allow: Regex,
    pub on_reject: RejectPolicy,
}

impl SubstitutionConfig {
    /// Compiles `pattern` anchored on both ends, so only full matches pass.
    pub fn new(enabled: bool, pattern: &str, on_reject: RejectPolicy) -> Result<Self, ConfigError> {
        let allow = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
            ConfigError::InvalidRegex {
                pattern: pattern.to_owned(),
                source,
            }
        })?;
        Ok(Self {
            enabled,
            allow,
            on_reject,
        })
    }
}

impl Default for SubstitutionConfig {
    fn default() -> Self {
        Self::new(false, DEFAULT_PARAM_PATTERN, RejectPolicy::Abort)
            .expect("default parameter pattern compiles")
    }
}
