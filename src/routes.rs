//! The immutable path → command template table.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::api::STATIC_COMMAND_PATH;
use crate::error::ConfigError;

/// How to treat CSV rows that lack a path or a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowPolicy {
    /// Log a warning and ignore the row.
    #[default]
    Skip,
    /// Refuse to load the table.
    Strict,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, String>,
}

impl RouteTable {
    /// A table holding one command, served under `/do`.
    pub fn single(command: impl Into<String>) -> Self {
        let mut routes = HashMap::new();
        routes.insert(String::from(STATIC_COMMAND_PATH), command.into());
        Self { routes }
    }

    /// Reads `path,command` rows from a CSV file.
    pub fn from_csv_file(path: impl AsRef<Path>, policy: RowPolicy) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv(file, policy)
    }

    /// Reads `path,command` rows without a header line.
    ///
    /// Quoted commands may span several lines. Later rows win on duplicate paths.
    pub fn from_csv(reader: impl Read, policy: RowPolicy) -> Result<Self, ConfigError> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut routes = HashMap::new();
        for (index, record) in csv.records().enumerate() {
            let record = record?;
            let row = index + 1;
            let path = record.get(0).unwrap_or_default();
            let command = record.get(1).unwrap_or_default();

            let missing = if path.is_empty() {
                Some("path")
            } else if command.is_empty() {
                Some("command")
            } else {
                None
            };
            if let Some(field) = missing {
                if policy == RowPolicy::Strict {
                    return Err(ConfigError::MalformedRoute { row, field });
                }
                log::warn!(row, field; "skipping route row");
                continue;
            }

            if let Some(previous) = routes.insert(path.to_owned(), command.to_owned()) {
                log::warn!(row, path, previous:debug; "route defined twice, keeping the later one");
            }
        }
        Ok(Self { routes })
    }

    /// The command template mapped to `path`, if any.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.routes.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}
