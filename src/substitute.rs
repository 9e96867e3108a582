//! Validation and splicing of caller supplied values into command templates.
//!
//! Only parameters whose name starts with `$` are considered, and their value
//! has to fully match the configured pattern. The splice is a single pass
//! over the template in which the longest matching token wins, so the
//! result never depends on the order parameters arrived in and substituted
//! text is never scanned for further tokens.

use std::collections::BTreeMap;

use crate::config::{RejectPolicy, SubstitutionConfig};
use crate::error::SubstitutionError;

/// Candidate parameters of one request, each name with all of its values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, Vec<String>>,
}

impl Params {
    /// Parses a raw (still percent-encoded) query string.
    pub fn from_query(query: &str) -> Result<Self, serde_urlencoded::de::Error> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)?;
        let mut params = Self::default();
        for (name, value) in pairs {
            params.push(name, value);
        }
        Ok(params)
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.entry(name.into()).or_default().push(value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// Validates `params` and splices the accepted ones into `template`.
///
/// With substitution disabled the template is returned verbatim.
pub fn substitute(
    template: &str,
    params: &Params,
    config: &SubstitutionConfig,
) -> Result<String, SubstitutionError> {
    if !config.enabled || params.is_empty() {
        return Ok(template.to_owned());
    }

    let mut accepted = Vec::with_capacity(params.len());
    for (name, values) in &params.values {
        match validate(name, values, config) {
            Ok(value) => accepted.push((name.as_str(), value)),
            Err(e) => match config.on_reject {
                RejectPolicy::Abort => return Err(e),
                RejectPolicy::Skip => {
                    log::warn!(error:display = e; "skipping parameter");
                }
            },
        }
    }

    // Longest first, so `$parm10` is not read as `$parm1` followed by `0`.
    accepted.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
    Ok(splice(template, &accepted))
}

fn validate<'a>(
    name: &str,
    values: &'a [String],
    config: &SubstitutionConfig,
) -> Result<&'a str, SubstitutionError> {
    let [value] = values else {
        return Err(SubstitutionError::MultipleValues {
            name: name.to_owned(),
            count: values.len(),
        });
    };
    // A lone `$` would match every dollar sign in the template.
    if !name.starts_with('$') || name.len() == 1 {
        return Err(SubstitutionError::MissingDollar {
            name: name.to_owned(),
        });
    }
    if !config.allow.is_match(value) {
        return Err(SubstitutionError::RegexMismatch {
            name: name.to_owned(),
        });
    }
    Ok(value.as_str())
}

/// `tokens` must be sorted by descending name length.
fn splice(template: &str, tokens: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some((name, value)) = tokens.iter().find(|(name, _)| tail.starts_with(name)) {
            out.push_str(value);
            rest = &tail[name.len()..];
        } else {
            out.push('$');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}
