//! Loading and evaluating the `{ field-path -> constraint }` matching rules
//! used by the dnsmessage collector's include/exclude lists and by the
//! filtering transformer's external fqdn/domain sources (spec.md §4.A, §6).

use serde::Deserialize;
use std::io::BufRead;

use crate::error::{DcError, DcResult};

/// A single constraint evaluated against one field of a `DNSMessage`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MatchConstraint {
    /// Loaded lazily from `match-source`; resolved into `String` or `Regexp`
    /// once `load()` runs.
    Source {
        #[serde(rename = "match-source")]
        match_source: String,
        #[serde(rename = "source-kind", default)]
        source_kind: SourceKind,
    },
    /// Literal equality against the stringified field value.
    String(String),
    /// Regex match against the stringified field value.
    Regexp { regex: String },
    /// Numeric comparison (`eq`, `gt`, `lt`) against the field parsed as f64.
    Numeric {
        #[serde(rename = "numeric")]
        op: NumericOp,
        value: f64,
    },
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    #[default]
    String,
    Regexp,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericOp {
    Eq,
    Gt,
    Lt,
}

/// A whole rule set: a map of field path to constraint, all of which must
/// match for the rule set to match (AND semantics across fields).
pub type MatchRule = std::collections::BTreeMap<String, MatchConstraint>;

fn is_file_source(src: &str) -> bool {
    src.starts_with("file://")
}

fn is_url_source(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://")
}

/// Resolved form of a `match-source`: either a literal string set or a
/// compiled regex set, per `source-kind`.
pub enum LoadedSource {
    Strings(Vec<String>),
    Regexes(Vec<regex::Regex>),
}

pub fn load_match_source(match_source: &str, kind: SourceKind) -> DcResult<LoadedSource> {
    let lines = if is_file_source(match_source) {
        load_from_file(match_source)?
    } else if is_url_source(match_source) {
        load_from_url(match_source)?
    } else {
        return Err(DcError::config(format!(
            "match source not supported: {match_source}"
        )));
    };

    match kind {
        SourceKind::String => Ok(LoadedSource::Strings(lines)),
        SourceKind::Regexp => {
            let mut regexes = Vec::with_capacity(lines.len());
            for line in lines {
                regexes.push(regex::Regex::new(&line)?);
            }
            Ok(LoadedSource::Regexes(regexes))
        }
    }
}

fn load_from_file(match_source: &str) -> DcResult<Vec<String>> {
    let path = match_source.trim_start_matches("file://");
    let file = std::fs::File::open(path)
        .map_err(|e| DcError::config(format!("unable to open match source {path}: {e}")))?;
    let reader = std::io::BufReader::new(file);
    Ok(reader.lines().map_while(Result::ok).collect())
}

fn load_from_url(match_source: &str) -> DcResult<Vec<String>> {
    let resp = ureq::get(match_source)
        .call()
        .map_err(|e| DcError::config(format!("unable to fetch match source {match_source}: {e}")))?;
    let body = resp
        .into_string()
        .map_err(|e| DcError::config(format!("invalid match source body: {e}")))?;
    Ok(body.lines().map(str::to_owned).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_from_file_strips_empty_trailing_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ads.example.com").unwrap();
        writeln!(file, "tracker.example.com").unwrap();
        let src = format!("file://{}", file.path().display());
        let loaded = load_match_source(&src, SourceKind::String).unwrap();
        match loaded {
            LoadedSource::Strings(v) => assert_eq!(v, vec!["ads.example.com", "tracker.example.com"]),
            _ => panic!("expected strings"),
        }
    }

    #[test]
    fn unsupported_scheme_is_a_config_error() {
        let err = load_match_source("ftp://nope", SourceKind::String).unwrap_err();
        assert!(matches!(err, DcError::Config(_)));
    }
}
