//! Label resolution.
//!
//! A label addresses either a rule instance or a plain file in the build tree. Accepted forms:
//!
//! - bare names and relative paths (`hello`, `./hello`, `../go/hello`), joined onto the
//!   directory of the build file that mentions them
//! - absolute paths (`/opt/tools/cc`)
//! - scheme-qualified labels (`file://testdata/go/hello`), taken as already resolved
//!
//! Everything after the first `?` is kept verbatim as query parameters, which override string
//! attributes of the addressed rule. Paths use `/` separators and are cleaned lexically, so
//! resolving a label never touches the filesystem.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::consts::FILE_SCHEME;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LabelError {
  #[error("empty label")]
  Empty,

  #[error("unsupported scheme '{scheme}' in label {label}")]
  UnsupportedScheme { label: String, scheme: String },

  #[error("invalid label {label}: {reason}")]
  Malformed { label: String, reason: String },
}

/// A resolved label. Equal labels address the same action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
  path: String,
  query: Option<String>,
  params: BTreeMap<String, Vec<String>>,
}

impl Label {
  /// Cleaned path of the target, relative to the build root unless absolute.
  pub fn path(&self) -> &str {
    &self.path
  }

  /// Directory holding the target; its build file defines the target if it is a rule.
  pub fn dir(&self) -> String {
    dirname(&self.path)
  }

  /// Last path element.
  pub fn name(&self) -> &str {
    basename(&self.path)
  }

  /// Raw query string, without the leading `?`.
  pub fn query(&self) -> Option<&str> {
    self.query.as_deref()
  }

  /// Parsed query parameters, keyed by attribute name.
  pub fn params(&self) -> &BTreeMap<String, Vec<String>> {
    &self.params
  }

  pub fn has_params(&self) -> bool {
    !self.params.is_empty()
  }
}

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}://{}", FILE_SCHEME, self.path)?;
    if let Some(query) = &self.query {
      write!(f, "?{}", query)?;
    }
    Ok(())
  }
}

/// Resolve `label` as written in a build file located in `base_dir`.
///
/// `base_dir` is a root-relative directory (`""` or `"."` for the root itself). Resolving the
/// canonical form of a label again yields the same label.
pub fn resolve(label: &str, base_dir: &str) -> Result<Label, LabelError> {
  if label.is_empty() {
    return Err(LabelError::Empty);
  }

  let (body, query) = match label.split_once('?') {
    Some((body, query)) => (body, Some(query)),
    None => (label, None),
  };

  let (path, qualified) = match split_scheme(body) {
    Some((scheme, rest)) => {
      if !scheme.eq_ignore_ascii_case(FILE_SCHEME) {
        return Err(LabelError::UnsupportedScheme {
          label: label.to_string(),
          scheme: scheme.to_string(),
        });
      }
      (rest, true)
    }
    None => (body, false),
  };

  if path.is_empty() {
    return Err(LabelError::Malformed {
      label: label.to_string(),
      reason: "missing path".to_string(),
    });
  }

  let path = if qualified || path.starts_with('/') {
    clean(path)
  } else {
    clean(&join(base_dir, path))
  };

  let params = parse_query(label, query)?;

  Ok(Label {
    path,
    query: query.filter(|q| !q.is_empty()).map(str::to_string),
    params,
  })
}

/// Split `scheme://rest`, accepting only RFC 3986 scheme characters before the separator.
fn split_scheme(label: &str) -> Option<(&str, &str)> {
  let (scheme, rest) = label.split_once("://")?;
  let mut chars = scheme.chars();
  let first = chars.next()?;
  let valid = first.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
  valid.then_some((scheme, rest))
}

fn parse_query(label: &str, query: Option<&str>) -> Result<BTreeMap<String, Vec<String>>, LabelError> {
  let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
  let Some(query) = query else {
    return Ok(params);
  };

  for pair in query.split('&').filter(|p| !p.is_empty()) {
    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
    if key.is_empty() {
      return Err(LabelError::Malformed {
        label: label.to_string(),
        reason: format!("query parameter '{}' has no name", pair),
      });
    }
    params.entry(key.to_string()).or_default().push(value.to_string());
  }

  Ok(params)
}

/// Lexically clean a `/`-separated path: collapse separators, drop `.` elements and resolve
/// `..` against preceding elements. An empty result is `"."`.
pub fn clean(path: &str) -> String {
  let rooted = path.starts_with('/');
  let mut parts: Vec<&str> = Vec::new();

  for segment in path.split('/') {
    match segment {
      "" | "." => {}
      ".." => {
        if parts.last().is_some_and(|p| *p != "..") {
          parts.pop();
        } else if !rooted {
          parts.push("..");
        }
      }
      s => parts.push(s),
    }
  }

  let joined = parts.join("/");
  if rooted {
    format!("/{}", joined)
  } else if joined.is_empty() {
    ".".to_string()
  } else {
    joined
  }
}

/// Join two path fragments and clean the result.
pub fn join(base: &str, path: &str) -> String {
  if base.is_empty() {
    clean(path)
  } else {
    clean(&format!("{}/{}", base, path))
  }
}

/// Everything but the last element of `path`, cleaned.
pub fn dirname(path: &str) -> String {
  match path.rfind('/') {
    Some(0) => "/".to_string(),
    Some(i) => clean(&path[..i]),
    None => ".".to_string(),
  }
}

/// The last element of `path`.
pub fn basename(path: &str) -> &str {
  let trimmed = path.trim_end_matches('/');
  match trimmed.rfind('/') {
    Some(i) => &trimmed[i + 1..],
    None => trimmed,
  }
}

/// The suffix of the last element starting at its final `.`, or `""`.
pub fn extension(path: &str) -> &str {
  let name = basename(path);
  match name.rfind('.') {
    Some(i) => &name[i..],
    None => "",
  }
}
