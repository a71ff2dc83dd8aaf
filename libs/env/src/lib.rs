//! Environment lookup for deployments.
//!
//! Container environment blocks are materialized from variable *names*; the
//! values come from an [`EnvProvider`]. Providers are injected so callers
//! never read ambient process state directly:
//!
//! - [`ProcessEnv`]: the current process environment
//! - [`EnvFile`]: a dotenv-style file
//! - [`LayeredEnv`]: several providers, first hit wins
//!
//! # Env file format
//!
//! ```text
//! # acactl-env v1
//! KEY=value
//! export ANOTHER_KEY="another value"
//! ```
//!
//! Keys must match `[A-Za-z_][A-Za-z0-9_]*` and be <= 256 bytes.
//! Values are UTF-8 strings; `\n`, `\r` and `\\` escapes are decoded.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

/// Maximum key length in bytes.
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum value length in bytes.
pub const MAX_VALUE_LENGTH: usize = 64 * 1024; // 64 KiB

/// Format version header prefix.
const FORMAT_HEADER_PREFIX: &str = "# acactl-env";

/// Supported format version header.
const FORMAT_HEADER: &str = "# acactl-env v1";

/// Environment errors.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Invalid key format.
    #[error("invalid environment variable name '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Invalid value format.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// Parse error.
    #[error("parse error at line {line}: {reason}")]
    ParseError { line: usize, reason: String },

    /// Unsupported format version.
    #[error("unsupported env file version: {version}")]
    UnsupportedVersion { version: String },

    /// One or more required variables are not set.
    #[error("missing environment variables: {}", names.join(", "))]
    Missing { names: Vec<String> },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Source of environment variable values.
pub trait EnvProvider: Send + Sync {
    /// Look up a variable. `None` means unset.
    fn get(&self, name: &str) -> Option<String>;
}

/// The current process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvProvider for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Several providers consulted in order; the first one that has the
/// variable wins.
#[derive(Default)]
pub struct LayeredEnv {
    layers: Vec<Box<dyn EnvProvider>>,
}

impl LayeredEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a lower-priority layer.
    pub fn with_layer(mut self, provider: impl EnvProvider + 'static) -> Self {
        self.layers.push(Box::new(provider));
        self
    }
}

impl EnvProvider for LayeredEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(name))
    }
}

/// Resolve every name, reporting all missing names at once.
///
/// Returns `(name, value)` pairs in the order requested.
pub fn require_all(
    provider: &dyn EnvProvider,
    names: &[String],
) -> Result<Vec<(String, String)>, EnvError> {
    let mut resolved = Vec::with_capacity(names.len());
    let mut missing = Vec::new();

    for name in names {
        validate_key(name)?;
        match provider.get(name) {
            Some(value) => resolved.push((name.clone(), value)),
            None => missing.push(name.clone()),
        }
    }

    if !missing.is_empty() {
        return Err(EnvError::Missing { names: missing });
    }

    Ok(resolved)
}

/// A parsed env file (key-value pairs).
///
/// Keys are stored in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    inner: BTreeMap<String, String>,
}

impl EnvFile {
    /// Create an empty env file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from an iterator of key-value pairs.
    pub fn try_from_iter<I, K, V>(iter: I) -> Result<Self, EnvError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut file = Self::new();
        for (k, v) in iter {
            file.set(k, v)?;
        }
        Ok(file)
    }

    /// Set a value.
    ///
    /// Returns the previous value if the key existed.
    pub fn set<K: Into<String>, V: Into<String>>(
        &mut self,
        key: K,
        value: V,
    ) -> Result<Option<String>, EnvError> {
        let key = key.into();
        let value = value.into();

        validate_key(&key)?;
        validate_value(&key, &value)?;

        Ok(self.inner.insert(key, value))
    }

    /// Get a value.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(|s| s.as_str())
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get all keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(|k| k.as_str())
    }

    /// Parse from dotenv format.
    pub fn parse(content: &str) -> Result<Self, EnvError> {
        let mut file = Self::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.starts_with(FORMAT_HEADER_PREFIX) {
                if line_num == 0 && !line.starts_with(FORMAT_HEADER) {
                    let version = line
                        .strip_prefix("# acactl-env ")
                        .unwrap_or("unknown");
                    return Err(EnvError::UnsupportedVersion {
                        version: version.to_string(),
                    });
                }
                continue;
            }
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            parse_line(line_num + 1, line, &mut file)?;
        }

        Ok(file)
    }

    /// Read from a file.
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self, EnvError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

impl EnvProvider for EnvFile {
    fn get(&self, name: &str) -> Option<String> {
        self.value(name).map(str::to_string)
    }
}

/// Validate an environment variable name.
pub fn validate_key(key: &str) -> Result<(), EnvError> {
    let mut chars = key.chars();
    let Some(first) = chars.next() else {
        return Err(EnvError::InvalidKey {
            key: key.to_string(),
            reason: "name cannot be empty".to_string(),
        });
    };

    if key.len() > MAX_KEY_LENGTH {
        return Err(EnvError::InvalidKey {
            key: key.to_string(),
            reason: format!("name exceeds maximum length of {} bytes", MAX_KEY_LENGTH),
        });
    }

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(EnvError::InvalidKey {
            key: key.to_string(),
            reason: "name must start with a letter or underscore".to_string(),
        });
    }

    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(EnvError::InvalidKey {
                key: key.to_string(),
                reason: format!("invalid character '{}' in name", c),
            });
        }
    }

    Ok(())
}

/// Validate a value.
fn validate_value(key: &str, value: &str) -> Result<(), EnvError> {
    if value.len() > MAX_VALUE_LENGTH {
        return Err(EnvError::InvalidValue {
            key: key.to_string(),
            reason: format!("value exceeds maximum length of {} bytes", MAX_VALUE_LENGTH),
        });
    }

    Ok(())
}

/// Unescape a value from dotenv format.
fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }

    out
}

/// Strip one pair of matching surrounding quotes.
fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Parse a single line.
fn parse_line(line_num: usize, line: &str, file: &mut EnvFile) -> Result<(), EnvError> {
    let line = line.strip_prefix("export ").unwrap_or(line);
    let Some((key, value)) = line.split_once('=') else {
        return Err(EnvError::ParseError {
            line: line_num,
            reason: "expected KEY=value format".to_string(),
        });
    };

    let key = key.trim();
    let value = unescape_value(strip_quotes(value.trim()));

    file.set(key, value).map_err(|e| EnvError::ParseError {
        line: line_num,
        reason: e.to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        assert!(validate_key("FOO").is_ok());
        assert!(validate_key("foo_bar").is_ok());
        assert!(validate_key("_private").is_ok());
        assert!(validate_key("FOO123").is_ok());

        assert!(validate_key("").is_err());
        assert!(validate_key("123foo").is_err());
        assert!(validate_key("foo-bar").is_err());
        assert!(validate_key("foo.bar").is_err());
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape_value("hello"), "hello");
        assert_eq!(unescape_value("hello\\nworld"), "hello\nworld");
        assert_eq!(unescape_value("path\\\\to\\\\file"), "path\\to\\file");
    }

    #[test]
    fn test_parse_with_header_quotes_and_export() {
        let content = "# acactl-env v1\nFOO=bar\nexport BAZ=\"qux quux\"\n# comment\nSINGLE='x'\n";
        let file = EnvFile::parse(content).unwrap();
        assert_eq!(file.value("FOO"), Some("bar"));
        assert_eq!(file.value("BAZ"), Some("qux quux"));
        assert_eq!(file.value("SINGLE"), Some("x"));
        assert_eq!(file.len(), 3);
    }

    #[test]
    fn test_parse_without_header() {
        let file = EnvFile::parse("FOO=bar\nBAZ=a=b\n").unwrap();
        assert_eq!(file.value("FOO"), Some("bar"));
        assert_eq!(file.value("BAZ"), Some("a=b"));
    }

    #[test]
    fn test_unsupported_version() {
        let result = EnvFile::parse("# acactl-env v999\nFOO=bar\n");
        assert!(matches!(result, Err(EnvError::UnsupportedVersion { .. })));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let result = EnvFile::parse("FOO=bar\nnot a pair\n");
        assert!(matches!(result, Err(EnvError::ParseError { line: 2, .. })));

        let result = EnvFile::parse("BAD-KEY=1\n");
        assert!(matches!(result, Err(EnvError::ParseError { line: 1, .. })));
    }

    #[test]
    fn test_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.env");
        std::fs::write(&path, "API_URL=https://example.test\n").unwrap();

        let file = EnvFile::read_from_file(&path).unwrap();
        assert_eq!(file.get("API_URL").as_deref(), Some("https://example.test"));
    }

    #[test]
    fn test_layered_first_hit_wins() {
        let top = EnvFile::try_from_iter([("A", "top")]).unwrap();
        let bottom = EnvFile::try_from_iter([("A", "bottom"), ("B", "bottom")]).unwrap();
        let env = LayeredEnv::new().with_layer(top).with_layer(bottom);

        assert_eq!(env.get("A").as_deref(), Some("top"));
        assert_eq!(env.get("B").as_deref(), Some("bottom"));
        assert_eq!(env.get("C"), None);
    }

    #[test]
    fn test_require_all_collects_every_missing_name() {
        let env = EnvFile::try_from_iter([("PRESENT", "1")]).unwrap();
        let names = vec![
            "PRESENT".to_string(),
            "MISSING_ONE".to_string(),
            "MISSING_TWO".to_string(),
        ];

        match require_all(&env, &names) {
            Err(EnvError::Missing { names }) => {
                assert_eq!(names, vec!["MISSING_ONE", "MISSING_TWO"]);
            }
            other => panic!("expected Missing, got {other:?}"),
        }

        let resolved = require_all(&env, &names[..1]).unwrap();
        assert_eq!(resolved, vec![("PRESENT".to_string(), "1".to_string())]);
    }
}
