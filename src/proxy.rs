//! Statement tagging for routing proxies.
//!
//! ProxySQL-style proxies match query rules against comments in the statement
//! text. Tagging every statement lets operators route migration traffic (for
//! example, pin it to the writer hostgroup) and spot it in proxy stats.

use serde::Deserialize;

/// Annotation appended to every statement by default.
pub const DEFAULT_ANNOTATION: &str = "/*maintenance:lhm*/";

/// Adds a routing/observability tag to a statement without changing its meaning.
pub trait StatementTagger: Send + Sync {
    fn tag(&self, sql: &str) -> String;
}

/// Proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Comment appended to each statement. Must be a complete SQL comment.
    pub annotation: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            annotation: DEFAULT_ANNOTATION.to_string(),
        }
    }
}

/// Appends a fixed SQL comment to each statement.
#[derive(Debug, Clone)]
pub struct ProxySqlTagger {
    annotation: String,
}

impl ProxySqlTagger {
    pub fn new(annotation: impl Into<String>) -> Self {
        Self {
            annotation: annotation.into(),
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.annotation.clone())
    }

    pub fn annotation(&self) -> &str {
        &self.annotation
    }
}

impl Default for ProxySqlTagger {
    fn default() -> Self {
        Self::new(DEFAULT_ANNOTATION)
    }
}

impl StatementTagger for ProxySqlTagger {
    fn tag(&self, sql: &str) -> String {
        if self.annotation.is_empty() {
            return sql.to_string();
        }
        // A trailing `;` would leave the comment outside the statement.
        let sql = sql.trim_end().trim_end_matches(';');
        format!("{} {}", sql, self.annotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_annotation() {
        let tagger = ProxySqlTagger::default();
        assert_eq!(
            tagger.tag("SHOW TABLES"),
            "SHOW TABLES /*maintenance:lhm*/"
        );
    }

    #[test]
    fn test_strips_trailing_terminator() {
        let tagger = ProxySqlTagger::new("/*x*/");
        assert_eq!(tagger.tag("SELECT 1;  "), "SELECT 1 /*x*/");
    }

    #[test]
    fn test_empty_annotation_is_identity() {
        let tagger = ProxySqlTagger::new("");
        assert_eq!(tagger.tag("SELECT 1;"), "SELECT 1;");
    }
}
