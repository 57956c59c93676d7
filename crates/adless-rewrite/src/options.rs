//! Rewriter switches.

use serde::{Deserialize, Serialize};

/// Optional parts of a rewrite. Filtering and resolution always run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteOptions {
    /// Inject `<base href>` when the document has none
    pub inject_base: bool,
    /// Inject the cosmetic hiding stylesheet
    pub cosmetic_filters: bool,
    /// Use the built-in host and class/id signatures as a fallback
    pub builtin_signatures: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            inject_base: true,
            cosmetic_filters: true,
            builtin_signatures: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let options: RewriteOptions = serde_json::from_str("{}").expect("valid json");
        assert_eq!(options, RewriteOptions::default());
    }

    #[test]
    fn fields_override_individually() {
        let options: RewriteOptions =
            serde_json::from_str(r#"{"builtin_signatures": false}"#).expect("valid json");
        assert!(options.inject_base);
        assert!(options.cosmetic_filters);
        assert!(!options.builtin_signatures);
    }
}
