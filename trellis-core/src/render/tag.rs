//! Tag validation.
//!
//! Element names must start with an ASCII letter and may continue with
//! letters, digits, `-`, `_`, `.` or `:`. Names on the deny list are
//! rejected regardless of case.

use crate::config::RenderConfig;
use crate::error::RenderError;

/// Decides which element names the reconciler may create.
#[derive(Debug, Clone)]
pub struct TagPolicy {
    denied: Vec<String>,
}

impl TagPolicy {
    /// Build a policy from the renderer configuration.
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            denied: config
                .denied_tags
                .iter()
                .map(|tag| tag.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Check a tag before creating an element for it.
    pub fn check(&self, tag: &str) -> Result<(), RenderError> {
        if !is_valid_tag(tag) {
            return Err(RenderError::InvalidTag {
                tag: tag.to_string(),
            });
        }
        if self.denied.iter().any(|denied| denied.eq_ignore_ascii_case(tag)) {
            return Err(RenderError::DisallowedTag {
                tag: tag.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for TagPolicy {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}

/// Whether `tag` is a syntactically valid element name.
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("div", true)]
    #[case("my-widget", true)]
    #[case("svg:rect", true)]
    #[case("h1", true)]
    #[case("", false)]
    #[case("1div", false)]
    #[case("-x", false)]
    #[case("di v", false)]
    #[case("a<b", false)]
    fn tag_syntax(#[case] tag: &str, #[case] valid: bool) {
        assert_eq!(is_valid_tag(tag), valid);
    }

    #[test]
    fn deny_list_ignores_case() {
        let policy = TagPolicy::default();

        assert!(matches!(
            policy.check("SCRIPT"),
            Err(RenderError::DisallowedTag { tag }) if tag == "SCRIPT"
        ));
        assert!(policy.check("div").is_ok());
    }

    #[test]
    fn syntax_is_checked_before_deny_list() {
        let policy = TagPolicy::new(&RenderConfig {
            denied_tags: vec!["Iframe".to_string()],
        });

        assert!(matches!(policy.check("iframe"), Err(RenderError::DisallowedTag { .. })));
        assert!(matches!(policy.check("<iframe>"), Err(RenderError::InvalidTag { .. })));
        assert!(policy.check("script").is_ok());
    }
}
