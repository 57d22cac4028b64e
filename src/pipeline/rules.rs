//! Cleaning rules store
//!
//! Process-wide, loaded once on first use, immutable afterwards. A JSON
//! file named by `CLEANING_RULES_PATH` can override the DOM rule lists;
//! a missing or unreadable file falls back to the built-in defaults.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

/// DOM selector and substring rules driving the cleaner's removal passes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleaningRules {
    /// Tags removed outright
    pub header_footer_tags: Vec<String>,
    /// Class names removed outright
    pub header_footer_classes: Vec<String>,
    /// Element ids removed outright
    pub header_footer_ids: Vec<String>,
    /// Case-insensitive substrings matched against class and id
    pub contains_in_class_or_id: Vec<String>,
    /// CSS selectors targeting consent banners
    pub cookies_consent: Vec<String>,
    /// Overrides for the named format patterns (regex source strings)
    pub format_patterns: HashMap<String, String>,
}

impl Default for CleaningRules {
    fn default() -> Self {
        fn list(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            header_footer_tags: list(&[
                "header", "footer", "nav", "aside", "form", "button",
            ]),
            header_footer_classes: list(&[
                "header",
                "footer",
                "nav",
                "navbar",
                "menu",
                "sidebar",
                "breadcrumb",
                "pagination",
                "social",
                "share",
                "comments",
                "related",
                "advertisement",
                "ads",
            ]),
            header_footer_ids: list(&[
                "header", "footer", "nav", "navbar", "menu", "sidebar", "comments",
            ]),
            contains_in_class_or_id: list(&[
                "cookie",
                "consent",
                "banner",
                "popup",
                "modal",
                "overlay",
                "newsletter",
                "subscribe",
                "advert",
                "promo",
                "tracking",
            ]),
            cookies_consent: list(&[
                "#onetrust-consent-sdk",
                "#CybotCookiebotDialog",
                ".cc-window",
                ".cookie-banner",
                ".cookie-consent",
                ".gdpr-banner",
                "[aria-label*='cookie']",
                "[id*='cookie-notice']",
            ]),
            format_patterns: HashMap::new(),
        }
    }
}

/// Compiled regex passes shared by the cleaner's text normalizer and
/// the Markdown converter's post-processing. One table, applied
/// identically in both places.
#[derive(Debug)]
pub struct FormatPatterns {
    /// Three or more newlines, collapsed to two
    pub excessive_newlines: Regex,
    /// Any line with two pipes (Markdown table residue)
    pub any_table_line: Regex,
    /// Lines mixing underscored identifiers with pipes
    pub function_calls_with_pipes: Regex,
    /// Escaped `_`, `\`, backtick, or quote
    pub escape_chars: Regex,
    /// Backslash at end of line
    pub trailing_backslashes: Regex,
    /// Pipe followed by a long dash rule
    pub pipe_with_dashes: Regex,
}

impl FormatPatterns {
    fn compile(overrides: &HashMap<String, String>) -> Self {
        let compile = |name: &str, default_source: &str| -> Regex {
            match overrides.get(name) {
                Some(source) => match Regex::new(source) {
                    Ok(regex) => regex,
                    Err(e) => {
                        warn!(
                            pattern = name,
                            error = %e,
                            "invalid format pattern override, using default"
                        );
                        Regex::new(default_source).expect("built-in pattern is valid")
                    }
                },
                None => Regex::new(default_source).expect("built-in pattern is valid"),
            }
        };

        Self {
            excessive_newlines: compile("excessiveNewlines", r"\n{3,}"),
            any_table_line: compile("anyTableLine", r"(?m)^.*\|.*\|.*$"),
            function_calls_with_pipes: compile(
                "functionCallsWithPipes",
                r"(?m).*_[a-zA-Z0-9_]+.*\|.*$",
            ),
            escape_chars: compile("escapeChars", r"\\[_\\`']"),
            trailing_backslashes: compile("trailingBackslashes", r"(?m)\\$"),
            pipe_with_dashes: compile("pipeWithDashes", r"(?m).*\|\s*-{5,}\s*$"),
        }
    }
}

/// Immutable rules store: DOM rules plus compiled format patterns
#[derive(Debug)]
pub struct RulesStore {
    pub cleaning: CleaningRules,
    pub patterns: FormatPatterns,
}

impl RulesStore {
    /// Load rules, optionally merging a JSON override file.
    pub fn load(path: Option<&Path>) -> Self {
        let cleaning = match path {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(raw) => match serde_json::from_str::<CleaningRules>(&raw) {
                    Ok(rules) => rules,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "invalid rules file, using defaults");
                        CleaningRules::default()
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "rules file unreadable, using defaults");
                    CleaningRules::default()
                }
            },
            None => CleaningRules::default(),
        };

        let patterns = FormatPatterns::compile(&cleaning.format_patterns);
        Self { cleaning, patterns }
    }

    /// Built-in defaults, no file lookup.
    pub fn defaults() -> Self {
        Self::load(None)
    }
}

static RULES: OnceLock<RulesStore> = OnceLock::new();

/// Process-wide rules, loaded on first use from `CLEANING_RULES_PATH`
/// when set, otherwise the built-in defaults.
pub fn global() -> &'static RulesStore {
    RULES.get_or_init(|| {
        let path = std::env::var("CLEANING_RULES_PATH").ok();
        RulesStore::load(path.as_deref().map(Path::new))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_rule_lists() {
        let rules = RulesStore::defaults();
        assert!(rules.cleaning.header_footer_tags.contains(&"nav".to_string()));
        assert!(rules.cleaning.header_footer_classes.contains(&"sidebar".to_string()));
        assert!(rules.cleaning.contains_in_class_or_id.contains(&"cookie".to_string()));
        assert!(!rules.cleaning.cookies_consent.is_empty());
    }

    #[test]
    fn excessive_newlines_pattern() {
        let rules = RulesStore::defaults();
        let out = rules.patterns.excessive_newlines.replace_all("a\n\n\n\nb", "\n\n");
        assert_eq!(out, "a\n\nb");
    }

    #[test]
    fn table_line_pattern_requires_two_pipes() {
        let rules = RulesStore::defaults();
        assert!(rules.patterns.any_table_line.is_match("| a | b |"));
        assert!(rules.patterns.any_table_line.is_match("x | y | z"));
        assert!(!rules.patterns.any_table_line.is_match("just one | pipe"));
    }

    #[test]
    fn escape_chars_pattern() {
        let rules = RulesStore::defaults();
        assert!(rules.patterns.escape_chars.is_match(r"\_"));
        assert!(rules.patterns.escape_chars.is_match(r"\\"));
        assert!(rules.patterns.escape_chars.is_match(r"\`"));
        assert!(rules.patterns.escape_chars.is_match(r"\'"));
        assert!(!rules.patterns.escape_chars.is_match(r"\n"));
    }

    #[test]
    fn pipe_with_dashes_pattern() {
        let rules = RulesStore::defaults();
        assert!(rules.patterns.pipe_with_dashes.is_match("header | -----"));
        assert!(!rules.patterns.pipe_with_dashes.is_match("header | ---"));
    }

    #[test]
    fn invalid_override_falls_back_to_default() {
        let mut overrides = HashMap::new();
        overrides.insert("excessiveNewlines".to_string(), "([unclosed".to_string());
        let patterns = FormatPatterns::compile(&overrides);
        assert!(patterns.excessive_newlines.is_match("\n\n\n"));
    }

    #[test]
    fn missing_rules_file_uses_defaults() {
        let store = RulesStore::load(Some(Path::new("/definitely/not/here.json")));
        assert!(!store.cleaning.header_footer_tags.is_empty());
    }
}
