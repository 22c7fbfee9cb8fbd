//! `.gitignore` rule parsing and matching for directory listing.
//!
//! Each non-comment line becomes `{regex, negation, directory_only}`. Glob
//! syntax translates as: `**/` → `(?:.+/)?`, `**` → `.*`, `*` → `[^/]*`,
//! `?` → `[^/]`, character classes pass through, everything else is
//! escaped. Rules apply in file order, so later rules — negations
//! included — override earlier matches. Patterns containing a slash anchor
//! at the workspace root; slash-free patterns match at any depth.

use std::path::Path;

use regex::Regex;

#[derive(Debug)]
pub struct GitignoreRule {
    regex: Regex,
    negation: bool,
    directory_only: bool,
}

#[derive(Debug, Default)]
pub struct GitignoreFilter {
    rules: Vec<GitignoreRule>,
}

impl GitignoreFilter {
    /// Filter with no rules; nothing is ignored.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read `<root>/.gitignore` if present; a missing or unreadable file
    /// yields an empty filter.
    pub fn load(root: &Path) -> Self {
        match std::fs::read_to_string(root.join(".gitignore")) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::empty(),
        }
    }

    pub fn parse(content: &str) -> Self {
        let mut rules = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (negation, pattern) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let (directory_only, pattern) = match pattern.strip_suffix('/') {
                Some(rest) => (true, rest),
                None => (false, pattern),
            };
            if pattern.is_empty() {
                continue;
            }

            match glob_to_regex(pattern) {
                Some(regex) => rules.push(GitignoreRule {
                    regex,
                    negation,
                    directory_only,
                }),
                None => tracing::warn!(pattern, "skipping unparseable gitignore pattern"),
            }
        }
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Decide inclusion for a workspace-relative, `/`-separated path.
    /// Last matching rule wins; no match means not ignored.
    pub fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        let mut ignored = false;
        for rule in &self.rules {
            if rule.directory_only && !is_dir {
                continue;
            }
            if rule.regex.is_match(rel_path) {
                ignored = !rule.negation;
            }
        }
        ignored
    }
}

/// Translate one gitignore glob into an anchored regex.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    // A leading slash forces root anchoring but is not part of the match.
    let (had_leading_slash, pattern) = match pattern.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, pattern),
    };

    let mut body = String::new();
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    if chars.get(i + 2) == Some(&'/') {
                        // `**/` spans any number of leading directories,
                        // including none.
                        body.push_str("(?:.+/)?");
                        i += 3;
                    } else {
                        body.push_str(".*");
                        i += 2;
                    }
                } else {
                    body.push_str("[^/]*");
                    i += 1;
                }
            }
            '?' => {
                body.push_str("[^/]");
                i += 1;
            }
            '[' => {
                // Character classes pass through to the regex engine.
                let mut j = i + 1;
                if chars.get(j) == Some(&'!') || chars.get(j) == Some(&'^') {
                    j += 1;
                }
                // A `]` right after the opening bracket is literal.
                if chars.get(j) == Some(&']') {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j < chars.len() {
                    body.push('[');
                    if chars.get(i + 1) == Some(&'!') {
                        body.push('^');
                        body.push_str(&chars[i + 2..j].iter().collect::<String>());
                    } else {
                        body.push_str(&chars[i + 1..j].iter().collect::<String>());
                    }
                    body.push(']');
                    i = j + 1;
                } else {
                    body.push_str(&regex::escape("["));
                    i += 1;
                }
            }
            other => {
                body.push_str(&regex::escape(&other.to_string()));
                i += 1;
            }
        }
    }

    let anchored = had_leading_slash || pattern.contains('/');
    let full = if anchored {
        format!("^{body}$")
    } else {
        // No slash: the pattern names a basename at any depth.
        format!("^(?:.*/)?{body}$")
    };
    Regex::new(&full).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_within_one_component() {
        let filter = GitignoreFilter::parse("*.log\n");
        assert!(filter.is_ignored("x.log", false));
        assert!(filter.is_ignored("sub/x.log", false));
        assert!(!filter.is_ignored("x.txt", false));
    }

    #[test]
    fn later_negation_overrides_earlier_match() {
        let filter = GitignoreFilter::parse("*.log\n!keep.log\n");
        assert!(filter.is_ignored("x.log", false));
        assert!(!filter.is_ignored("keep.log", false));
        assert!(!filter.is_ignored("logs/keep.log", false));
    }

    #[test]
    fn directory_only_rule_spares_plain_files() {
        let filter = GitignoreFilter::parse("build/\n");
        assert!(filter.is_ignored("build", true));
        assert!(!filter.is_ignored("build", false));
    }

    #[test]
    fn double_star_prefix_is_optional() {
        let filter = GitignoreFilter::parse("**/generated\n");
        assert!(filter.is_ignored("generated", false));
        assert!(filter.is_ignored("a/b/generated", false));
        assert!(!filter.is_ignored("a/generated2", false));
    }

    #[test]
    fn question_mark_matches_one_character() {
        let filter = GitignoreFilter::parse("file.?\n");
        assert!(filter.is_ignored("file.a", false));
        assert!(!filter.is_ignored("file.ab", false));
        assert!(!filter.is_ignored("file.", false));
    }

    #[test]
    fn character_classes_pass_through() {
        let filter = GitignoreFilter::parse("v[0-9].txt\n");
        assert!(filter.is_ignored("v1.txt", false));
        assert!(!filter.is_ignored("vx.txt", false));
    }

    #[test]
    fn slash_patterns_anchor_at_root() {
        let filter = GitignoreFilter::parse("docs/internal\n");
        assert!(filter.is_ignored("docs/internal", false));
        assert!(!filter.is_ignored("sub/docs/internal", false));
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let filter = GitignoreFilter::parse("# comment\n\n*.tmp\n");
        assert!(filter.is_ignored("a.tmp", false));
        assert!(!filter.is_ignored("# comment", false));
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        let filter = GitignoreFilter::parse("a+b.txt\n");
        assert!(filter.is_ignored("a+b.txt", false));
        assert!(!filter.is_ignored("aab.txt", false));
    }
}
