//! Changesets and commit message scanning.
//!
//! The text helpers here are pure functions so skip detection, PR number and
//! ticket extraction can be tested without any source-control access.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Tokens a commit author can put in a message to suppress auto-deploys.
pub const SKIP_TOKENS: [&str; 2] = ["[deploy skip]", "[skip deploy]"];

const SUMMARY_MAX: usize = 80;

fn pull_request_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Merge pull request #(\d+)").unwrap())
}

fn ticket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"ZD#(\d+)").unwrap())
}

/// First line of a commit message, truncated to 80 characters.
pub fn summary(message: &str) -> String {
    let line = message.lines().next().unwrap_or("");
    line.chars().take(SUMMARY_MAX).collect()
}

/// Pull request number from a merge commit, if any.
pub fn pull_request_number(message: &str) -> Option<u64> {
    pull_request_re()
        .captures(message)
        .and_then(|c| c[1].parse().ok())
}

/// Support ticket reference (`ZD#123`) from a commit message, if any.
pub fn ticket_number(message: &str) -> Option<u64> {
    ticket_re().captures(message).and_then(|c| c[1].parse().ok())
}

/// Whether the message asks for the deploy to be skipped.
pub fn wants_skip(message: &str) -> bool {
    SKIP_TOKENS.iter().any(|token| message.contains(token))
}

/// A read-only comparison between two deploy points of a repository.
/// Computed on demand, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Changeset {
    /// `owner/name` of the repository.
    pub repository: String,
    pub previous_commit: String,
    pub commit: String,
}

impl Changeset {
    pub fn new(
        repository: impl Into<String>,
        previous_commit: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            previous_commit: previous_commit.into(),
            commit: commit.into(),
        }
    }

    pub fn compare_url(&self) -> String {
        format!(
            "https://github.com/{}/compare/{}...{}",
            self.repository, self.previous_commit, self.commit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_is_first_line() {
        assert_eq!(
            summary("Hello, World!\nHow are you doing?"),
            "Hello, World!"
        );
    }

    #[test]
    fn summary_truncates_to_80_chars() {
        let long = "Hello! ".repeat(20);
        assert_eq!(summary(&long).chars().count(), 80);
    }

    #[test]
    fn pull_request_number_from_merge_commit() {
        assert_eq!(
            pull_request_number("Merge pull request #136 from foobar"),
            Some(136)
        );
        assert_eq!(pull_request_number("Add another bug"), None);
    }

    #[test]
    fn ticket_number_from_message() {
        assert_eq!(ticket_number("ZD#123 this fixes a very bad bug"), Some(123));
        assert_eq!(ticket_number("PR review comments"), None);
    }

    #[test]
    fn skip_tokens_detected() {
        assert!(wants_skip("quick fix [skip deploy]"));
        assert!(wants_skip("[deploy skip] wip"));
        assert!(!wants_skip("deploy this please"));
    }

    #[test]
    fn compare_url_format() {
        let cs = Changeset::new("acme/foo", "abc123", "def456");
        assert_eq!(
            cs.compare_url(),
            "https://github.com/acme/foo/compare/abc123...def456"
        );
    }
}
