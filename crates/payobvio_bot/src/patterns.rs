//! Detection of bounty amounts and linked issue numbers in free-form text.
//!
//! Every call runs a fresh match against a compiled [`Regex`], which carries no
//! match position between calls, so detecting and then extracting from the same
//! text always agree.

use std::sync::OnceLock;

use regex::Regex;

/// `Bounty <amount>` on a line of its own
fn bounty_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^Bounty[ \t]+(?P<amount>\d+(?:\.\d+)?)[ \t]*\r?$")
            .expect("bounty pattern is valid")
    })
}

/// `Issue #<number>` at the start of a line
fn issue_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^Issue[ \t]+#(?P<number>\d+)").expect("issue number pattern is valid")
    })
}

pub fn detects_bounty(text: &str) -> bool {
    bounty_pattern().is_match(text)
}

/// Returns the first bounty amount in `text`, or `0.0` when there is none.
pub fn extract_bounty(text: &str) -> f64 {
    bounty_pattern()
        .captures(text)
        .and_then(|caps| caps["amount"].parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// First linked issue number in `text`. Numbers that are zero or do not fit a `u64` link nothing.
pub fn issue_number(text: &str) -> Option<u64> {
    issue_number_pattern()
        .captures(text)
        .and_then(|caps| caps["number"].parse::<u64>().ok())
        .filter(|number| *number > 0)
}

pub fn detects_issue_number(text: &str) -> bool {
    issue_number(text).is_some()
}

/// Returns the first linked issue number in `text`, or `0` when there is none.
pub fn extract_issue_number(text: &str) -> u64 {
    issue_number(text).unwrap_or(0)
}

/// A bounty must be a positive, finite amount.
pub fn is_valid_bounty(amount: f64) -> bool {
    amount.is_finite() && amount > 0.0
}
