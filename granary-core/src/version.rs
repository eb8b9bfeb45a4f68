//! Debian version ordering
//!
//! Implements the `deb-version(7)` comparison: `[epoch:]upstream[-revision]`
//! with digit/non-digit alternation and `~` sorting before everything,
//! including the end of the string.

use std::cmp::Ordering;

/// Compare two Debian version strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (epoch_a, upstream_a, revision_a) = split_version(a);
    let (epoch_b, upstream_b, revision_b) = split_version(b);

    epoch_a
        .cmp(&epoch_b)
        .then_with(|| compare_fragment(upstream_a, upstream_b))
        .then_with(|| compare_fragment(revision_a, revision_b))
}

/// `true` when `a` is strictly newer than `b`.
pub fn version_newer(a: &str, b: &str) -> bool {
    compare_versions(a, b) == Ordering::Greater
}

fn split_version(version: &str) -> (u64, &str, &str) {
    let (epoch, rest) = match version.split_once(':') {
        Some((epoch, rest)) => (epoch.parse().unwrap_or(0), rest),
        None => (0, version),
    };
    let (upstream, revision) = match rest.rsplit_once('-') {
        Some((upstream, revision)) => (upstream, revision),
        None => (rest, ""),
    };
    (epoch, upstream, revision)
}

fn compare_fragment(a: &str, b: &str) -> Ordering {
    let mut a = a.as_bytes();
    let mut b = b.as_bytes();

    loop {
        let cut_a = a.iter().position(|c| c.is_ascii_digit()).unwrap_or(a.len());
        let cut_b = b.iter().position(|c| c.is_ascii_digit()).unwrap_or(b.len());
        match compare_nondigits(&a[..cut_a], &b[..cut_b]) {
            Ordering::Equal => {}
            other => return other,
        }
        a = &a[cut_a..];
        b = &b[cut_b..];

        let cut_a = a.iter().position(|c| !c.is_ascii_digit()).unwrap_or(a.len());
        let cut_b = b.iter().position(|c| !c.is_ascii_digit()).unwrap_or(b.len());
        match compare_numeric(&a[..cut_a], &b[..cut_b]) {
            Ordering::Equal => {}
            other => return other,
        }
        a = &a[cut_a..];
        b = &b[cut_b..];

        if a.is_empty() && b.is_empty() {
            return Ordering::Equal;
        }
    }
}

/// dpkg character order: `~` sorts before end-of-string, letters before
/// every other character.
fn char_order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_alphabetic() => i32::from(c),
        Some(c) => i32::from(c) + 256,
    }
}

fn compare_nondigits(a: &[u8], b: &[u8]) -> Ordering {
    let mut i = 0;
    while i < a.len() || i < b.len() {
        let order_a = char_order(a.get(i).copied());
        let order_b = char_order(b.get(i).copied());
        match order_a.cmp(&order_b) {
            Ordering::Equal => i += 1,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Numeric runs compare by value; length-then-bytes avoids overflow on
/// arbitrarily long digit runs.
fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_leading_zeros(digits: &[u8]) -> &[u8] {
    let first = digits.iter().position(|c| *c != b'0').unwrap_or(digits.len());
    &digits[first..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tilde_sorts_before_release() {
        assert_eq!(compare_versions("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0~rc1", "1.0~rc2"), Ordering::Less);
        assert_eq!(compare_versions("1.0~~", "1.0~"), Ordering::Less);
    }

    #[test]
    fn epochs_dominate_everything_else() {
        assert_eq!(compare_versions("1:0.9", "2.0"), Ordering::Greater);
        assert_eq!(compare_versions("2:1.0", "1:99.9"), Ordering::Greater);
        assert_eq!(compare_versions("0:1.0", "1.0"), Ordering::Equal);
    }

    #[test]
    fn revisions_break_upstream_ties() {
        assert_eq!(compare_versions("1.0-1", "1.0-2"), Ordering::Less);
        assert_eq!(compare_versions("1.0", "1.0-1"), Ordering::Less);
        assert_eq!(compare_versions("1.0-1ubuntu1", "1.0-1"), Ordering::Greater);
    }

    #[test]
    fn numeric_runs_compare_by_value() {
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.01", "1.1"), Ordering::Equal);
        assert_eq!(
            compare_versions("12345678901234567890", "9"),
            Ordering::Greater
        );
    }

    #[test]
    fn letters_sort_before_other_characters() {
        assert_eq!(compare_versions("1.2a", "1.2+"), Ordering::Less);
        assert_eq!(compare_versions("1.2a", "1.2"), Ordering::Greater);
    }

    #[test]
    fn newer_is_a_strict_comparison() {
        assert!(version_newer("2:1.0", "1:9.9"));
        assert!(version_newer("1.0+b1", "1.0"));
        assert!(!version_newer("1.0", "1.0"));
    }
}
