//! Next-tag computation over a project's tag history
//!
//! Tag names are treated leniently: any leading non-digit run is a prefix
//! to preserve (conventionally `v`), and components that are missing or not
//! numeric parse as zero. Resolution degrades gracefully instead of
//! rejecting a tag.

use std::cmp::Ordering;
use std::sync::OnceLock;

use clap::ValueEnum;
use regex::Regex;
use semver::Version;

/// Which version component a release increments
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Bump {
    Patch,
    Minor,
    Major,
}

impl std::fmt::Display for Bump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bump::Patch => write!(f, "patch"),
            Bump::Minor => write!(f, "minor"),
            Bump::Major => write!(f, "major"),
        }
    }
}

fn digit_runs(s: &str) -> Vec<u64> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let re = DIGITS.get_or_init(|| Regex::new(r"\d+").expect("valid regex"));
    re.find_iter(s)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// Descending version order over raw tag names.
///
/// Compares the digit runs embedded in each name pairwise; when the runs
/// differ in count, the missing ones count as zero so the order stays
/// total. Names without any digits carry no version information and
/// compare equal.
pub fn compare_desc(a: &str, b: &str) -> Ordering {
    let runs_a = digit_runs(a);
    let runs_b = digit_runs(b);
    if runs_a.is_empty() || runs_b.is_empty() {
        return Ordering::Equal;
    }

    for i in 0..runs_a.len().max(runs_b.len()) {
        let x = runs_a.get(i).copied().unwrap_or(0);
        let y = runs_b.get(i).copied().unwrap_or(0);
        match y.cmp(&x) {
            Ordering::Equal => continue,
            decided => return decided,
        }
    }
    Ordering::Equal
}

/// Sorts tag names descending, newest version first.
pub fn sort_desc(names: &mut [String]) {
    names.sort_by(|a, b| compare_desc(a, b));
}

/// Splits a tag into its non-digit prefix and parsed version triple.
fn parse_tag(tag: &str) -> (&str, Version) {
    let digits_at = tag.find(|c: char| c.is_ascii_digit()).unwrap_or(tag.len());
    let (prefix, rest) = tag.split_at(digits_at);

    let mut parts = rest.split('.');
    let component = |part: Option<&str>| part.and_then(|s| s.parse().ok()).unwrap_or(0);
    let major = component(parts.next());
    let minor = component(parts.next());
    let patch = component(parts.next());

    (prefix, Version::new(major, minor, patch))
}

fn bump(version: &Version, kind: Bump) -> Version {
    match kind {
        Bump::Patch => Version::new(version.major, version.minor, version.patch + 1),
        Bump::Minor => Version::new(version.major, version.minor + 1, 0),
        Bump::Major => Version::new(version.major + 1, 0, 0),
    }
}

/// Computes the tag the next release would create.
///
/// `tags_desc` must already be sorted descending (see [`compare_desc`]); an
/// empty history starts from `v0.0.0`. The resulting tag is always strictly
/// greater than the current highest one.
pub fn next_tag(tags_desc: &[String], kind: Bump) -> String {
    let (prefix, current) = match tags_desc.first() {
        Some(tag) => parse_tag(tag),
        None => ("v", Version::new(0, 0, 0)),
    };
    let next = bump(&current, kind);
    format!("{prefix}{next}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn owned(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[rstest]
    #[case(&[], Bump::Major, "v1.0.0")]
    #[case(&[], Bump::Patch, "v0.0.1")]
    #[case(&["v2.3.4"], Bump::Patch, "v2.3.5")]
    #[case(&["v2.3.4"], Bump::Minor, "v2.4.0")]
    #[case(&["v2.3.4"], Bump::Major, "v3.0.0")]
    #[case(&["1.2.3"], Bump::Patch, "1.2.4")] // no prefix, none added
    #[case(&["v1.2.3", "v1.2.2", "v0.9.0"], Bump::Patch, "v1.2.4")] // only the head counts
    fn next_tag_bumps_the_highest_tag(
        #[case] tags: &[&str],
        #[case] kind: Bump,
        #[case] expected: &str,
    ) {
        assert_eq!(next_tag(&owned(tags), kind), expected);
    }

    #[rstest]
    #[case(&["release-1"], Bump::Patch, "release-1.0.1")]
    #[case(&[""], Bump::Patch, "0.0.1")]
    #[case(&["v1.x.3"], Bump::Patch, "v1.0.4")] // malformed segment parses as zero
    #[case(&["v1.2"], Bump::Patch, "v1.2.1")] // missing segment parses as zero
    #[case(&["v1.2.3.4"], Bump::Patch, "v1.2.4")] // extra segments are ignored
    fn next_tag_degrades_gracefully_on_malformed_tags(
        #[case] tags: &[&str],
        #[case] kind: Bump,
        #[case] expected: &str,
    ) {
        assert_eq!(next_tag(&owned(tags), kind), expected);
    }

    #[test]
    fn minor_and_major_bumps_reset_lower_components() {
        assert_eq!(next_tag(&owned(&["v1.2.9"]), Bump::Minor), "v1.3.0");
        assert_eq!(next_tag(&owned(&["v1.9.9"]), Bump::Major), "v2.0.0");
    }

    #[test]
    fn compare_desc_is_reflexive() {
        for tag in ["v1.2.3", "release-1", "", "no-digits"] {
            assert_eq!(compare_desc(tag, tag), Ordering::Equal);
        }
    }

    #[test]
    fn sort_desc_orders_by_numeric_magnitude_not_lexically() {
        let mut names = owned(&["v1.2.0", "v1.10.0", "v1.9.9"]);
        sort_desc(&mut names);
        assert_eq!(names, owned(&["v1.10.0", "v1.9.9", "v1.2.0"]));
    }

    #[rstest]
    #[case("v1.2.3.4", "v1.2", Ordering::Less)] // longer run list wins via zero padding
    #[case("v1.2", "v1.2.0", Ordering::Equal)]
    #[case("v2.0.0", "v1.9.9", Ordering::Less)] // descending: larger sorts first
    #[case("v1.9.9", "v2.0.0", Ordering::Greater)]
    #[case("no-digits", "v1.0.0", Ordering::Equal)] // degenerate: no version info
    fn compare_desc_cases(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(compare_desc(a, b), expected);
    }

    #[test]
    fn separators_other_than_dots_still_yield_digit_runs() {
        let mut names = owned(&["rel_1_2", "rel_1_10"]);
        sort_desc(&mut names);
        assert_eq!(names, owned(&["rel_1_10", "rel_1_2"]));
    }
}
