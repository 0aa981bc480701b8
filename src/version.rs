//! Release tag validation (`vMAJOR.MINOR.PATCH` with optional `-suffix`).

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^v(\d+)\.(\d+)\.(\d+)(?:-([0-9A-Za-z][0-9A-Za-z.\-]*))?$")
            .expect("tag regex is valid")
    })
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TagError {
    #[error(
        "invalid release tag `{0}`: expected vMAJOR.MINOR.PATCH with an optional -suffix \
         (e.g. v1.2.3 or v1.2.3-rc1)"
    )]
    InvalidFormat(String),
}

/// A validated release tag. Parsing happens before any side effect, so an
/// invalid tag can never leave partial artifacts behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTag {
    raw: String,
    major: u64,
    minor: u64,
    patch: u64,
    pre_release: Option<String>,
}

impl ReleaseTag {
    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre_release.is_some()
    }

    /// The tag as given, leading `v` included.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The bare version without the leading `v`, as used in wheel file names.
    pub fn version(&self) -> &str {
        &self.raw[1..]
    }
}

impl FromStr for ReleaseTag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = tag_regex()
            .captures(s)
            .ok_or_else(|| TagError::InvalidFormat(s.to_string()))?;

        // the regex only admits digit runs, but they may still overflow u64
        let number = |i: usize| -> Result<u64, TagError> {
            captures[i]
                .parse()
                .map_err(|_| TagError::InvalidFormat(s.to_string()))
        };

        Ok(ReleaseTag {
            raw: s.to_string(),
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            pre_release: captures.get(4).map(|m| m.as_str().to_string()),
        })
    }
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("v0.0.1")]
    #[case("v1.2.3")]
    #[case("v10.20.30")]
    #[case("v1.2.3-rc1")]
    #[case("v1.2.3-alpha.2")]
    #[case("v1.2.3-beta-4")]
    fn accepts_valid_tags(#[case] tag: &str) {
        let parsed: ReleaseTag = tag.parse().unwrap();
        assert_eq!(parsed.as_str(), tag);
    }

    #[rstest]
    #[case("1.2.3")]
    #[case("v1.2")]
    #[case("v1.2.3.4")]
    #[case("v1.2.3-")]
    #[case("va.b.c")]
    #[case("v1.2.3 ")]
    #[case("V1.2.3")]
    #[case("")]
    fn rejects_invalid_tags(#[case] tag: &str) {
        assert!(tag.parse::<ReleaseTag>().is_err());
    }

    #[test]
    fn exposes_components() {
        let tag: ReleaseTag = "v1.4.12-rc2".parse().unwrap();
        assert_eq!(
            (tag.major(), tag.minor(), tag.patch()),
            (1, 4, 12)
        );
        assert!(tag.is_prerelease());
        assert_eq!(tag.version(), "1.4.12-rc2");
    }

    #[test]
    fn plain_tag_is_not_prerelease() {
        let tag: ReleaseTag = "v2.0.0".parse().unwrap();
        assert!(!tag.is_prerelease());
        assert_eq!(tag.version(), "2.0.0");
    }
}
