//! Four-part plugin/service version with total ordering and parsing.
//!
//! Mirrors the `major.minor.micro.qualifier` scheme: three non-negative
//! integers plus a qualifier matching `[a-zA-Z0-9_-]*`. An empty version
//! (`0.0.0` with an empty qualifier) is always defined and orders below
//! every other version; an undefined sentinel carries no information and
//! participates in no comparison.

use std::fmt;

use crate::error::{CoreError, CoreResult};

const SEPARATOR: char = '.';

fn qualifier_is_valid(qualifier: &str) -> bool {
    qualifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A four-part version: `major.minor.micro.qualifier`.
///
/// [`Version::undefined`] represents "no information" — comparing it (via
/// [`Version::compare`], `PartialOrd`, or `PartialEq`) fails with
/// [`CoreError::IllegalState`] at the query site. Everywhere else,
/// `Version` behaves like an ordinary immutable value type.
#[derive(Debug, Clone)]
pub struct Version {
    inner: Option<VersionParts>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VersionParts {
    major: u64,
    minor: u64,
    micro: u64,
    qualifier: String,
}

impl Version {
    /// `0.0.0` with an empty qualifier. Orders below every other defined
    /// version.
    pub fn empty() -> Self {
        Version {
            inner: Some(VersionParts {
                major: 0,
                minor: 0,
                micro: 0,
                qualifier: String::new(),
            }),
        }
    }

    /// The "no information" sentinel. Any attempt to read its components or
    /// compare it fails with [`CoreError::IllegalState`].
    pub fn undefined() -> Self {
        Version { inner: None }
    }

    /// Constructs a version directly from its parts, validating the
    /// qualifier's character class.
    pub fn new(major: u64, minor: u64, micro: u64, qualifier: impl Into<String>) -> CoreResult<Self> {
        let qualifier = qualifier.into();
        if !qualifier_is_valid(&qualifier) {
            return Err(CoreError::invalid_argument(format!(
                "invalid qualifier: {qualifier}"
            )));
        }
        Ok(Version {
            inner: Some(VersionParts {
                major,
                minor,
                micro,
                qualifier,
            }),
        })
    }

    /// Parses `M[.m[.u[.q]]]`. Leading/trailing whitespace is stripped
    /// before splitting; empty input (after trimming) yields
    /// [`Version::empty`]. A non-numeric numeric segment, a fifth
    /// dot-separated segment, or an invalid qualifier character fails with
    /// [`CoreError::InvalidArgument`].
    pub fn parse(version: &str) -> CoreResult<Self> {
        let trimmed = version.trim();
        if trimmed.is_empty() {
            return Ok(Self::empty());
        }

        let mut parts = trimmed.split(SEPARATOR);
        let mut next_numeric = |label: &str| -> CoreResult<u64> {
            match parts.next() {
                Some(s) => s
                    .parse::<u64>()
                    .map_err(|_| CoreError::invalid_argument(format!("invalid {label}: {s}"))),
                None => Ok(0),
            }
        };

        let major = next_numeric("major")?;
        let minor = next_numeric("minor")?;
        let micro = next_numeric("micro")?;
        let qualifier = parts.next().unwrap_or("").to_string();

        if parts.next().is_some() {
            return Err(CoreError::invalid_argument(format!(
                "invalid format: {version}"
            )));
        }

        Self::new(major, minor, micro, qualifier)
    }

    pub fn is_undefined(&self) -> bool {
        self.inner.is_none()
    }

    fn parts(&self) -> CoreResult<&VersionParts> {
        self.inner
            .as_ref()
            .ok_or_else(|| CoreError::illegal_state("version undefined"))
    }

    pub fn major(&self) -> CoreResult<u64> {
        self.parts().map(|p| p.major)
    }

    pub fn minor(&self) -> CoreResult<u64> {
        self.parts().map(|p| p.minor)
    }

    pub fn micro(&self) -> CoreResult<u64> {
        self.parts().map(|p| p.micro)
    }

    pub fn qualifier(&self) -> CoreResult<&str> {
        self.parts().map(|p| p.qualifier.as_str())
    }

    /// Three-way comparison. Fails with [`CoreError::IllegalState`] if
    /// either side is undefined.
    pub fn compare(&self, other: &Version) -> CoreResult<std::cmp::Ordering> {
        let a = self.parts()?;
        let b = other.parts()?;
        Ok((a.major, a.minor, a.micro, &a.qualifier).cmp(&(b.major, b.minor, b.micro, &b.qualifier)))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            None => write!(f, "undefined"),
            Some(p) => {
                write!(f, "{}.{}.{}", p.major, p.minor, p.micro)?;
                if !p.qualifier.is_empty() {
                    write!(f, ".{}", p.qualifier)?;
                }
                Ok(())
            }
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_segment_counts() {
        assert_eq!(Version::parse("").unwrap(), Version::empty());
        assert_eq!(Version::parse("1").unwrap().to_string(), "1.0.0");
        assert_eq!(Version::parse("1.2").unwrap().to_string(), "1.2.0");
        assert_eq!(Version::parse("1.2.3").unwrap().to_string(), "1.2.3");
        assert_eq!(Version::parse("1.2.3.beta-1").unwrap().to_string(), "1.2.3.beta-1");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Version::parse("1.2.3.4.5").is_err());
        assert!(Version::parse("a.b.c").is_err());
        assert!(Version::parse("1.2.3.bad qualifier").is_err());
    }

    #[test]
    fn round_trips_through_display() {
        for v in ["0.0.0", "1.0.0", "1.2.3", "1.2.3.qual_1-2"] {
            let parsed = Version::parse(v).unwrap();
            assert_eq!(parsed.to_string(), v);
        }
    }

    #[test]
    fn empty_orders_below_everything_defined() {
        let empty = Version::empty();
        let v1 = Version::parse("0.0.1").unwrap();
        assert_eq!(empty.compare(&v1).unwrap(), std::cmp::Ordering::Less);
    }

    #[test]
    fn undefined_never_compares() {
        let undef = Version::undefined();
        let v1 = Version::parse("1.0.0").unwrap();
        assert!(undef.compare(&v1).is_err());
        assert!(undef.major().is_err());
    }
}
