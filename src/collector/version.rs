//! SQL Server product version parsing.
//!
//! `SERVERPROPERTY('ProductVersion')` reports `<major>.<minor>.<build>.<revision>`,
//! e.g. `15.0.2000.5` for SQL Server 2019 RTM.

/// Parsed product version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductVersion {
    pub major: u32,
    pub minor: u32,
    pub build: Option<u32>,
    pub revision: Option<u32>,
}

impl ProductVersion {
    /// Parses a dotted version string.
    ///
    /// Returns `None` unless the first two segments are non-negative integers.
    /// Build and revision are optional and ignored when malformed.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parse_segment(parts.next()?)?;
        let minor = parse_segment(parts.next()?)?;
        let build = parts.next().and_then(parse_segment);
        let revision = parts.next().and_then(parse_segment);

        Some(Self {
            major,
            minor,
            build,
            revision,
        })
    }

    /// `major.minor` as a number, the value published by `mssql_product_version`.
    pub fn gauge_value(&self) -> f64 {
        // "15.10" reads as 15.1, same as the decimal text would.
        format!("{}.{}", self.major, self.minor)
            .parse()
            .unwrap_or(f64::NAN)
    }
}

fn parse_segment(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
