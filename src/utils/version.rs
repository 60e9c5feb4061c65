//! Semantic version comparison
//!
//! The Ledger apps report versions like "1.5.3"; the minimum-version gate
//! needs a numeric comparison, not string equality ("1.10.0" > "1.9.9").

use crate::error::{AnthemError, AnthemResult};

/// Parse a "major.minor.patch" version string. Tolerates a leading 'v'
/// and a pre-release suffix after '-'; missing components default to 0.
pub fn parse_version(version: &str) -> AnthemResult<(u32, u32, u32)> {
    let trimmed = version.trim().trim_start_matches('v');
    let core = trimmed.split('-').next().unwrap_or("");

    if core.is_empty() {
        return Err(AnthemError::parse_error(format!(
            "Invalid version string: '{}'",
            version
        )));
    }

    let mut parts = core.split('.');
    let mut component = |name: &str| -> AnthemResult<u32> {
        match parts.next() {
            None => Ok(0),
            Some(p) => p.parse::<u32>().map_err(|_| {
                AnthemError::parse_error(format!(
                    "Invalid {} component in version '{}'",
                    name, version
                ))
            }),
        }
    };

    let major = component("major")?;
    let minor = component("minor")?;
    let patch = component("patch")?;
    Ok((major, minor, patch))
}

/// Whether `actual` satisfies the `required` minimum
pub fn is_at_least(actual: &str, required: &str) -> AnthemResult<bool> {
    Ok(parse_version(actual)? >= parse_version(required)?)
}
