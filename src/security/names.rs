//! Platform filename restrictions.
//!
//! The forbidden-character and reserved-name sets are compile-time
//! constants selected by build target; they are not user-configurable.

use crate::error::ExtractError;
use crate::error::Result;

/// Longest permitted path component, exclusive.
const MAX_COMPONENT_LEN: usize = 256;

/// Characters forbidden in a path component on non-Windows targets.
#[cfg(not(windows))]
const FORBIDDEN_CHARS: &[char] = &[
    '\0', ':', '/', '\\', '<', '>', '|', '!', '?', '*', '\'', '"', '&', '^', '$', '`',
];

/// Characters forbidden in a path component on Windows.
#[cfg(windows)]
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Validates every component of a slash-separated entry name.
///
/// Rejects empty names, bare `.` and `..`, over-long components, and any
/// component matching the platform's forbidden-character or reserved-name
/// set.
pub fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "empty name"));
    }
    if name == "." || name == ".." {
        return Err(invalid(name, "refers to the destination root or above"));
    }
    for component in name.split('/') {
        if component == "." || component == ".." || component.is_empty() {
            continue; // removed by cleaning; handled by the traversal check
        }
        check_component(component)?;
    }
    Ok(())
}

/// Validates a single path component against the platform rules.
pub fn check_component(component: &str) -> Result<()> {
    if component.len() >= MAX_COMPONENT_LEN {
        return Err(invalid(component, "component too long"));
    }
    if let Some(reason) = platform_violation(component) {
        return Err(invalid(component, reason));
    }
    Ok(())
}

#[cfg(not(windows))]
fn platform_violation(component: &str) -> Option<&'static str> {
    if component.chars().any(|c| FORBIDDEN_CHARS.contains(&c)) {
        return Some("forbidden character");
    }
    None
}

#[cfg(windows)]
fn platform_violation(component: &str) -> Option<&'static str> {
    if component
        .chars()
        .any(|c| c <= '\u{1F}' || FORBIDDEN_CHARS.contains(&c))
    {
        return Some("forbidden character");
    }
    if is_reserved_name(component) {
        return Some("reserved name");
    }
    if component.chars().all(|c| c == ' ' || c == '.') {
        return Some("name is only spaces and dots");
    }
    None
}

/// Windows reserved device names, case-insensitive.
#[cfg(windows)]
fn is_reserved_name(component: &str) -> bool {
    let upper = component.to_ascii_uppercase();
    if matches!(upper.as_str(), "CON" | "PRN" | "AUX" | "NUL") {
        return true;
    }
    for prefix in ["COM", "LPT"] {
        if let Some(rest) = upper.strip_prefix(prefix)
            && !rest.is_empty()
            && rest.bytes().all(|b| b.is_ascii_digit())
        {
            return true;
        }
    }
    false
}

fn invalid(name: &str, reason: &'static str) -> ExtractError {
    ExtractError::InvalidName {
        name: name.to_owned(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_pass() {
        assert!(check_name("file.txt").is_ok());
        assert!(check_name("dir/sub/file").is_ok());
        assert!(check_name("with spaces").is_ok());
        assert!(check_name("unicode-\u{e9}\u{1f4c1}").is_ok());
    }

    #[test]
    fn test_empty_and_dot_names_rejected() {
        assert!(check_name("").is_err());
        assert!(check_name(".").is_err());
        assert!(check_name("..").is_err());
    }

    #[test]
    fn test_overlong_component_rejected() {
        let long = "a".repeat(256);
        assert!(check_name(&long).is_err());
        let just_under = "a".repeat(255);
        assert!(check_name(&just_under).is_ok());
    }

    #[test]
    #[cfg(not(windows))]
    fn test_unix_forbidden_characters() {
        for bad in ["a:b", "pipe|name", "wild*card", "ex!claim", "qu'ote", "back`tick", "dollar$"] {
            assert!(check_name(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    #[cfg(not(windows))]
    fn test_unix_null_byte_rejected() {
        assert!(check_name("nul\0byte").is_err());
    }

    #[test]
    #[cfg(windows)]
    fn test_windows_reserved_names() {
        for bad in ["CON", "con", "PRN", "aux", "NUL", "COM1", "lpt9", "COM42"] {
            assert!(check_name(bad).is_err(), "{bad} should be rejected");
        }
        assert!(check_name("CONSOLE").is_ok());
        assert!(check_name("COMX").is_ok());
    }

    #[test]
    #[cfg(windows)]
    fn test_windows_spaces_and_dots_rejected() {
        assert!(check_name(" . .").is_err());
        assert!(check_name("...").is_err());
    }
}
