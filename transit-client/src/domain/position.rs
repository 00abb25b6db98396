//! Platform/track designations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A platform, track or bay at a station.
///
/// Backends prefix these inconsistently ("Gleis 4", "Bstg. 2", "Bussteig C");
/// [`Position::parse`] strips the redundant prefixes so the remaining text
/// is just the designation riders look for on signage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    section: Option<String>,
}

const PREFIXES: &[&str] = &["gleis", "gl.", "bstg.", "bussteig", "bahnsteig", "platform", "pos."];

impl Position {
    /// Normalize a raw platform string. Returns `None` for empty or
    /// whitespace-only input.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut s = raw.trim();
        if s.is_empty() {
            return None;
        }
        let lower = s.to_lowercase();
        for prefix in PREFIXES {
            if lower.starts_with(prefix) {
                s = s[prefix.len()..].trim_start();
                break;
            }
        }
        if s.is_empty() {
            return None;
        }
        // "4 A-D" style section suffixes are split off.
        if let Some((head, tail)) = s.split_once(' ')
            && !head.is_empty()
            && head.chars().all(|c| c.is_ascii_alphanumeric())
            && tail.contains('-')
        {
            return Some(Self {
                name: head.to_string(),
                section: Some(tail.to_string()),
            });
        }
        Some(Self {
            name: s.to_string(),
            section: None,
        })
    }

    /// The platform designation itself.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Platform section (e.g. carriage range), when the backend supplied one.
    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.section {
            Some(section) => write!(f, "{} {}", self.name, section),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_gleis_prefix() {
        assert_eq!(Position::parse("Gleis 4").unwrap().name(), "4");
        assert_eq!(Position::parse("gleis 16").unwrap().name(), "16");
    }

    #[test]
    fn strips_bussteig_prefix() {
        assert_eq!(Position::parse("Bussteig C").unwrap().name(), "C");
        assert_eq!(Position::parse("Bstg. 2").unwrap().name(), "2");
    }

    #[test]
    fn bare_designation_kept() {
        assert_eq!(Position::parse("4a").unwrap().name(), "4a");
        assert_eq!(Position::parse("12").unwrap().name(), "12");
    }

    #[test]
    fn empty_is_none() {
        assert!(Position::parse("").is_none());
        assert!(Position::parse("   ").is_none());
        assert!(Position::parse("Gleis ").is_none());
    }

    #[test]
    fn section_split() {
        let p = Position::parse("Gleis 4 A-D").unwrap();
        assert_eq!(p.name(), "4");
        assert_eq!(p.section(), Some("A-D"));
        assert_eq!(p.to_string(), "4 A-D");
    }

    #[test]
    fn whitespace_trimmed() {
        assert_eq!(Position::parse("  7  ").unwrap().name(), "7");
    }
}
