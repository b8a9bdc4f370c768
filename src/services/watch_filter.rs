//! Watched-fleet predicate, applied after classification and before tracking

use crate::domain::types::Position;

#[derive(Debug, Clone, PartialEq)]
pub struct WatchFilter {
    name_prefixes: Vec<String>,
    flags: Vec<String>,
}

impl WatchFilter {
    /// Prefixes and flags are compared case-insensitively
    pub fn new(name_prefixes: &[String], flags: &[String]) -> Self {
        Self {
            name_prefixes: name_prefixes
                .iter()
                .map(|p| p.trim().to_uppercase())
                .filter(|p| !p.is_empty())
                .collect(),
            flags: flags
                .iter()
                .map(|f| f.trim().to_uppercase())
                .filter(|f| !f.is_empty())
                .collect(),
        }
    }

    /// Matches every vessel
    pub fn all() -> Self {
        Self { name_prefixes: vec![String::new()], flags: Vec::new() }
    }

    pub fn is_watched(&self, position: &Position) -> bool {
        let name = position.name.to_uppercase();
        if self.name_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            return true;
        }
        position
            .flag
            .as_deref()
            .map(|f| f.trim().to_uppercase())
            .is_some_and(|f| self.flags.iter().any(|w| *w == f))
    }
}

impl Default for WatchFilter {
    fn default() -> Self {
        Self::new(&["CHINACOASTGUARD".to_string()], &[])
    }
}
