use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Alias -> canonical team name. Versioned so a stored dataset can say which table produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamAliases {
    pub version: u32,
    pub aliases: BTreeMap<String, String>,
}

impl TeamAliases {
    pub fn empty() -> Self {
        Self {
            version: 0,
            aliases: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let pairs = [
            ("Manchester Utd", "Manchester United"),
            ("Man United", "Manchester United"),
            ("Man Utd", "Manchester United"),
            ("Man City", "Manchester City"),
            ("Tottenham", "Tottenham Hotspur"),
            ("Spurs", "Tottenham Hotspur"),
            ("Newcastle Utd", "Newcastle United"),
            ("Newcastle", "Newcastle United"),
        ];
        Self {
            version: 1,
            aliases: pairs
                .into_iter()
                .map(|(a, c)| (a.to_string(), c.to_string()))
                .collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read team aliases {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse team aliases {}", path.display()))
    }

    pub fn with_alias(mut self, alias: &str, canonical: &str) -> Self {
        self.aliases
            .insert(alias.trim().to_string(), canonical.trim().to_string());
        self
    }

    /// Trimmed canonical name; unknown names pass through unchanged.
    pub fn canonical(&self, raw: &str) -> String {
        let name = raw.trim();
        match self.aliases.get(name) {
            Some(canonical) => canonical.clone(),
            None => name.to_string(),
        }
    }
}

impl Default for TeamAliases {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_maps_common_short_names() {
        let aliases = TeamAliases::builtin();
        assert_eq!(aliases.canonical("Man Utd"), "Manchester United");
        assert_eq!(aliases.canonical(" Spurs "), "Tottenham Hotspur");
        assert_eq!(aliases.canonical("Arsenal"), "Arsenal");
    }

    #[test]
    fn load_reads_json_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aliases.json");
        std::fs::write(
            &path,
            r#"{"version":7,"aliases":{"Wolves":"Wolverhampton Wanderers"}}"#,
        )
        .unwrap();
        let aliases = TeamAliases::load(&path).unwrap();
        assert_eq!(aliases.version, 7);
        assert_eq!(aliases.canonical("Wolves"), "Wolverhampton Wanderers");
        assert_eq!(aliases.canonical("Man Utd"), "Man Utd");
    }

    #[test]
    fn injected_alias_extends_table() {
        let aliases = TeamAliases::empty().with_alias("Boro", "Middlesbrough");
        assert_eq!(aliases.canonical("Boro"), "Middlesbrough");
    }
}
