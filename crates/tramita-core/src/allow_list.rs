//! Step filter: which procedural steps are worth an update.
//!
//! The allow-list is a flat text file with one step description per line, as
//! the chamber API spells it in `descricaoTramitacao`. Steps missing from the
//! list are informational noise and never become updates.

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use crate::CoreError;

#[derive(Debug, Clone, Default)]
pub struct AllowList {
    descriptions: HashSet<String>,
}

impl AllowList {
    /// Read an allow-list file. Lines are trimmed and blank lines ignored.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::AllowList {
            path: path.to_path_buf(),
            source,
        })?;
        let list = Self::parse(&text);
        info!(path = %path.display(), count = list.len(), "loaded step allow-list");
        Ok(list)
    }

    pub fn parse(text: &str) -> Self {
        Self::from_lines(text.lines())
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let descriptions = lines
            .into_iter()
            .map(|line| line.as_ref().trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();
        Self { descriptions }
    }

    /// Case-sensitive exact membership test.
    pub fn is_promotable(&self, description: &str) -> bool {
        self.descriptions.contains(description)
    }

    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }
}
