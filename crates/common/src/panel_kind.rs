//! Panel kind names.

use serde::{Deserialize, Serialize};

/// Names a kind of deployable panel (e.g. `"catalog"`, `"support"`).
///
/// Panel kinds are owned by the business features that build their content;
/// the orchestration core treats them as opaque keys into the builder
/// registry and the panel record store. Kinds are stored lowercase so that
/// lookups are case-insensitive at the edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelKind(String);

impl PanelKind {
    /// Creates a panel kind, normalizing to lowercase.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().trim().to_ascii_lowercase())
    }

    /// Returns the kind name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PanelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PanelKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_lowercase() {
        assert_eq!(PanelKind::new(" Catalog "), PanelKind::new("catalog"));
        assert_eq!(PanelKind::new("SUPPORT").as_str(), "support");
    }

    #[test]
    fn serializes_transparently() {
        let kind = PanelKind::new("catalog");
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"catalog\"");
    }
}
