//! Blueprint data model and TOML loading.

use common::PanelKind;
use platform::Permission;
use serde::{Deserialize, Serialize};

use crate::error::BlueprintError;

/// A permission overwrite referencing a role by blueprint name.
///
/// Role names are resolved to platform IDs at provisioning time, never here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverwriteSpec {
    pub role: String,
    #[serde(default)]
    pub allow: Vec<Permission>,
    #[serde(default)]
    pub deny: Vec<Permission>,
}

/// A role to provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

/// A channel to provision inside a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    #[serde(default)]
    pub topic: Option<String>,
    /// Channel-level overwrites; they win over category defaults per role.
    #[serde(default)]
    pub overwrites: Vec<OverwriteSpec>,
    /// Kind of panel this channel should host, if any.
    #[serde(default)]
    pub panel: Option<PanelKind>,
}

/// A category and the channels under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    /// Overwrite defaults inherited by every channel in the category.
    #[serde(default)]
    pub overwrites: Vec<OverwriteSpec>,
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,
}

/// The full declarative resource tree for one guild.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub roles: Vec<RoleSpec>,
    #[serde(default)]
    pub categories: Vec<CategorySpec>,
}

impl Blueprint {
    /// Parses a blueprint from TOML text and validates it.
    pub fn from_toml_str(text: &str) -> Result<Self, BlueprintError> {
        let blueprint: Blueprint = toml::from_str(text)?;
        blueprint.validate()?;
        Ok(blueprint)
    }

    /// Loads and validates a blueprint from a TOML file.
    pub fn load(path: &std::path::Path) -> Result<Self, BlueprintError> {
        let text = std::fs::read_to_string(path).map_err(|source| BlueprintError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Returns the channels that carry a panel binding, with their category.
    pub fn panel_channels(&self) -> impl Iterator<Item = (&CategorySpec, &ChannelSpec)> {
        self.categories.iter().flat_map(|category| {
            category
                .channels
                .iter()
                .filter(|c| c.panel.is_some())
                .map(move |c| (category, c))
        })
    }

    /// Checks structural invariants: unique names, no dangling role references.
    pub fn validate(&self) -> Result<(), BlueprintError> {
        let mut role_names = std::collections::HashSet::new();
        for role in &self.roles {
            if role.name.trim().is_empty() {
                return Err(BlueprintError::EmptyName { kind: "role" });
            }
            if !role_names.insert(role.name.as_str()) {
                return Err(BlueprintError::DuplicateName {
                    kind: "role",
                    name: role.name.clone(),
                });
            }
        }

        let mut category_names = std::collections::HashSet::new();
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(BlueprintError::EmptyName { kind: "category" });
            }
            if !category_names.insert(category.name.as_str()) {
                return Err(BlueprintError::DuplicateName {
                    kind: "category",
                    name: category.name.clone(),
                });
            }

            self.check_overwrites(&role_names, &category.overwrites)?;

            let mut channel_names = std::collections::HashSet::new();
            for channel in &category.channels {
                if channel.name.trim().is_empty() {
                    return Err(BlueprintError::EmptyName { kind: "channel" });
                }
                if !channel_names.insert(channel.name.as_str()) {
                    return Err(BlueprintError::DuplicateName {
                        kind: "channel",
                        name: channel.name.clone(),
                    });
                }
                self.check_overwrites(&role_names, &channel.overwrites)?;
            }
        }

        Ok(())
    }

    fn check_overwrites(
        &self,
        role_names: &std::collections::HashSet<&str>,
        overwrites: &[OverwriteSpec],
    ) -> Result<(), BlueprintError> {
        for overwrite in overwrites {
            if !role_names.contains(overwrite.role.as_str()) {
                return Err(BlueprintError::UnknownRole {
                    name: overwrite.role.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[roles]]
        name = "staff"
        permissions = ["manage_messages", "view_channel"]

        [[roles]]
        name = "customer"
        permissions = ["view_channel"]

        [[categories]]
        name = "shop"

        [[categories.overwrites]]
        role = "customer"
        allow = ["view_channel"]
        deny = ["send_messages"]

        [[categories.channels]]
        name = "catalog"
        topic = "Browse the catalog"
        panel = "catalog"

        [[categories.channels]]
        name = "support"
        panel = "support"

        [[categories.channels.overwrites]]
        role = "customer"
        allow = ["view_channel", "send_messages"]
    "#;

    #[test]
    fn parses_sample_toml() {
        let blueprint = Blueprint::from_toml_str(SAMPLE).unwrap();
        assert_eq!(blueprint.roles.len(), 2);
        assert_eq!(blueprint.categories.len(), 1);
        assert_eq!(blueprint.categories[0].channels.len(), 2);
        assert_eq!(
            blueprint.categories[0].channels[0].panel,
            Some(PanelKind::new("catalog"))
        );
        assert_eq!(blueprint.panel_channels().count(), 2);
    }

    #[test]
    fn rejects_duplicate_role_names() {
        let blueprint = Blueprint {
            roles: vec![
                RoleSpec {
                    name: "staff".into(),
                    permissions: vec![],
                },
                RoleSpec {
                    name: "staff".into(),
                    permissions: vec![],
                },
            ],
            categories: vec![],
        };
        assert!(matches!(
            blueprint.validate(),
            Err(BlueprintError::DuplicateName { kind: "role", .. })
        ));
    }

    #[test]
    fn rejects_overwrite_for_unknown_role() {
        let blueprint = Blueprint {
            roles: vec![],
            categories: vec![CategorySpec {
                name: "shop".into(),
                overwrites: vec![OverwriteSpec {
                    role: "ghost".into(),
                    allow: vec![],
                    deny: vec![],
                }],
                channels: vec![],
            }],
        };
        assert!(matches!(
            blueprint.validate(),
            Err(BlueprintError::UnknownRole { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_channel_in_same_category() {
        let blueprint = Blueprint {
            roles: vec![],
            categories: vec![CategorySpec {
                name: "shop".into(),
                overwrites: vec![],
                channels: vec![
                    ChannelSpec {
                        name: "general".into(),
                        topic: None,
                        overwrites: vec![],
                        panel: None,
                    },
                    ChannelSpec {
                        name: "general".into(),
                        topic: None,
                        overwrites: vec![],
                        panel: None,
                    },
                ],
            }],
        };
        assert!(matches!(
            blueprint.validate(),
            Err(BlueprintError::DuplicateName {
                kind: "channel",
                ..
            })
        ));
    }

    #[test]
    fn same_channel_name_allowed_across_categories() {
        let channel = ChannelSpec {
            name: "general".into(),
            topic: None,
            overwrites: vec![],
            panel: None,
        };
        let blueprint = Blueprint {
            roles: vec![],
            categories: vec![
                CategorySpec {
                    name: "a".into(),
                    overwrites: vec![],
                    channels: vec![channel.clone()],
                },
                CategorySpec {
                    name: "b".into(),
                    overwrites: vec![],
                    channels: vec![channel],
                },
            ],
        };
        assert!(blueprint.validate().is_ok());
    }

    #[test]
    fn rejects_empty_names() {
        let blueprint = Blueprint {
            roles: vec![RoleSpec {
                name: "  ".into(),
                permissions: vec![],
            }],
            categories: vec![],
        };
        assert!(matches!(
            blueprint.validate(),
            Err(BlueprintError::EmptyName { kind: "role" })
        ));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        assert!(matches!(
            Blueprint::from_toml_str("roles = 3"),
            Err(BlueprintError::Parse(_))
        ));
    }
}
