//! Blueprint validation and loading errors.

use thiserror::Error;

/// Errors raised while loading or validating a blueprint.
#[derive(Debug, Error)]
pub enum BlueprintError {
    /// Two resources of the same kind share a name within one scope.
    #[error("duplicate {kind} name '{name}' in blueprint")]
    DuplicateName { kind: &'static str, name: String },

    /// A resource has an empty or whitespace-only name.
    #[error("blueprint {kind} has an empty name")]
    EmptyName { kind: &'static str },

    /// An overwrite references a role the blueprint does not declare.
    #[error("overwrite references unknown role '{name}'")]
    UnknownRole { name: String },

    /// The blueprint file could not be read.
    #[error("failed to read blueprint file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The blueprint file is not valid TOML.
    #[error("failed to parse blueprint: {0}")]
    Parse(#[from] toml::de::Error),
}
