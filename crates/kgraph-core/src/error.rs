use thiserror::Error;

/// A hierarchy or data-model artifact (or the settings that point at them)
/// cannot be used. Fatal at construction; nothing is retried.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Malformed {artifact} artifact: {message}")]
    Malformed {
        artifact: &'static str,
        message: String,
    },

    #[error("Kind hierarchy contains a cycle through '{kind}'")]
    Cycle { kind: String },

    #[error("Unknown kind '{kind}' referenced by {context}")]
    UnknownKind { kind: String, context: String },

    #[error("Incompatible declaration of property '{property}' on kind '{kind}': {reason}")]
    IncompatibleProperty {
        kind: String,
        property: String,
        reason: String,
    },

    #[error("Property '{property}' of kind '{kind}' declares unknown value type '{value_type}'")]
    UnknownValueType {
        kind: String,
        property: String,
        value_type: String,
    },

    #[error("Invalid {what} name '{name}'")]
    InvalidName { what: &'static str, name: String },

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("IO error reading {path}: {error}")]
    Io {
        path: String,
        #[source]
        error: std::io::Error,
    },
}

/// The named rule a rejected mutation violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationRule {
    UnknownKind,
    UnknownProperty,
    MissingRequiredProperty,
    TypeMismatch,
    DisallowedRelation,
}

/// A proposed mutation does not conform to the ontology.
///
/// Always recoverable by correcting the input; never retried automatically.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Unknown kind '{kind}'")]
    UnknownKind { kind: String },

    #[error("Property '{property}' is not declared for kind '{kind}'")]
    UnknownProperty { kind: String, property: String },

    #[error("Required property '{property}' of kind '{kind}' is missing")]
    MissingRequiredProperty { kind: String, property: String },

    #[error("Property '{property}' of kind '{kind}' expects {expected}, got {found}")]
    TypeMismatch {
        kind: String,
        property: String,
        expected: String,
        found: String,
    },

    #[error("Relation '{relation_type}' is not allowed from '{source_kind}' to '{target_kind}'")]
    DisallowedRelation {
        relation_type: String,
        source_kind: String,
        target_kind: String,
    },
}

impl ValidationError {
    pub fn rule(&self) -> ValidationRule {
        match self {
            Self::UnknownKind { .. } => ValidationRule::UnknownKind,
            Self::UnknownProperty { .. } => ValidationRule::UnknownProperty,
            Self::MissingRequiredProperty { .. } => ValidationRule::MissingRequiredProperty,
            Self::TypeMismatch { .. } => ValidationRule::TypeMismatch,
            Self::DisallowedRelation { .. } => ValidationRule::DisallowedRelation,
        }
    }
}
