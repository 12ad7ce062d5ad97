//! Error types for the form engine

use thiserror::Error;

/// Result type for form operations
pub type Result<T> = std::result::Result<T, FormError>;

/// Form engine errors
#[derive(Error, Debug)]
pub enum FormError {
    #[error("Duplicate field name: {name}")]
    DuplicateField { name: String },

    #[error("Invalid field name: {name}")]
    InvalidFieldName { name: String },

    #[error("The {relation} relation is undefined")]
    UndefinedRelation { relation: String },

    #[error("Field {field} carries an incompatible relation binding: {reason}")]
    IncompatibleBinding { field: String, reason: String },

    #[error("Field {field} is missing attribute {attribute}")]
    MissingAttribute { field: String, attribute: String },

    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Error processing relationships: {message}")]
    RelationshipSync {
        message: String,
        #[source]
        source: Box<FormError>,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl FormError {
    /// Wrap a relation-sync failure, preserving the cause
    pub fn relationship_sync(source: FormError) -> Self {
        FormError::RelationshipSync {
            message: source.to_string(),
            source: Box::new(source),
        }
    }
}
