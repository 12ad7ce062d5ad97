//! Storage collaborator interfaces
//!
//! The engine never talks to a database directly: it drives these traits,
//! which the host storage layer implements. All calls are synchronous and
//! assumed to run inside a transaction owned by the caller; the engine
//! performs no partial undo of its own.

use std::any::Any;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::LanguageConfig;
use crate::error::Result;
use crate::field::{FieldDescriptor, SubmittedPayload};

/// One per-language content-variant row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRow {
    /// Language code this row belongs to
    pub lang: String,

    /// Field values stored for that language
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl TranslationRow {
    pub fn new(lang: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            lang: lang.into(),
            values,
        }
    }
}

/// A metadata value, optionally tagged with a language
#[derive(Debug, Clone, PartialEq)]
pub struct MetaValue {
    pub lang: Option<String>,
    pub value: Value,
}

/// A stored metadata entry on a record
///
/// Keys may carry a `meta_` prefix that the projector strips before exposing
/// them to the form.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaEntry {
    pub key: String,
    pub values: Vec<MetaValue>,
}

impl MetaEntry {
    /// Whether any stored value carries a language tag
    pub fn is_translated(&self) -> bool {
        self.values.iter().any(|v| v.lang.is_some())
    }

    /// Stored value for a language tag (`None` matches untagged rows)
    pub fn value_for(&self, lang: Option<&str>) -> Option<&Value> {
        self.values
            .iter()
            .find(|v| v.lang.as_deref() == lang)
            .map(|v| &v.value)
    }
}

/// A file known to the file store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    /// Submitted identifier resolving to this file
    pub id: Value,
    pub name: String,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Custom properties carried on a slot attachment
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentProps {
    pub file_id: Value,
    pub alt: Option<String>,
}

/// A file attached to a record slot
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub file_id: Value,
    pub name: String,
    pub url: String,
    pub alt: Option<String>,
}

/// Per-language content-variant rows of one record
pub trait TranslationSet {
    /// All stored rows
    fn rows(&self) -> Vec<TranslationRow>;

    /// The row for one language, if present
    fn row(&self, lang: &str) -> Option<TranslationRow> {
        self.rows().into_iter().find(|r| r.lang == lang)
    }

    /// Delete every stored row, then insert the given set
    fn replace_all(&mut self, rows: Vec<TranslationRow>) -> Result<()>;

    /// Create or update the row for one language
    fn upsert(&mut self, lang: &str, values: Map<String, Value>) -> Result<()>;
}

/// File slots of one record, keyed by field name
pub trait AttachmentSet {
    /// Current attachment in a slot
    fn find(&self, slot: &str) -> Option<Attachment>;

    /// Detach whatever occupies a slot
    fn remove(&mut self, slot: &str) -> Result<()>;

    /// Attach a file to a slot with custom properties
    fn attach(&mut self, slot: &str, file: &StoredFile, props: AttachmentProps) -> Result<()>;
}

/// Many-to-one relation handle
pub trait ReferenceRelation {
    /// Resolve a submitted id to a target key, if the target exists
    fn find_candidate(&self, id: &Value) -> Result<Option<Value>>;

    /// Point the foreign key at a target, or clear it
    fn associate(&mut self, target: Option<Value>) -> Result<()>;

    /// Currently associated target key
    fn target_id(&self) -> Result<Option<Value>>;

    /// Selectable target records (option source)
    fn candidates(&self) -> Result<Vec<Box<dyn Record>>>;
}

/// Many-to-many relation handle
pub trait AssociationRelation {
    /// Replace the membership set with exactly the given ids
    fn sync(&mut self, ids: Vec<Value>) -> Result<()>;

    /// Replace membership with an id-keyed attribute map, in order
    fn sync_with_values(&mut self, entries: Vec<(Value, Map<String, Value>)>) -> Result<()>;

    /// Currently related records, carrying pivot values when present
    fn related(&self) -> Result<Vec<Box<dyn Record>>>;

    /// Selectable target records (option source)
    fn candidates(&self) -> Result<Vec<Box<dyn Record>>>;

    /// Natural key correlating submitted items to membership rows
    fn foreign_key(&self) -> String;
}

/// One-to-many relation handle whose child rows the parent fully owns
///
/// Children are replaced wholesale on every sync; child keys are not stable
/// across saves.
pub trait OwnedChildrenRelation {
    /// Foreign key column pointing back at the parent
    fn foreign_key(&self) -> String;

    /// Delete every existing child row
    fn delete_all(&mut self) -> Result<()>;

    /// Create and save one child row from the given values
    fn create(&mut self, values: Map<String, Value>) -> Result<Box<dyn Record>>;

    /// Current child rows, in stored order
    fn children(&self) -> Result<Vec<Box<dyn Record>>>;
}

/// Kind-tagged relation handle returned by [`Record::relation`]
pub enum Relation {
    Reference(Box<dyn ReferenceRelation>),
    Association(Box<dyn AssociationRelation>),
    OwnedChildren(Box<dyn OwnedChildrenRelation>),
}

/// Opaque persisted entity handle exposed by the host storage layer
///
/// Capability accessors return `None` when the backing entity does not
/// support the capability; the engine skips the corresponding sync step.
pub trait Record {
    /// Primary key, present once saved
    fn key(&self) -> Option<Value>;

    /// Read a scalar attribute
    fn get_attr(&self, name: &str) -> Option<Value>;

    /// Assign a scalar attribute
    fn set_attr(&mut self, name: &str, value: Value);

    /// Persist pending attribute and foreign-key changes
    fn save(&mut self) -> Result<()>;

    /// Relation accessor by name
    fn relation(&self, name: &str) -> Option<Relation>;

    /// Per-language content-variant rows
    fn translations(&self) -> Option<Box<dyn TranslationSet>>;

    /// File slots
    fn attachments(&self) -> Option<Box<dyn AttachmentSet>>;

    /// Stored metadata entries
    fn meta_entries(&self) -> Option<Vec<MetaEntry>>;

    /// Pivot values when this record was read through an association
    fn pivot_values(&self) -> Option<Map<String, Value>>;

    /// Whether dynamic custom-field rows can be stored for this record
    fn supports_custom_fields(&self) -> bool;
}

/// Factory and lookup for records of one entity type
pub trait EntityStore {
    /// A fresh unsaved record
    fn new_record(&self) -> Box<dyn Record>;

    /// Look up a persisted record by key
    fn find(&self, id: &Value) -> Option<Box<dyn Record>>;
}

/// Resolve-by-id file lookup
pub trait FileStore {
    /// Resolve a submitted identifier to a stored file
    fn find(&self, id: &Value) -> Option<StoredFile>;

    /// Stamp alt text on the media backing a stored file
    ///
    /// Returns `false` when the backing media is missing; the caller logs a
    /// warning and skips the value.
    fn stamp_alt(&self, file_id: &Value, alt: &str) -> Result<bool>;
}

/// Custom-field values grouped for projection
#[derive(Debug, Clone, Default)]
pub struct CustomFieldValues {
    /// Per-language values, keyed by language code
    pub translations: std::collections::BTreeMap<String, Map<String, Value>>,

    /// Language-independent values
    pub flat: Map<String, Value>,
}

/// External service owning dynamic custom-field rows
pub trait CustomFieldService {
    /// Delete every stored row for a record
    fn delete_for(&self, record: &mut dyn Record) -> Result<()>;

    /// Re-derive and store rows from the payload and the schema's
    /// group/custom fields
    fn rebuild(
        &self,
        record: &mut dyn Record,
        groups: &[FieldDescriptor],
        payload: &SubmittedPayload,
    ) -> Result<()>;

    /// Stored values for projection, split per language
    fn values_for(
        &self,
        record: &dyn Record,
        groups: &[FieldDescriptor],
        languages: &LanguageConfig,
    ) -> Result<CustomFieldValues>;
}

/// Keyed lookup for services injected into resolver callbacks
pub trait DependencyProvider {
    /// Fetch or construct the dependency registered under a key
    fn get(&self, key: &str) -> Option<Rc<dyn Any>>;
}
