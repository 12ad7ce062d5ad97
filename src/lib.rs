//! Formsync Engine
//!
//! A schema-driven synchronization engine that turns a declarative,
//! tree-shaped field schema into a bidirectional mapping between submitted
//! form payloads and a persisted entity graph: scalar attributes,
//! per-language content variants, single-file attachments, and related
//! child or sibling records.
//!
//! ## Features
//!
//! - **Declarative Schemas**: an ordered `FieldDescriptor` tree with a closed
//!   set of field kinds, matched exhaustively on both the write and read path
//! - **Bidirectional Mapping**: `save_form`/`update_form` persist a payload,
//!   `get_fields` projects the record back into the payload shape
//! - **Full-Replace Policy**: translations, custom fields and owned children
//!   are deleted and recreated on every save
//! - **Reflection-Free Callbacks**: factories and hooks receive a typed
//!   context with named optional slots instead of runtime introspection
//! - **Derived Validation**: one deterministic walk produces the rule map
//!   consumed by the external validation engine
//!
//! ## Architecture
//!
//! ```text
//! controller (external)
//! ├── FormBuilder::forms(...)      build + validate the schema snapshot
//! ├── get_rules()                  derive the validation-rule map
//! ├── save_form(payload)           Synchronizer: scalars → translations
//! │                                → files → custom fields → relations
//! └── get_fields(record)           Projector: the structural inverse
//! ```
//!
//! Storage, file and custom-field collaborators are traits in [`store`];
//! the engine runs single-threaded inside the caller's transaction and
//! performs no partial undo of its own.

pub mod builder;
pub mod config;
pub mod error;
pub mod field;
pub mod project;
pub mod resolver;
pub mod rules;
pub mod store;
pub mod sync;

pub use builder::{FormBuilder, SchemaSource};
pub use config::{Language, LanguageConfig};
pub use error::{FormError, Result};
pub use field::{
    FieldAttributes, FieldDescriptor, FieldKind, RelationBinding, RelationKind, Resolution,
    SelectOption, SubmittedPayload,
};
pub use project::Projector;
pub use resolver::{ContextValue, Operation, Param, ParamType, RequestInfo, ResolveContext};
pub use rules::{derive_rules, resolved_attributes, RuleMap};
pub use store::{
    AssociationRelation, Attachment, AttachmentProps, AttachmentSet, CustomFieldService,
    CustomFieldValues, DependencyProvider, EntityStore, FileStore, MetaEntry, MetaValue,
    OwnedChildrenRelation, Record, ReferenceRelation, Relation, StoredFile, TranslationRow,
    TranslationSet,
};
pub use sync::Synchronizer;
