//! Field schema model
//!
//! A form schema is an ordered tree of [`FieldDescriptor`] nodes. Each node
//! names one field, its kind, and a kind-specific attribute bag; repeater and
//! group nodes nest a sub-schema under `attribute.fields`. The tree is built
//! once per request and is immutable for the duration of a save, update, or
//! projection call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Untyped submitted form payload, mirroring the schema shape
///
/// The top-level `translations` key is reserved for a map of language code to
/// per-language field values. Single-file fields may carry a sibling
/// `<name>_alt` key with alt text.
pub type SubmittedPayload = Map<String, Value>;

/// Kind of form field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Single-line scalar input (text, number, email, url, date)
    Input,
    /// Multi-line scalar input
    Textarea,
    /// Boolean switch
    Toggle,
    /// Single choice, optionally backed by a Reference relation
    Select,
    /// Multiple choice, optionally backed by an Association relation
    MultiSelect,
    /// One file attached to a named slot on the record
    SingleFile,
    /// File list metadata (no slot sync)
    Media,
    /// Repeating sub-schema backed by an owned-children relation
    Repeater,
    /// Non-repeating sub-schema stored through the custom-field service
    Group,
    /// Programmable field stored through the custom-field service
    Custom,
}

impl FieldKind {
    /// Whether values of this kind live in a file slot rather than a column
    pub fn is_file(&self) -> bool {
        matches!(self, FieldKind::SingleFile | FieldKind::Media)
    }

    /// Whether this kind nests a sub-schema under `attribute.fields`
    pub fn is_nested(&self) -> bool {
        matches!(self, FieldKind::Repeater | FieldKind::Group)
    }

    /// Whether this kind is persisted through the custom-field service
    pub fn is_custom_stored(&self) -> bool {
        matches!(self, FieldKind::Group | FieldKind::Custom)
    }

    /// Relation kinds a binding on this field may declare
    pub fn compatible_bindings(&self) -> &'static [RelationKind] {
        match self {
            FieldKind::Select | FieldKind::MultiSelect => {
                &[RelationKind::Reference, RelationKind::Association]
            }
            FieldKind::Repeater | FieldKind::Group => {
                &[RelationKind::OwnedChildren, RelationKind::Association]
            }
            _ => &[],
        }
    }
}

/// Kind of relation a field binds to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Many-to-one
    Reference,
    /// Many-to-many
    Association,
    /// One-to-many with fully owned child rows
    OwnedChildren,
}

/// Declared mapping between a field and a record relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationBinding {
    /// Relation kind the field expects
    pub kind: RelationKind,

    /// Relation accessor name on the record
    pub relation: String,

    /// Display path for option labels; a dotted path (`relation.field`)
    /// resolves through the target's per-language rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Key matching submitted repeater items to relation rows when the bound
    /// relation is an association; defaults to the relation's foreign key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_key: Option<String>,
}

impl RelationBinding {
    /// Create a binding of the given kind
    pub fn new(kind: RelationKind, relation: impl Into<String>) -> Self {
        Self {
            kind,
            relation: relation.into(),
            label: None,
            correlation_key: None,
        }
    }
}

/// One selectable option on a select or multi-select field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Stored value, usually the target record's key
    pub value: Value,
    /// Resolved display string
    pub label: String,
}

/// Accepted image resolution bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    #[serde(rename = "minWidth")]
    pub min_width: u32,
    #[serde(rename = "maxWidth")]
    pub max_width: u32,
    #[serde(rename = "minHeight")]
    pub min_height: u32,
    #[serde(rename = "maxHeight")]
    pub max_height: u32,
}

/// Kind-specific field configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_required: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    /// Input subtype: text, url, date, number, email, phone
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,

    #[serde(rename = "defaultValue", default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Numeric lower bound, or repeater minimum item count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,

    /// Numeric upper bound, or repeater maximum item count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,

    #[serde(rename = "minLength", default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,

    #[serde(rename = "maxLength", default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub searchable: Option<bool>,

    /// Accepted mime types for file kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<Vec<String>>,

    /// Maximum file size in KB
    #[serde(rename = "fileSize", default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,

    /// Nested sub-schema for repeater and group kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldDescriptor>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<RelationBinding>,

    /// Explicit validation rules, fully overriding the derived defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<String>>,

    /// Storage key for group kinds
    #[serde(rename = "keyName", default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,

    /// Uninterpreted extras for programmable fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FieldAttributes {
    /// Default attribute bag for a field kind
    pub fn defaults_for(kind: FieldKind) -> Self {
        let mut attrs = FieldAttributes::default();
        match kind {
            FieldKind::Input => {
                attrs.input_type = Some("text".to_string());
                attrs.is_required = Some(false);
                attrs.placeholder = Some(String::new());
                attrs.caption = Some(String::new());
                attrs.default_value = Some(Value::String(String::new()));
                attrs.value = Some(Value::String(String::new()));
            }
            FieldKind::Textarea => {
                attrs.rows = Some(5);
                attrs.cols = Some(50);
                attrs.is_required = Some(false);
                attrs.placeholder = Some(String::new());
                attrs.caption = Some(String::new());
                attrs.default_value = Some(Value::String(String::new()));
                attrs.value = Some(Value::String(String::new()));
            }
            FieldKind::Toggle => {
                attrs.is_required = Some(false);
                attrs.default_value = Some(Value::Bool(false));
                attrs.value = Some(Value::Bool(false));
                attrs.caption = Some(String::new());
            }
            FieldKind::Select | FieldKind::MultiSelect => {
                attrs.options = Some(Vec::new());
                attrs.default_value = Some(Value::String(String::new()));
                attrs.value = Some(Value::String(String::new()));
                attrs.is_required = Some(false);
                attrs.placeholder = Some(String::new());
                attrs.caption = Some(String::new());
            }
            FieldKind::SingleFile => {
                attrs.accept = Some(vec!["image/png".to_string(), "image/jpeg".to_string()]);
                attrs.file_size = Some(1024);
                attrs.resolution = Some(Resolution {
                    min_width: 100,
                    max_width: 1000,
                    min_height: 100,
                    max_height: 1000,
                });
                attrs.is_required = Some(false);
                attrs.caption = Some(String::new());
            }
            FieldKind::Media => {
                attrs.accept = Some(vec!["application/pdf".to_string()]);
                attrs.file_size = Some(1024);
                attrs.is_required = Some(false);
                attrs.caption = Some(String::new());
            }
            FieldKind::Repeater | FieldKind::Group => {
                attrs.min = Some(1);
                attrs.max = Some(5);
                attrs.fields = Some(Vec::new());
            }
            FieldKind::Custom => {}
        }
        attrs
    }
}

/// Declarative schema node describing one form field
///
/// Serializes to `{name, label, field, multilanguage, attribute}`, the wire
/// shape consumed by form renderers and produced by schema factories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name, unique within its sibling level
    pub name: String,

    /// Display label; derived from the name when empty
    #[serde(default)]
    pub label: String,

    /// Field kind tag
    #[serde(rename = "field")]
    pub kind: FieldKind,

    /// Whether values are stored per configured language
    #[serde(default)]
    pub multilanguage: bool,

    /// Kind-specific configuration
    #[serde(default)]
    pub attribute: FieldAttributes,
}

impl FieldDescriptor {
    /// Create a descriptor with the default attributes for its kind
    pub fn new(kind: FieldKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: String::new(),
            kind,
            multilanguage: false,
            attribute: FieldAttributes::defaults_for(kind),
        }
    }

    /// Scalar input field
    pub fn input(name: impl Into<String>) -> Self {
        Self::new(FieldKind::Input, name)
    }

    /// Multi-line input field
    pub fn textarea(name: impl Into<String>) -> Self {
        Self::new(FieldKind::Textarea, name)
    }

    /// Boolean toggle field
    pub fn toggle(name: impl Into<String>) -> Self {
        Self::new(FieldKind::Toggle, name)
    }

    /// Single-choice field
    pub fn select(name: impl Into<String>) -> Self {
        Self::new(FieldKind::Select, name)
    }

    /// Multi-choice field
    pub fn multi_select(name: impl Into<String>) -> Self {
        Self::new(FieldKind::MultiSelect, name)
    }

    /// Single-file slot field
    pub fn single_file(name: impl Into<String>) -> Self {
        Self::new(FieldKind::SingleFile, name)
    }

    /// File list field
    pub fn media(name: impl Into<String>) -> Self {
        Self::new(FieldKind::Media, name)
    }

    /// Repeating sub-schema field
    pub fn repeater(name: impl Into<String>) -> Self {
        Self::new(FieldKind::Repeater, name)
    }

    /// Custom-field group with a storage key
    pub fn group(name: impl Into<String>, key_name: impl Into<String>) -> Self {
        let mut field = Self::new(FieldKind::Group, name);
        field.attribute.key_name = Some(key_name.into());
        field
    }

    /// Programmable field
    pub fn custom(name: impl Into<String>) -> Self {
        Self::new(FieldKind::Custom, name)
    }

    /// Set the display label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Mark the field required
    pub fn required(mut self) -> Self {
        self.attribute.is_required = Some(true);
        self
    }

    /// Store values per configured language
    pub fn multilanguage(mut self) -> Self {
        self.multilanguage = true;
        self
    }

    /// Set the placeholder text
    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.attribute.placeholder = Some(placeholder.into());
        self
    }

    /// Set the caption text
    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.attribute.caption = Some(caption.into());
        self
    }

    /// Set the input subtype (text, number, email, url, date, phone)
    pub fn input_type(mut self, ty: impl Into<String>) -> Self {
        self.attribute.input_type = Some(ty.into());
        self
    }

    /// Set the default value
    pub fn default_value(mut self, value: Value) -> Self {
        self.attribute.default_value = Some(value);
        self
    }

    /// Set explicit validation rules, overriding the derived defaults
    pub fn rules(mut self, rules: Vec<String>) -> Self {
        self.attribute.rules = Some(rules);
        self
    }

    /// Set literal select options
    pub fn options(mut self, options: Vec<SelectOption>) -> Self {
        self.attribute.options = Some(options);
        self
    }

    /// Set the nested sub-schema for repeater and group kinds
    pub fn fields(mut self, fields: Vec<FieldDescriptor>) -> Self {
        self.attribute.fields = Some(fields);
        self
    }

    /// Load select options from a relation on the record
    ///
    /// Select fields bind a Reference, multi-selects an Association. `label`
    /// names the attribute (or dotted per-language path) used for the option
    /// display string.
    pub fn options_from_relation(
        mut self,
        relation: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        let kind = match self.kind {
            FieldKind::MultiSelect => RelationKind::Association,
            _ => RelationKind::Reference,
        };
        let mut binding = RelationBinding::new(kind, relation);
        binding.label = Some(label.into());
        self.attribute.relation = Some(binding);
        self
    }

    /// Bind a repeater to an owned-children relation
    ///
    /// Child rows are fully replaced on every save; child keys are not stable
    /// across updates.
    pub fn owns_many(mut self, relation: impl Into<String>) -> Self {
        self.attribute.relation = Some(RelationBinding::new(RelationKind::OwnedChildren, relation));
        self
    }

    /// Bind a repeater to an association, correlating items by `key`
    pub fn associates(mut self, relation: impl Into<String>, key: Option<String>) -> Self {
        let mut binding = RelationBinding::new(RelationKind::Association, relation);
        binding.correlation_key = key;
        self.attribute.relation = Some(binding);
        self
    }

    /// The declared relation binding, if any
    pub fn binding(&self) -> Option<&RelationBinding> {
        self.attribute.relation.as_ref()
    }

    /// Nested sub-schema, empty for leaf kinds
    pub fn sub_fields(&self) -> &[FieldDescriptor] {
        self.attribute.fields.as_deref().unwrap_or_default()
    }

    /// Display label, derived from the name when unset
    pub fn display_label(&self) -> String {
        if !self.label.is_empty() {
            return self.label.clone();
        }
        humanize(&self.name)
    }

    /// Whether this field maps 1:1 to a record attribute
    pub fn is_scalar(&self) -> bool {
        self.binding().is_none()
            && !self.multilanguage
            && !self.kind.is_file()
            && !self.kind.is_nested()
            && !self.kind.is_custom_stored()
    }

    /// Whether this field contributes to per-language content-variant rows
    pub fn is_translatable(&self) -> bool {
        self.multilanguage
            && self.binding().is_none()
            && !self.kind.is_file()
            && !self.kind.is_nested()
    }
}

/// Title-case a field name for display
fn humanize(name: &str) -> String {
    name.replace(['_', '-'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
