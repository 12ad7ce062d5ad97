//! Form builder facade
//!
//! Turns a literal descriptor list or a factory closure into a validated,
//! immutable schema snapshot, and exposes the engine's operations around it:
//! rule derivation, save/update synchronization, and edit-form projection.
//!
//! A builder starts in template-only mode, where building the schema performs
//! zero storage calls. After [`FormBuilder::load_values`], building performs
//! exactly one candidate fetch per relation-bound select field to populate
//! its option list.

use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::config::LanguageConfig;
use crate::error::{FormError, Result};
use crate::field::{FieldDescriptor, FieldKind, RelationBinding, SelectOption, SubmittedPayload};
use crate::project::Projector;
use crate::resolver::{Operation, ResolveContext};
use crate::rules::{self, RuleMap};
use crate::store::{
    CustomFieldService, DependencyProvider, EntityStore, FileStore, Record, Relation,
};
use crate::sync::Synchronizer;

/// Field names are snake_case identifiers
fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_-]*$").expect("valid name pattern"))
}

/// Schema input: a literal descriptor list or a factory resolved against the
/// request context
pub enum SchemaSource {
    Literal(Vec<FieldDescriptor>),
    Factory(SchemaFactory),
}

/// Factory closure producing a descriptor list from the resolved context
pub type SchemaFactory = Box<dyn Fn(&ResolveContext) -> Vec<FieldDescriptor>>;

/// Override for the default save path
pub type SaveOverride = Box<dyn Fn(&SubmittedPayload) -> Result<Box<dyn Record>>>;

/// Override for the default update path
pub type UpdateOverride = Box<dyn Fn(Box<dyn Record>, &SubmittedPayload) -> Result<Box<dyn Record>>>;

/// Hook invoked after a successful save or update
pub type AfterSaveHook = Box<dyn Fn(&ResolveContext) -> Result<()>>;

impl SchemaSource {
    /// Wrap a factory closure
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&ResolveContext) -> Vec<FieldDescriptor> + 'static,
    {
        SchemaSource::Factory(Box::new(factory))
    }
}

impl From<Vec<FieldDescriptor>> for SchemaSource {
    fn from(fields: Vec<FieldDescriptor>) -> Self {
        SchemaSource::Literal(fields)
    }
}

/// Schema-driven form engine for one entity type
pub struct FormBuilder {
    store: Rc<dyn EntityStore>,
    languages: LanguageConfig,
    files: Option<Rc<dyn FileStore>>,
    custom_fields: Option<Rc<dyn CustomFieldService>>,
    dependencies: Option<Rc<dyn DependencyProvider>>,
    forms: Vec<FieldDescriptor>,
    template_only: bool,
    disabled: bool,
    save_fn: Option<SaveOverride>,
    update_fn: Option<UpdateOverride>,
    after_save: Option<AfterSaveHook>,
    rules: Option<RuleMap>,
}

impl FormBuilder {
    /// Create a builder over an entity store with an explicit language list
    pub fn make(store: Rc<dyn EntityStore>, languages: LanguageConfig) -> Self {
        Self {
            store,
            languages,
            files: None,
            custom_fields: None,
            dependencies: None,
            forms: Vec::new(),
            template_only: true,
            disabled: false,
            save_fn: None,
            update_fn: None,
            after_save: None,
            rules: None,
        }
    }

    pub fn with_file_store(mut self, files: Rc<dyn FileStore>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn with_custom_field_service(mut self, service: Rc<dyn CustomFieldService>) -> Self {
        self.custom_fields = Some(service);
        self
    }

    pub fn with_dependency_provider(mut self, deps: Rc<dyn DependencyProvider>) -> Self {
        self.dependencies = Some(deps);
        self
    }

    /// Leave template-only mode: building the schema eagerly resolves
    /// relation options
    pub fn load_values(mut self) -> Self {
        self.template_only = false;
        self
    }

    /// Mark the form disabled for rendering
    pub fn disable(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// A fresh unsaved record of the underlying entity type
    pub fn prototype(&self) -> Box<dyn Record> {
        self.store.new_record()
    }

    /// Set or generate the form fields
    ///
    /// Accepts a descriptor list or a factory closure; factories resolve
    /// against a bare create-mode context. Use [`FormBuilder::forms_in`] to
    /// supply the real request context.
    pub fn forms(self, source: impl Into<SchemaSource>) -> Result<Self> {
        let ctx = ResolveContext::new(Operation::Create);
        self.forms_in(source, &ctx)
    }

    /// Set or generate the form fields against a resolved context
    pub fn forms_in(mut self, source: impl Into<SchemaSource>, ctx: &ResolveContext) -> Result<Self> {
        let fields = match source.into() {
            SchemaSource::Literal(fields) => fields,
            SchemaSource::Factory(factory) => factory(ctx),
        };
        self.forms = self.build_forms(fields)?;
        self.rules = None;
        Ok(self)
    }

    /// The validated schema snapshot
    pub fn get_forms(&self) -> &[FieldDescriptor] {
        &self.forms
    }

    /// Group and programmable fields, the subset the custom-field service owns
    pub fn custom_field_forms(&self) -> Vec<&FieldDescriptor> {
        self.forms
            .iter()
            .filter(|f| f.kind.is_custom_stored())
            .collect()
    }

    /// Derived validation rules, cached per schema snapshot
    pub fn get_rules(&mut self) -> &RuleMap {
        self.rules
            .get_or_insert_with(|| rules::derive_rules(&self.forms, &self.languages))
    }

    /// Human label per rule key
    pub fn get_resolved_attributes(&mut self) -> std::collections::BTreeMap<String, String> {
        rules::resolved_attributes(self.get_rules())
    }

    /// Set a custom save callback, overriding the default write path
    pub fn save(mut self, save: SaveOverride) -> Self {
        self.save_fn = Some(save);
        self
    }

    /// Set a custom update callback, overriding the default write path
    pub fn update(mut self, update: UpdateOverride) -> Self {
        self.update_fn = Some(update);
        self
    }

    /// Set a hook invoked after every successful save or update with the
    /// resolved context
    pub fn after_save(mut self, hook: AfterSaveHook) -> Self {
        self.after_save = Some(hook);
        self
    }

    /// Create and persist a new record from a validated payload
    pub fn save_form(&self, payload: &SubmittedPayload) -> Result<Box<dyn Record>> {
        let record = match &self.save_fn {
            Some(save) => save(payload)?,
            None => self.synchronizer().save(self.store.as_ref(), payload)?,
        };
        self.run_after_save(Operation::Create, record.as_ref(), payload)?;
        Ok(record)
    }

    /// Update an existing record from a validated payload
    pub fn update_form(
        &self,
        record: Box<dyn Record>,
        payload: &SubmittedPayload,
    ) -> Result<Box<dyn Record>> {
        let record = match &self.update_fn {
            Some(update) => update(record, payload)?,
            None => {
                let mut record = record;
                self.synchronizer().update(record.as_mut(), payload)?;
                record
            }
        };
        self.run_after_save(Operation::Update, record.as_ref(), payload)?;
        Ok(record)
    }

    /// Edit-form value map for a persisted record
    pub fn get_fields(&self, record: &dyn Record) -> Result<SubmittedPayload> {
        let mut projector = Projector::new(&self.forms, &self.languages);
        if let Some(service) = &self.custom_fields {
            projector = projector.with_custom_field_service(service.as_ref());
        }
        projector.get_fields(record)
    }

    fn run_after_save(
        &self,
        operation: Operation,
        record: &dyn Record,
        payload: &SubmittedPayload,
    ) -> Result<()> {
        let Some(hook) = &self.after_save else {
            return Ok(());
        };
        let mut ctx = ResolveContext::new(operation)
            .with_record(record)
            .with_request(payload);
        if let Some(deps) = &self.dependencies {
            ctx = ctx.with_dependencies(deps.as_ref());
        }
        hook(&ctx)
    }

    fn synchronizer(&self) -> Synchronizer<'_> {
        let mut sync = Synchronizer::new(&self.forms, &self.languages);
        if let Some(files) = &self.files {
            sync = sync.with_file_store(files.as_ref());
        }
        if let Some(service) = &self.custom_fields {
            sync = sync.with_custom_field_service(service.as_ref());
        }
        sync
    }

    /// Validate a descriptor list and, outside template-only mode, eagerly
    /// resolve relation options
    fn build_forms(&self, mut fields: Vec<FieldDescriptor>) -> Result<Vec<FieldDescriptor>> {
        validate_schema(&fields)?;

        if self.template_only {
            return Ok(fields);
        }

        for field in &mut fields {
            if !matches!(field.kind, FieldKind::Select | FieldKind::MultiSelect) {
                continue;
            }
            let Some(binding) = field.attribute.relation.clone() else {
                continue;
            };
            field.attribute.options = Some(self.options_from_relation(field, &binding)?);
        }
        Ok(fields)
    }

    /// Resolve a bound relation's target collection into an option list
    fn options_from_relation(
        &self,
        field: &FieldDescriptor,
        binding: &RelationBinding,
    ) -> Result<Vec<SelectOption>> {
        let label = binding.label.as_deref().ok_or_else(|| FormError::MissingAttribute {
            field: field.name.clone(),
            attribute: "relation.label".to_string(),
        })?;

        let prototype = self.store.new_record();
        let Some(relation) = prototype.relation(&binding.relation) else {
            return Err(FormError::UndefinedRelation {
                relation: binding.relation.clone(),
            });
        };

        let candidates = match relation {
            Relation::Reference(reference) => reference.candidates()?,
            Relation::Association(assoc) => assoc.candidates()?,
            Relation::OwnedChildren(_) => {
                return Err(FormError::IncompatibleBinding {
                    field: field.name.clone(),
                    reason: "owned-children relation cannot feed select options".to_string(),
                })
            }
        };

        Ok(candidates
            .iter()
            .map(|item| SelectOption {
                value: item.key().unwrap_or(Value::Null),
                label: self.resolve_label(item.as_ref(), label),
            })
            .collect())
    }

    /// Resolve an option label, falling back to a placeholder when the
    /// target value is missing
    fn resolve_label(&self, item: &dyn Record, label: &str) -> String {
        if let Some((_, field)) = label.split_once('.') {
            // Dotted path: per-language lookup for the default language
            let value = item
                .translations()
                .and_then(|t| t.row(&self.languages.default_language))
                .and_then(|row| row.values.get(field).cloned());
            return display_string(value);
        }
        display_string(item.get_attr(label))
    }
}

/// Validate descriptor names and relation bindings, recursively
///
/// Pure structural checks only: no storage calls, so template-only builds
/// stay storage-free.
pub fn validate_schema(fields: &[FieldDescriptor]) -> Result<()> {
    let mut seen = std::collections::BTreeSet::new();

    for field in fields {
        if !name_pattern().is_match(&field.name) {
            return Err(FormError::InvalidFieldName {
                name: field.name.clone(),
            });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(FormError::DuplicateField {
                name: field.name.clone(),
            });
        }

        if let Some(binding) = field.binding() {
            let compatible = field.kind.compatible_bindings();
            if !compatible.contains(&binding.kind) {
                return Err(FormError::IncompatibleBinding {
                    field: field.name.clone(),
                    reason: format!("{:?} does not accept {:?} bindings", field.kind, binding.kind),
                });
            }
        }

        if field.kind == FieldKind::Group && field.attribute.key_name.is_none() {
            return Err(FormError::MissingAttribute {
                field: field.name.clone(),
                attribute: "keyName".to_string(),
            });
        }

        validate_schema(field.sub_fields())?;
    }

    Ok(())
}

/// Render an option label value, with a placeholder for missing targets
fn display_string(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => "—".to_string(),
    }
}
