//! Request-to-record synchronization
//!
//! The write path of the engine. One [`Synchronizer::save`] or
//! [`Synchronizer::update`] call runs the following fixed sequence against a
//! record, inside a transaction owned by the caller:
//!
//! 1. scalar attributes
//! 2. per-language content-variant rows (full replace)
//! 3. single-file slots
//! 4. custom-field rows (full replace)
//! 5. relations
//! 6. final save, committing scalars and foreign keys
//!
//! Translations, custom fields and owned children are replaced wholesale on
//! every call. Any relation-sync failure is logged and rethrown wrapped; the
//! caller rolls the transaction back.

use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::config::LanguageConfig;
use crate::error::{FormError, Result};
use crate::field::{FieldDescriptor, FieldKind, SubmittedPayload};
use crate::store::{
    AttachmentProps, CustomFieldService, EntityStore, FileStore, OwnedChildrenRelation, Record,
    Relation, TranslationRow,
};

/// The write path: maps a submitted payload onto a record graph
pub struct Synchronizer<'a> {
    fields: &'a [FieldDescriptor],
    languages: &'a LanguageConfig,
    files: Option<&'a dyn FileStore>,
    custom_fields: Option<&'a dyn CustomFieldService>,
}

impl<'a> Synchronizer<'a> {
    pub fn new(fields: &'a [FieldDescriptor], languages: &'a LanguageConfig) -> Self {
        Self {
            fields,
            languages,
            files: None,
            custom_fields: None,
        }
    }

    pub fn with_file_store(mut self, files: &'a dyn FileStore) -> Self {
        self.files = Some(files);
        self
    }

    pub fn with_custom_field_service(mut self, service: &'a dyn CustomFieldService) -> Self {
        self.custom_fields = Some(service);
        self
    }

    /// Create and persist a new record from a payload
    pub fn save(
        &self,
        store: &dyn EntityStore,
        payload: &SubmittedPayload,
    ) -> Result<Box<dyn Record>> {
        let mut record = store.new_record();
        self.apply(record.as_mut(), payload)?;
        Ok(record)
    }

    /// Update an existing record from a payload
    pub fn update(&self, record: &mut dyn Record, payload: &SubmittedPayload) -> Result<()> {
        self.apply(record, payload)
    }

    fn apply(&self, record: &mut dyn Record, payload: &SubmittedPayload) -> Result<()> {
        self.sync_scalars(record, payload)?;
        self.sync_translations(record, payload)?;
        self.sync_files(record, payload)?;
        self.sync_custom_fields(record, payload)?;

        if let Err(source) = self.sync_relations(record, payload) {
            let schema: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
            error!(
                record = ?record.key(),
                schema = ?schema,
                message = %source,
                "error processing relationships"
            );
            return Err(FormError::relationship_sync(source));
        }

        record.save()
    }

    /// Step 1: copy submitted values for plain scalar fields and persist, so
    /// later steps can reference the record's key
    fn sync_scalars(&self, record: &mut dyn Record, payload: &SubmittedPayload) -> Result<()> {
        for field in self.fields.iter().filter(|f| f.is_scalar()) {
            if let Some(value) = payload.get(&field.name) {
                record.set_attr(&field.name, value.clone());
            }
        }
        record.save()
    }

    /// Step 2: rebuild the full content-variant row set, one row per
    /// configured language
    fn sync_translations(&self, record: &mut dyn Record, payload: &SubmittedPayload) -> Result<()> {
        let Some(mut translations) = record.translations() else {
            return Ok(());
        };

        let submitted = payload.get("translations").and_then(Value::as_object);
        let translatable: Vec<&FieldDescriptor> =
            self.fields.iter().filter(|f| f.is_translatable()).collect();

        let rows = self
            .languages
            .codes()
            .map(|code| {
                let source = submitted.and_then(|t| t.get(code)).and_then(Value::as_object);
                let mut values = Map::new();
                for field in &translatable {
                    let value = source
                        .and_then(|s| s.get(&field.name))
                        .cloned()
                        .unwrap_or(Value::Null);
                    values.insert(field.name.clone(), value);
                }
                TranslationRow::new(code, values)
            })
            .collect();

        translations.replace_all(rows)
    }

    /// Step 3: reconcile single-file slots with the submitted file ids
    fn sync_files(&self, record: &mut dyn Record, payload: &SubmittedPayload) -> Result<()> {
        for field in self
            .fields
            .iter()
            .filter(|f| f.kind == FieldKind::SingleFile && f.binding().is_none())
        {
            let submitted = payload.get(&field.name).filter(|v| !is_blank(v));

            let Some(mut attachments) = record.attachments() else {
                // No slot support: fall back to the scalar column
                if let Some(id) = submitted {
                    match self.files.and_then(|files| files.find(id)) {
                        Some(file) => record.set_attr(&field.name, file.id.clone()),
                        None => warn!(field = %field.name, file_id = %id, "file not found for submitted id"),
                    }
                }
                continue;
            };

            match submitted {
                Some(id) => match self.files.and_then(|files| files.find(id)) {
                    Some(file) => {
                        if attachments.find(&field.name).is_some() {
                            attachments.remove(&field.name)?;
                        }
                        let alt = payload
                            .get(&format!("{}_alt", field.name))
                            .and_then(Value::as_str)
                            .map(str::to_string);
                        let props = AttachmentProps {
                            file_id: id.clone(),
                            alt,
                        };
                        attachments.attach(&field.name, &file, props)?;
                    }
                    None => {
                        warn!(field = %field.name, file_id = %id, "file not found for submitted id");
                    }
                },
                None => {
                    if attachments.find(&field.name).is_some() {
                        attachments.remove(&field.name)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Step 4: drop and re-derive dynamic custom-field rows
    fn sync_custom_fields(&self, record: &mut dyn Record, payload: &SubmittedPayload) -> Result<()> {
        let Some(service) = self.custom_fields else {
            return Ok(());
        };
        if !record.supports_custom_fields() {
            return Ok(());
        }

        service.delete_for(record)?;

        let groups: Vec<FieldDescriptor> = self
            .fields
            .iter()
            .filter(|f| f.kind.is_custom_stored())
            .cloned()
            .collect();
        service.rebuild(record, &groups, payload)
    }

    /// Step 5: dispatch every relation-bound field on the actual relation
    /// kind exposed by the record
    fn sync_relations(&self, record: &mut dyn Record, payload: &SubmittedPayload) -> Result<()> {
        for field in self.fields {
            let Some(binding) = field.binding() else {
                continue;
            };
            let Some(relation) = record.relation(&binding.relation) else {
                continue;
            };

            match relation {
                Relation::OwnedChildren(mut children) if field.kind.is_nested() => {
                    self.sync_owned_children(field, children.as_mut(), payload)?;
                }
                Relation::Association(mut assoc) if field.kind.is_nested() => {
                    let key_name = binding
                        .correlation_key
                        .clone()
                        .unwrap_or_else(|| assoc.foreign_key());
                    let entries = self.keyed_entries(field, &key_name, payload)?;
                    assoc.sync_with_values(entries)?;
                }
                Relation::Association(mut assoc) => {
                    let ids = parse_id_list(payload.get(&field.name))?;
                    assoc.sync(ids)?;
                }
                Relation::Reference(mut reference) => {
                    let target = match payload.get(&field.name).filter(|v| !is_blank(v)) {
                        Some(id) => reference.find_candidate(id)?,
                        None => None,
                    };
                    reference.associate(target)?;
                }
                Relation::OwnedChildren(_) => {}
            }
        }
        Ok(())
    }

    /// Replace every child row of an owned-children relation with the
    /// submitted items, in order
    fn sync_owned_children(
        &self,
        field: &FieldDescriptor,
        relation: &mut dyn OwnedChildrenRelation,
        payload: &SubmittedPayload,
    ) -> Result<()> {
        relation.delete_all()?;

        let items = payload
            .get(&field.name)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for (order, item) in items.iter().enumerate() {
            let Some(item) = item.as_object() else {
                continue;
            };
            if item.is_empty() {
                continue;
            }

            let mut values = Map::new();
            for sub in field.sub_fields() {
                if sub.binding().is_some() {
                    continue;
                }
                let Some(value) = item.get(&sub.name) else {
                    continue;
                };
                if sub.kind == FieldKind::SingleFile {
                    if !self.stamp_child_media(field, sub, item, value) {
                        continue;
                    }
                }
                values.insert(sub.name.clone(), value.clone());
            }
            values.insert("order".to_string(), Value::from(order as u64));

            let child = relation.create(values)?;
            self.sync_child_translations(field, child.as_ref(), item)?;
        }

        Ok(())
    }

    /// Resolve an already-attached media by submitted file id and stamp its
    /// alt text; returns false when the value should be skipped
    fn stamp_child_media(
        &self,
        field: &FieldDescriptor,
        sub: &FieldDescriptor,
        item: &Map<String, Value>,
        value: &Value,
    ) -> bool {
        let Some(files) = self.files else {
            warn!(field = %field.name, subfield = %sub.name, "no file store configured");
            return false;
        };
        if files.find(value).is_none() {
            warn!(field = %field.name, subfield = %sub.name, file_id = %value, "file not found for submitted id");
            return false;
        }

        let alt = item
            .get(&format!("{}_alt", sub.name))
            .and_then(Value::as_str)
            .unwrap_or_default();
        match files.stamp_alt(value, alt) {
            Ok(true) => true,
            Ok(false) => {
                warn!(field = %field.name, subfield = %sub.name, file_id = %value, "media not found for file id");
                false
            }
            Err(err) => {
                warn!(field = %field.name, subfield = %sub.name, file_id = %value, error = %err, "failed stamping media alt text");
                false
            }
        }
    }

    /// One content-variant row per configured language on a saved child
    fn sync_child_translations(
        &self,
        field: &FieldDescriptor,
        child: &dyn Record,
        item: &Map<String, Value>,
    ) -> Result<()> {
        let multilanguage: Vec<&FieldDescriptor> = field
            .sub_fields()
            .iter()
            .filter(|f| f.is_translatable())
            .collect();
        if multilanguage.is_empty() {
            return Ok(());
        }
        let Some(mut translations) = child.translations() else {
            return Ok(());
        };

        let submitted = item.get("translations").and_then(Value::as_object);
        for code in self.languages.codes() {
            let source = submitted.and_then(|t| t.get(code)).and_then(Value::as_object);
            let mut values = Map::new();
            for sub in &multilanguage {
                let value = source
                    .and_then(|s| s.get(&sub.name))
                    .cloned()
                    .unwrap_or(Value::Null);
                values.insert(sub.name.clone(), value);
            }
            translations.upsert(code, values)?;
        }
        Ok(())
    }

    /// Id-keyed sync entries for a repeater bound to an association
    fn keyed_entries(
        &self,
        field: &FieldDescriptor,
        key_name: &str,
        payload: &SubmittedPayload,
    ) -> Result<Vec<(Value, Map<String, Value>)>> {
        let items = payload
            .get(&field.name)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut entries = Vec::with_capacity(items.len());
        for (order, item) in items.iter().enumerate() {
            let Some(item) = item.as_object() else {
                continue;
            };
            let Some(key) = item.get(key_name).filter(|v| !v.is_null()) else {
                return Err(FormError::MissingAttribute {
                    field: field.name.clone(),
                    attribute: key_name.to_string(),
                });
            };

            let mut values = item.clone();
            values.remove("translations");
            values.insert("order".to_string(), Value::from(order as u64));
            entries.push((key.clone(), values));
        }
        Ok(entries)
    }
}

/// Accept either a literal id array or a JSON-encoded id string
fn parse_id_list(value: Option<&Value>) -> Result<Vec<Value>> {
    let ids = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(ids)) => ids.clone(),
        Some(Value::String(encoded)) => serde_json::from_str::<Vec<Value>>(encoded)?,
        Some(single) => vec![single.clone()],
    };

    // Membership is a set: preserve order, drop duplicates
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    Ok(seen)
}

/// Treat null and empty strings as unsubmitted
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
