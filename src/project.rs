//! Record-to-schema projection
//!
//! The read path of the engine, structural inverse of the synchronizer:
//! given a persisted record and the schema it was saved under, produce the
//! nested value map that pre-populates an edit form. For any payload `P`,
//! projecting `synchronize(P)` reproduces every scalar and translation value
//! of `P`; file and relation fields reproduce by resolved id.

use serde_json::{Map, Value};

use crate::config::LanguageConfig;
use crate::error::Result;
use crate::field::{FieldDescriptor, FieldKind, SubmittedPayload};
use crate::store::{CustomFieldService, MetaEntry, Record, Relation};

/// The read path: projects a record back into the schema's payload shape
pub struct Projector<'a> {
    fields: &'a [FieldDescriptor],
    languages: &'a LanguageConfig,
    custom_fields: Option<&'a dyn CustomFieldService>,
}

impl<'a> Projector<'a> {
    pub fn new(fields: &'a [FieldDescriptor], languages: &'a LanguageConfig) -> Self {
        Self {
            fields,
            languages,
            custom_fields: None,
        }
    }

    pub fn with_custom_field_service(mut self, service: &'a dyn CustomFieldService) -> Self {
        self.custom_fields = Some(service);
        self
    }

    /// Build the edit-form value map for a record
    pub fn get_fields(&self, record: &dyn Record) -> Result<SubmittedPayload> {
        let mut out = Map::new();
        let mut translations_out: Map<String, Value> = Map::new();
        let mut flat_meta: Map<String, Value> = Map::new();

        for field in self.fields.iter().filter(|f| f.is_scalar()) {
            if let Some(value) = record.get_attr(&field.name) {
                out.insert(field.name.clone(), value);
            }
        }

        if let Some(translations) = record.translations() {
            let metas = record.meta_entries();
            for code in self.languages.codes() {
                let mut entry = translations
                    .row(code)
                    .map(|row| row.values)
                    .unwrap_or_default();

                if let Some(metas) = &metas {
                    self.route_meta(metas, code, &mut entry, &mut flat_meta);
                }

                translations_out.insert(code.to_string(), Value::Object(entry));
            }
        }

        if let Some(attachments) = record.attachments() {
            for field in self.fields.iter().filter(|f| f.kind == FieldKind::SingleFile) {
                if let Some(attachment) = attachments.find(&field.name) {
                    let mut file = Map::new();
                    file.insert("fileId".to_string(), attachment.file_id);
                    file.insert("name".to_string(), Value::String(attachment.name));
                    file.insert("url".to_string(), Value::String(attachment.url));
                    out.insert(field.name.clone(), Value::Object(file));
                }
            }
        }

        if let Some(service) = self.custom_fields {
            if record.supports_custom_fields() {
                let groups: Vec<FieldDescriptor> = self
                    .fields
                    .iter()
                    .filter(|f| f.kind.is_custom_stored())
                    .cloned()
                    .collect();
                let values = service.values_for(record, &groups, self.languages)?;

                for (lang, lang_values) in values.translations {
                    let entry = translations_out
                        .entry(lang)
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(entry) = entry {
                        entry.extend(lang_values);
                    }
                }
                out.extend(values.flat);
            }
        }

        if !flat_meta.is_empty() {
            out.insert("meta".to_string(), Value::Object(flat_meta));
        }
        out.insert("translations".to_string(), Value::Object(translations_out));

        out.extend(self.resolve_relation_fields(record)?);

        Ok(out)
    }

    /// Route one language's view of the stored meta entries: keys with any
    /// language-tagged value go under the per-language map, the rest flat.
    /// Detection is per key, not global.
    fn route_meta(
        &self,
        metas: &[MetaEntry],
        code: &str,
        entry: &mut Map<String, Value>,
        flat_meta: &mut Map<String, Value>,
    ) {
        let mut translated_meta: Map<String, Value> = Map::new();
        for meta in metas {
            let key = meta.key.strip_prefix("meta_").unwrap_or(&meta.key);
            if meta.is_translated() {
                let value = meta.value_for(Some(code)).cloned().unwrap_or(Value::Null);
                translated_meta.insert(key.to_string(), value);
            } else {
                let value = meta.value_for(None).cloned().unwrap_or(Value::Null);
                flat_meta.insert(key.to_string(), value);
            }
        }
        if !translated_meta.is_empty() {
            entry.insert("meta".to_string(), Value::Object(translated_meta));
        }
    }

    /// Reduce relation-bound fields to ids, id arrays, or per-child maps
    fn resolve_relation_fields(&self, record: &dyn Record) -> Result<Map<String, Value>> {
        let mut out = Map::new();

        for field in self.fields {
            let Some(binding) = field.binding() else {
                continue;
            };
            let Some(relation) = record.relation(&binding.relation) else {
                continue;
            };

            match relation {
                Relation::OwnedChildren(children) if field.kind.is_nested() => {
                    let entries: Vec<Value> = children
                        .children()?
                        .iter()
                        .map(|child| self.project_child(field, child.as_ref()))
                        .collect();
                    out.insert(field.name.clone(), Value::Array(entries));
                }
                Relation::Association(assoc) if field.kind.is_nested() => {
                    let entries: Vec<Value> = assoc
                        .related()?
                        .iter()
                        .map(|child| self.project_child(field, child.as_ref()))
                        .collect();
                    out.insert(field.name.clone(), Value::Array(entries));
                }
                Relation::Association(assoc) => {
                    let ids: Vec<Value> = assoc
                        .related()?
                        .iter()
                        .filter_map(|r| r.key())
                        .collect();
                    out.insert(field.name.clone(), Value::Array(ids));
                }
                Relation::Reference(reference) => {
                    let id = reference.target_id()?.unwrap_or(Value::Null);
                    out.insert(field.name.clone(), id);
                }
                Relation::OwnedChildren(_) => {}
            }
        }

        Ok(out)
    }

    /// One repeater item: sub-fields resolve recursively
    ///
    /// Nested repeaters are not expanded; select sub-fields resolve to the
    /// child's own key; pivot columns are read directly when present.
    fn project_child(&self, field: &FieldDescriptor, child: &dyn Record) -> Value {
        let mut entry = Map::new();
        let mut entry_translations: Map<String, Value> = Map::new();
        let pivot = child.pivot_values();

        for sub in field.sub_fields() {
            match sub.kind {
                FieldKind::Repeater | FieldKind::Group => {}
                FieldKind::Select | FieldKind::MultiSelect => {
                    entry.insert(sub.name.clone(), child.key().unwrap_or(Value::Null));
                }
                FieldKind::Input
                | FieldKind::Textarea
                | FieldKind::Toggle
                | FieldKind::SingleFile
                | FieldKind::Media
                | FieldKind::Custom => {
                    if let Some(pivot) = &pivot {
                        let value = pivot.get(&sub.name).cloned().unwrap_or(Value::Null);
                        entry.insert(sub.name.clone(), value);
                    } else if sub.multilanguage {
                        match child.translations() {
                            Some(translations) => {
                                for code in self.languages.codes() {
                                    if let Some(row) = translations.row(code) {
                                        let value =
                                            row.values.get(&sub.name).cloned().unwrap_or(Value::Null);
                                        let lang_entry = entry_translations
                                            .entry(code.to_string())
                                            .or_insert_with(|| Value::Object(Map::new()));
                                        if let Value::Object(lang_entry) = lang_entry {
                                            lang_entry.insert(sub.name.clone(), value);
                                        }
                                    }
                                }
                            }
                            None => {
                                let value = child.get_attr(&sub.name).unwrap_or(Value::Null);
                                entry.insert(sub.name.clone(), value);
                            }
                        }
                    } else {
                        let value = child.get_attr(&sub.name).unwrap_or(Value::Null);
                        entry.insert(sub.name.clone(), value);
                    }
                }
            }
        }

        if !entry_translations.is_empty() {
            entry.insert("translations".to_string(), Value::Object(entry_translations));
        }
        Value::Object(entry)
    }
}
