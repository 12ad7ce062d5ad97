//! In-memory fake storage backend for the integration suite
//!
//! Implements the engine's collaborator traits over shared `RefCell` state.
//! The backend counts candidate fetches (for the template-only contract),
//! supports snapshot/restore (standing in for the external transaction), and
//! can inject a reference-lookup failure for the atomicity tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::Utc;
use serde_json::{Map, Value};

use formsync::{
    rules, AssociationRelation, Attachment, AttachmentProps, AttachmentSet, CustomFieldService,
    CustomFieldValues, EntityStore, FieldDescriptor, FieldKind, FileStore, FormError, Language,
    LanguageConfig, MetaEntry, OwnedChildrenRelation, Record, ReferenceRelation, Relation, Result,
    StoredFile, SubmittedPayload, TranslationRow, TranslationSet,
};

pub fn en_ar() -> LanguageConfig {
    LanguageConfig::new(
        vec![Language::new("en", "English"), Language::new("ar", "Arabic")],
        "en",
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelKind {
    Reference,
    Association,
    OwnedChildren,
}

#[derive(Clone)]
pub struct CustomRow {
    pub path: String,
    pub lang: Option<String>,
    pub value: Value,
}

/// One stored entity row
#[derive(Clone, Default)]
pub struct EntityData {
    pub attrs: Map<String, Value>,
    pub translations: BTreeMap<String, Map<String, Value>>,
    pub attachments: BTreeMap<String, Attachment>,
    pub references: BTreeMap<String, Option<Value>>,
    pub associations: BTreeMap<String, Vec<(Value, Map<String, Value>)>>,
    pub children: BTreeMap<String, Vec<i64>>,
    pub custom_rows: Vec<CustomRow>,
    pub meta: Vec<MetaEntry>,
}

#[derive(Clone)]
pub struct RelationDef {
    pub kind: RelKind,
    pub foreign_key: String,
    pub candidates: Vec<(Value, EntityData)>,
}

/// Shared fake storage state
#[derive(Default)]
pub struct Backend {
    pub rows: RefCell<BTreeMap<i64, EntityData>>,
    pub child_rows: RefCell<BTreeMap<i64, EntityData>>,
    pub relations: RefCell<BTreeMap<String, RelationDef>>,
    pub next_id: Cell<i64>,
    pub fetch_count: Cell<usize>,
    pub fail_reference_lookup: Cell<bool>,
}

/// Copy of the committed state, restored on rollback
pub struct Snapshot {
    rows: BTreeMap<i64, EntityData>,
    child_rows: BTreeMap<i64, EntityData>,
    next_id: i64,
}

impl Backend {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn declare_relation(&self, name: &str, kind: RelKind, foreign_key: &str) {
        self.relations.borrow_mut().insert(
            name.to_string(),
            RelationDef {
                kind,
                foreign_key: foreign_key.to_string(),
                candidates: Vec::new(),
            },
        );
    }

    pub fn add_candidate(&self, relation: &str, id: Value, data: EntityData) {
        let mut relations = self.relations.borrow_mut();
        let def = relations.get_mut(relation).expect("relation declared");
        def.candidates.push((id, data));
    }

    pub fn entity(&self, id: i64) -> EntityData {
        self.rows.borrow().get(&id).cloned().expect("entity exists")
    }

    pub fn child(&self, id: i64) -> EntityData {
        self.child_rows
            .borrow()
            .get(&id)
            .cloned()
            .expect("child exists")
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            rows: self.rows.borrow().clone(),
            child_rows: self.child_rows.borrow().clone(),
            next_id: self.next_id.get(),
        }
    }

    pub fn restore(&self, snapshot: Snapshot) {
        *self.rows.borrow_mut() = snapshot.rows;
        *self.child_rows.borrow_mut() = snapshot.child_rows;
        self.next_id.set(snapshot.next_id);
    }

    fn alloc(&self) -> i64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }
}

/// Entity store over the shared backend
pub struct MemStore {
    pub backend: Rc<Backend>,
}

impl EntityStore for MemStore {
    fn new_record(&self) -> Box<dyn Record> {
        Box::new(MemRecord::new(self.backend.clone(), None, false))
    }

    fn find(&self, id: &Value) -> Option<Box<dyn Record>> {
        let id = id.as_i64()?;
        self.backend.rows.borrow().contains_key(&id).then(|| {
            Box::new(MemRecord::new(self.backend.clone(), Some(id), false)) as Box<dyn Record>
        })
    }
}

/// Live record handle over a backend row
pub struct MemRecord {
    backend: Rc<Backend>,
    id: Cell<Option<i64>>,
    pending: RefCell<Map<String, Value>>,
    child: bool,
}

impl MemRecord {
    pub fn new(backend: Rc<Backend>, id: Option<i64>, child: bool) -> Self {
        Self {
            backend,
            id: Cell::new(id),
            pending: RefCell::new(Map::new()),
            child,
        }
    }

    fn table(&self) -> &RefCell<BTreeMap<i64, EntityData>> {
        if self.child {
            &self.backend.child_rows
        } else {
            &self.backend.rows
        }
    }
}

impl Record for MemRecord {
    fn key(&self) -> Option<Value> {
        self.id.get().map(Value::from)
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.pending.borrow().get(name) {
            return Some(value.clone());
        }
        let id = self.id.get()?;
        self.table()
            .borrow()
            .get(&id)
            .and_then(|data| data.attrs.get(name).cloned())
    }

    fn set_attr(&mut self, name: &str, value: Value) {
        self.pending.borrow_mut().insert(name.to_string(), value);
    }

    fn save(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        match self.id.get() {
            Some(id) => {
                let mut table = self.table().borrow_mut();
                let data = table.entry(id).or_default();
                data.attrs.extend(pending);
            }
            None => {
                let id = self.backend.alloc();
                let mut data = EntityData::default();
                data.attrs = pending;
                self.table().borrow_mut().insert(id, data);
                self.id.set(Some(id));
            }
        }
        Ok(())
    }

    fn relation(&self, name: &str) -> Option<Relation> {
        let def = self.backend.relations.borrow().get(name).cloned()?;
        let record_id = self.id.get();
        let backend = self.backend.clone();
        let relation = name.to_string();
        Some(match def.kind {
            RelKind::Reference => Relation::Reference(Box::new(MemReference {
                backend,
                record_id,
                relation,
            })),
            RelKind::Association => Relation::Association(Box::new(MemAssociation {
                backend,
                record_id,
                relation,
            })),
            RelKind::OwnedChildren => Relation::OwnedChildren(Box::new(MemOwnedChildren {
                backend,
                record_id,
                relation,
            })),
        })
    }

    fn translations(&self) -> Option<Box<dyn TranslationSet>> {
        let id = self.id.get()?;
        Some(Box::new(MemTranslations {
            backend: self.backend.clone(),
            id,
            child: self.child,
        }))
    }

    fn attachments(&self) -> Option<Box<dyn AttachmentSet>> {
        let id = self.id.get()?;
        Some(Box::new(MemAttachments {
            backend: self.backend.clone(),
            id,
            child: self.child,
        }))
    }

    fn meta_entries(&self) -> Option<Vec<MetaEntry>> {
        let id = self.id.get()?;
        Some(
            self.table()
                .borrow()
                .get(&id)
                .map(|data| data.meta.clone())
                .unwrap_or_default(),
        )
    }

    fn pivot_values(&self) -> Option<Map<String, Value>> {
        None
    }

    fn supports_custom_fields(&self) -> bool {
        true
    }
}

/// Read-only record over detached data (candidates and association targets)
pub struct DetachedRecord {
    pub key: Value,
    pub data: EntityData,
    pub pivot: Option<Map<String, Value>>,
}

impl Record for DetachedRecord {
    fn key(&self) -> Option<Value> {
        Some(self.key.clone())
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        self.data.attrs.get(name).cloned()
    }

    fn set_attr(&mut self, name: &str, value: Value) {
        self.data.attrs.insert(name.to_string(), value);
    }

    fn save(&mut self) -> Result<()> {
        Ok(())
    }

    fn relation(&self, _name: &str) -> Option<Relation> {
        None
    }

    fn translations(&self) -> Option<Box<dyn TranslationSet>> {
        Some(Box::new(DetachedTranslations {
            rows: self.data.translations.clone(),
        }))
    }

    fn attachments(&self) -> Option<Box<dyn AttachmentSet>> {
        None
    }

    fn meta_entries(&self) -> Option<Vec<MetaEntry>> {
        None
    }

    fn pivot_values(&self) -> Option<Map<String, Value>> {
        self.pivot.clone()
    }

    fn supports_custom_fields(&self) -> bool {
        false
    }
}

struct DetachedTranslations {
    rows: BTreeMap<String, Map<String, Value>>,
}

impl TranslationSet for DetachedTranslations {
    fn rows(&self) -> Vec<TranslationRow> {
        self.rows
            .iter()
            .map(|(lang, values)| TranslationRow::new(lang.clone(), values.clone()))
            .collect()
    }

    fn replace_all(&mut self, _rows: Vec<TranslationRow>) -> Result<()> {
        Err(FormError::Storage("detached record is read-only".into()))
    }

    fn upsert(&mut self, _lang: &str, _values: Map<String, Value>) -> Result<()> {
        Err(FormError::Storage("detached record is read-only".into()))
    }
}

struct MemTranslations {
    backend: Rc<Backend>,
    id: i64,
    child: bool,
}

impl MemTranslations {
    fn table(&self) -> &RefCell<BTreeMap<i64, EntityData>> {
        if self.child {
            &self.backend.child_rows
        } else {
            &self.backend.rows
        }
    }
}

impl TranslationSet for MemTranslations {
    fn rows(&self) -> Vec<TranslationRow> {
        self.table()
            .borrow()
            .get(&self.id)
            .map(|data| {
                data.translations
                    .iter()
                    .map(|(lang, values)| TranslationRow::new(lang.clone(), values.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn replace_all(&mut self, rows: Vec<TranslationRow>) -> Result<()> {
        let mut table = self.table().borrow_mut();
        let data = table
            .get_mut(&self.id)
            .ok_or_else(|| FormError::Storage("row missing".into()))?;
        data.translations.clear();
        for row in rows {
            data.translations.insert(row.lang, row.values);
        }
        Ok(())
    }

    fn upsert(&mut self, lang: &str, values: Map<String, Value>) -> Result<()> {
        let mut table = self.table().borrow_mut();
        let data = table
            .get_mut(&self.id)
            .ok_or_else(|| FormError::Storage("row missing".into()))?;
        data.translations
            .entry(lang.to_string())
            .or_default()
            .extend(values);
        Ok(())
    }
}

struct MemAttachments {
    backend: Rc<Backend>,
    id: i64,
    child: bool,
}

impl MemAttachments {
    fn table(&self) -> &RefCell<BTreeMap<i64, EntityData>> {
        if self.child {
            &self.backend.child_rows
        } else {
            &self.backend.rows
        }
    }
}

impl AttachmentSet for MemAttachments {
    fn find(&self, slot: &str) -> Option<Attachment> {
        self.table()
            .borrow()
            .get(&self.id)
            .and_then(|data| data.attachments.get(slot).cloned())
    }

    fn remove(&mut self, slot: &str) -> Result<()> {
        if let Some(data) = self.table().borrow_mut().get_mut(&self.id) {
            data.attachments.remove(slot);
        }
        Ok(())
    }

    fn attach(&mut self, slot: &str, file: &StoredFile, props: AttachmentProps) -> Result<()> {
        let mut table = self.table().borrow_mut();
        let data = table
            .get_mut(&self.id)
            .ok_or_else(|| FormError::Storage("row missing".into()))?;
        data.attachments.insert(
            slot.to_string(),
            Attachment {
                file_id: props.file_id,
                name: file.name.clone(),
                url: file.url.clone(),
                alt: props.alt,
            },
        );
        Ok(())
    }
}

struct MemReference {
    backend: Rc<Backend>,
    record_id: Option<i64>,
    relation: String,
}

impl MemReference {
    fn def(&self) -> RelationDef {
        self.backend
            .relations
            .borrow()
            .get(&self.relation)
            .cloned()
            .expect("relation declared")
    }
}

impl ReferenceRelation for MemReference {
    fn find_candidate(&self, id: &Value) -> Result<Option<Value>> {
        if self.backend.fail_reference_lookup.get() {
            return Err(FormError::Storage("injected reference lookup failure".into()));
        }
        Ok(self
            .def()
            .candidates
            .iter()
            .find(|(candidate_id, _)| candidate_id == id)
            .map(|(candidate_id, _)| candidate_id.clone()))
    }

    fn associate(&mut self, target: Option<Value>) -> Result<()> {
        let id = self
            .record_id
            .ok_or_else(|| FormError::Storage("unsaved record".into()))?;
        let mut rows = self.backend.rows.borrow_mut();
        let data = rows
            .get_mut(&id)
            .ok_or_else(|| FormError::Storage("row missing".into()))?;
        data.references.insert(self.relation.clone(), target);
        Ok(())
    }

    fn target_id(&self) -> Result<Option<Value>> {
        let Some(id) = self.record_id else {
            return Ok(None);
        };
        Ok(self
            .backend
            .rows
            .borrow()
            .get(&id)
            .and_then(|data| data.references.get(&self.relation).cloned())
            .flatten())
    }

    fn candidates(&self) -> Result<Vec<Box<dyn Record>>> {
        self.backend.fetch_count.set(self.backend.fetch_count.get() + 1);
        Ok(self
            .def()
            .candidates
            .into_iter()
            .map(|(key, data)| {
                Box::new(DetachedRecord {
                    key,
                    data,
                    pivot: None,
                }) as Box<dyn Record>
            })
            .collect())
    }
}

struct MemAssociation {
    backend: Rc<Backend>,
    record_id: Option<i64>,
    relation: String,
}

impl MemAssociation {
    fn def(&self) -> RelationDef {
        self.backend
            .relations
            .borrow()
            .get(&self.relation)
            .cloned()
            .expect("relation declared")
    }

    fn membership(&self) -> Vec<(Value, Map<String, Value>)> {
        let Some(id) = self.record_id else {
            return Vec::new();
        };
        self.backend
            .rows
            .borrow()
            .get(&id)
            .and_then(|data| data.associations.get(&self.relation).cloned())
            .unwrap_or_default()
    }

    fn store(&self, entries: Vec<(Value, Map<String, Value>)>) -> Result<()> {
        let id = self
            .record_id
            .ok_or_else(|| FormError::Storage("unsaved record".into()))?;
        let mut rows = self.backend.rows.borrow_mut();
        let data = rows
            .get_mut(&id)
            .ok_or_else(|| FormError::Storage("row missing".into()))?;
        data.associations.insert(self.relation.clone(), entries);
        Ok(())
    }
}

impl AssociationRelation for MemAssociation {
    fn sync(&mut self, ids: Vec<Value>) -> Result<()> {
        self.store(ids.into_iter().map(|id| (id, Map::new())).collect())
    }

    fn sync_with_values(&mut self, entries: Vec<(Value, Map<String, Value>)>) -> Result<()> {
        self.store(entries)
    }

    fn related(&self) -> Result<Vec<Box<dyn Record>>> {
        let def = self.def();
        Ok(self
            .membership()
            .into_iter()
            .map(|(key, pivot)| {
                let data = def
                    .candidates
                    .iter()
                    .find(|(candidate_id, _)| candidate_id == &key)
                    .map(|(_, data)| data.clone())
                    .unwrap_or_default();
                Box::new(DetachedRecord {
                    key,
                    data,
                    pivot: Some(pivot),
                }) as Box<dyn Record>
            })
            .collect())
    }

    fn candidates(&self) -> Result<Vec<Box<dyn Record>>> {
        self.backend.fetch_count.set(self.backend.fetch_count.get() + 1);
        Ok(self
            .def()
            .candidates
            .into_iter()
            .map(|(key, data)| {
                Box::new(DetachedRecord {
                    key,
                    data,
                    pivot: None,
                }) as Box<dyn Record>
            })
            .collect())
    }

    fn foreign_key(&self) -> String {
        self.def().foreign_key
    }
}

struct MemOwnedChildren {
    backend: Rc<Backend>,
    record_id: Option<i64>,
    relation: String,
}

impl MemOwnedChildren {
    fn def(&self) -> RelationDef {
        self.backend
            .relations
            .borrow()
            .get(&self.relation)
            .cloned()
            .expect("relation declared")
    }
}

impl OwnedChildrenRelation for MemOwnedChildren {
    fn foreign_key(&self) -> String {
        self.def().foreign_key
    }

    fn delete_all(&mut self) -> Result<()> {
        let Some(id) = self.record_id else {
            return Ok(());
        };
        let ids = self
            .backend
            .rows
            .borrow_mut()
            .get_mut(&id)
            .and_then(|data| data.children.remove(&self.relation))
            .unwrap_or_default();
        let mut child_rows = self.backend.child_rows.borrow_mut();
        for child_id in ids {
            child_rows.remove(&child_id);
        }
        Ok(())
    }

    fn create(&mut self, values: Map<String, Value>) -> Result<Box<dyn Record>> {
        let parent = self
            .record_id
            .ok_or_else(|| FormError::Storage("unsaved record".into()))?;
        let child_id = self.backend.alloc();

        let mut data = EntityData::default();
        data.attrs = values;
        data.attrs
            .insert(self.def().foreign_key, Value::from(parent));
        self.backend.child_rows.borrow_mut().insert(child_id, data);

        let mut rows = self.backend.rows.borrow_mut();
        let parent_data = rows
            .get_mut(&parent)
            .ok_or_else(|| FormError::Storage("row missing".into()))?;
        parent_data
            .children
            .entry(self.relation.clone())
            .or_default()
            .push(child_id);

        Ok(Box::new(MemRecord::new(
            self.backend.clone(),
            Some(child_id),
            true,
        )))
    }

    fn children(&self) -> Result<Vec<Box<dyn Record>>> {
        let Some(id) = self.record_id else {
            return Ok(Vec::new());
        };
        let ids = self
            .backend
            .rows
            .borrow()
            .get(&id)
            .and_then(|data| data.children.get(&self.relation).cloned())
            .unwrap_or_default();
        Ok(ids
            .into_iter()
            .map(|child_id| {
                Box::new(MemRecord::new(self.backend.clone(), Some(child_id), true))
                    as Box<dyn Record>
            })
            .collect())
    }
}

/// Fake file store with injectable missing media
#[derive(Default)]
pub struct MemFiles {
    pub files: RefCell<Vec<StoredFile>>,
    pub media_missing: RefCell<Vec<Value>>,
    pub alts: RefCell<BTreeMap<String, String>>,
}

impl MemFiles {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn add(&self, id: Value, name: &str) {
        self.files.borrow_mut().push(StoredFile {
            id,
            name: name.to_string(),
            url: format!("https://files.test/{name}"),
            uploaded_at: Utc::now(),
        });
    }
}

impl FileStore for MemFiles {
    fn find(&self, id: &Value) -> Option<StoredFile> {
        self.files
            .borrow()
            .iter()
            .find(|file| &file.id == id)
            .cloned()
    }

    fn stamp_alt(&self, file_id: &Value, alt: &str) -> Result<bool> {
        if self.media_missing.borrow().contains(file_id) {
            return Ok(false);
        }
        self.alts
            .borrow_mut()
            .insert(file_id.to_string(), alt.to_string());
        Ok(true)
    }
}

/// Fake custom-field service storing rows on the backend
pub struct MemCustomFields {
    pub backend: Rc<Backend>,
}

impl MemCustomFields {
    fn record_id(record: &dyn Record) -> Option<i64> {
        record.key().and_then(|key| key.as_i64())
    }
}

impl CustomFieldService for MemCustomFields {
    fn delete_for(&self, record: &mut dyn Record) -> Result<()> {
        let Some(id) = Self::record_id(record) else {
            return Ok(());
        };
        if let Some(data) = self.backend.rows.borrow_mut().get_mut(&id) {
            data.custom_rows.clear();
        }
        Ok(())
    }

    fn rebuild(
        &self,
        record: &mut dyn Record,
        groups: &[FieldDescriptor],
        payload: &SubmittedPayload,
    ) -> Result<()> {
        let Some(id) = Self::record_id(record) else {
            return Ok(());
        };
        let mut stored = Vec::new();

        for group in groups.iter().filter(|g| g.kind == FieldKind::Group) {
            let key_name = group.attribute.key_name.as_deref().unwrap_or(&group.name);
            for sub in group.sub_fields() {
                let path = rules::custom_field_path(key_name, &sub.name);
                if sub.multilanguage {
                    let Some(translations) =
                        payload.get("translations").and_then(Value::as_object)
                    else {
                        continue;
                    };
                    for (lang, values) in translations {
                        if let Some(value) = values.as_object().and_then(|m| m.get(&path)) {
                            stored.push(CustomRow {
                                path: path.clone(),
                                lang: Some(lang.clone()),
                                value: value.clone(),
                            });
                        }
                    }
                } else if let Some(value) = payload.get(&path) {
                    stored.push(CustomRow {
                        path: path.clone(),
                        lang: None,
                        value: value.clone(),
                    });
                }
            }
        }

        if let Some(data) = self.backend.rows.borrow_mut().get_mut(&id) {
            data.custom_rows = stored;
        }
        Ok(())
    }

    fn values_for(
        &self,
        record: &dyn Record,
        _groups: &[FieldDescriptor],
        _languages: &LanguageConfig,
    ) -> Result<CustomFieldValues> {
        let mut out = CustomFieldValues::default();
        let Some(id) = Self::record_id(record) else {
            return Ok(out);
        };
        for row in self.backend.entity(id).custom_rows {
            match row.lang {
                Some(lang) => {
                    out.translations
                        .entry(lang)
                        .or_default()
                        .insert(row.path, row.value);
                }
                None => {
                    out.flat.insert(row.path, row.value);
                }
            }
        }
        Ok(out)
    }
}
