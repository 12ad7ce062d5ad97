//! Validation-rule derivation
//!
//! Walks a schema tree and produces a flat map from payload path to an
//! ordered constraint list. The map is the sole input to the external
//! validation engine; the synchronizer must never see a payload that has not
//! passed validation against it.

use std::collections::BTreeMap;

use crate::config::LanguageConfig;
use crate::field::{FieldDescriptor, FieldKind};

/// Derived rule map: payload path to ordered constraint list
pub type RuleMap = BTreeMap<String, Vec<String>>;

/// Derive the rule map for a schema
///
/// Multilanguage fields emit one `translations.<lang>.<name>` path per
/// configured language; repeaters emit one `<name>.*.<subfield>` wildcard
/// path per sub-field; groups emit `cf__<key>__<field>` paths for the
/// custom-field service.
pub fn derive_rules(fields: &[FieldDescriptor], languages: &LanguageConfig) -> RuleMap {
    let mut rules = RuleMap::new();

    for field in fields {
        if field.kind == FieldKind::Group {
            let key_name = field.attribute.key_name.as_deref().unwrap_or(&field.name);
            for sub in field.sub_fields() {
                let name = custom_field_path(key_name, &sub.name);
                insert_field_rules(&mut rules, sub, &name, languages);
            }
            continue;
        }

        insert_field_rules(&mut rules, field, &field.name, languages);
    }

    rules
}

/// Human label per rule key, derived from the trailing path segment
pub fn resolved_attributes(rules: &RuleMap) -> BTreeMap<String, String> {
    rules
        .keys()
        .map(|key| {
            let segment = key.rsplit('.').next().unwrap_or(key);
            let segment = segment.rsplit("__").next().unwrap_or(segment);
            (key.clone(), segment.replace(['_', '-'], " "))
        })
        .collect()
}

/// Rule path for a custom-field group member
pub fn custom_field_path(key_name: &str, field_name: &str) -> String {
    format!("cf {key_name} {field_name}").replace(' ', "__")
}

fn insert_field_rules(
    rules: &mut RuleMap,
    field: &FieldDescriptor,
    name: &str,
    languages: &LanguageConfig,
) {
    if field.kind == FieldKind::Repeater {
        for sub in field.sub_fields() {
            let constraints = constraints_for(sub);
            if sub.multilanguage {
                for code in languages.codes() {
                    rules.insert(
                        format!("{name}.*.translations.{code}.{}", sub.name),
                        constraints.clone(),
                    );
                }
            } else {
                rules.insert(format!("{name}.*.{}", sub.name), constraints);
            }
        }
    }

    let constraints = constraints_for(field);
    if field.multilanguage {
        for code in languages.codes() {
            rules.insert(format!("translations.{code}.{name}"), constraints.clone());
        }
    } else {
        rules.insert(name.to_string(), constraints);
    }
}

/// Constraint list for one field: required/nullable plus kind-specific
/// constraints, fully overridden by an explicit `rules` attribute
fn constraints_for(field: &FieldDescriptor) -> Vec<String> {
    if let Some(explicit) = &field.attribute.rules {
        return explicit.clone();
    }

    let mut constraints = Vec::new();
    if field.attribute.is_required == Some(true) {
        constraints.push("required".to_string());
    } else {
        constraints.push("nullable".to_string());
    }

    let attrs = &field.attribute;
    match field.kind {
        FieldKind::Input => match attrs.input_type.as_deref() {
            Some("number") => {
                constraints.push("numeric".to_string());
                if let Some(min) = attrs.min {
                    constraints.push(format!("min:{min}"));
                }
                if let Some(max) = attrs.max {
                    constraints.push(format!("max:{max}"));
                }
            }
            Some("email") => constraints.push("email".to_string()),
            Some("url") => constraints.push("url".to_string()),
            Some("date") => constraints.push("date".to_string()),
            _ => {
                if let Some(max) = attrs.max_length {
                    constraints.push(format!("max:{max}"));
                }
            }
        },
        FieldKind::Textarea => {
            if let Some(max) = attrs.max {
                constraints.push(format!("max:{max}"));
            }
        }
        FieldKind::Toggle => constraints.push("boolean".to_string()),
        FieldKind::MultiSelect => constraints.push("array".to_string()),
        FieldKind::SingleFile | FieldKind::Media => {
            if let Some(accept) = &attrs.accept {
                let extensions: Vec<&str> = accept
                    .iter()
                    .filter_map(|mime| mime.rsplit('/').next())
                    .collect();
                if !extensions.is_empty() {
                    constraints.push(format!("mimes:{}", extensions.join(",")));
                }
            }
            if let Some(size) = attrs.file_size {
                constraints.push(format!("max:{size}"));
            }
            if field.kind == FieldKind::SingleFile {
                if let Some(res) = &attrs.resolution {
                    constraints.push(format!(
                        "dimensions:min_width={},max_width={},min_height={},max_height={}",
                        res.min_width, res.max_width, res.min_height, res.max_height
                    ));
                }
            }
        }
        FieldKind::Repeater | FieldKind::Group => {
            constraints.push("array".to_string());
            if let Some(min) = attrs.min {
                constraints.push(format!("min:{min}"));
            }
            if let Some(max) = attrs.max {
                constraints.push(format!("max:{max}"));
            }
        }
        FieldKind::Select | FieldKind::Custom => {}
    }

    constraints
}
