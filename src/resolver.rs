//! Dependency resolution for user callbacks
//!
//! Schema factories and after-save hooks receive a typed [`ResolveContext`]
//! carrying named optional slots instead of relying on runtime parameter
//! inspection. Callbacks that declare their parameters as data (programmable
//! fields, host-side adapters) bind them through [`ResolveContext::bind`]:
//! parameter order is irrelevant, only name and declared type matter.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field::SubmittedPayload;
use crate::store::{DependencyProvider, Record};

/// Whether a call is creating or updating a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the current request, used to infer the operation
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// HTTP method (case-insensitive)
    pub method: String,

    /// Active route handler name
    pub handler: Option<String>,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, handler: Option<String>) -> Self {
        Self {
            method: method.into(),
            handler,
        }
    }

    /// Infer the operation: PUT/PATCH or a handler ending in `edit` means
    /// update, anything else means create
    pub fn operation(&self) -> Operation {
        let method = self.method.to_ascii_uppercase();
        let is_edit = matches!(method.as_str(), "PUT" | "PATCH")
            || self
                .handler
                .as_deref()
                .is_some_and(|h| h.ends_with("edit"));
        if is_edit {
            Operation::Update
        } else {
            Operation::Create
        }
    }
}

/// Declared type of a callback parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Declared as the active record's concrete type
    Record,
    /// Declared as a non-primitive service type, keyed for dependency lookup
    Service(&'static str),
    /// Builtin/scalar declaration, bound by name only
    Builtin,
}

/// One declared callback parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub ty: ParamType,
}

impl Param {
    /// A parameter declared as the record type
    pub fn record(name: &'static str) -> Self {
        Self {
            name,
            ty: ParamType::Record,
        }
    }

    /// A scalar parameter bound by name
    pub fn builtin(name: &'static str) -> Self {
        Self {
            name,
            ty: ParamType::Builtin,
        }
    }

    /// A service parameter fetched from the dependency provider
    pub fn service(name: &'static str, key: &'static str) -> Self {
        Self {
            name,
            ty: ParamType::Service(key),
        }
    }
}

/// A value bound to one callback parameter
pub enum ContextValue<'a> {
    Record(&'a dyn Record),
    Operation(Operation),
    Request(&'a SubmittedPayload),
    Value(Value),
    Service(Rc<dyn Any>),
    Nil,
}

impl fmt::Debug for ContextValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Record(r) => write!(f, "Record({:?})", r.key()),
            ContextValue::Operation(op) => write!(f, "Operation({op})"),
            ContextValue::Request(_) => write!(f, "Request"),
            ContextValue::Value(v) => write!(f, "Value({v})"),
            ContextValue::Service(_) => write!(f, "Service"),
            ContextValue::Nil => write!(f, "Nil"),
        }
    }
}

/// Typed context resolved for user callbacks
///
/// Carries the operation, the active record and request when available, plus
/// arbitrary named extras and an optional keyed dependency lookup.
pub struct ResolveContext<'a> {
    pub operation: Operation,
    pub record: Option<&'a dyn Record>,
    pub request: Option<&'a SubmittedPayload>,
    pub extras: BTreeMap<String, Value>,
    deps: Option<&'a dyn DependencyProvider>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            record: None,
            request: None,
            extras: BTreeMap::new(),
            deps: None,
        }
    }

    /// Context with the operation inferred from the request shape
    pub fn from_request(info: &RequestInfo) -> Self {
        Self::new(info.operation())
    }

    pub fn with_record(mut self, record: &'a dyn Record) -> Self {
        self.record = Some(record);
        self
    }

    pub fn with_request(mut self, request: &'a SubmittedPayload) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extras.insert(name.into(), value);
        self
    }

    pub fn with_dependencies(mut self, deps: &'a dyn DependencyProvider) -> Self {
        self.deps = Some(deps);
        self
    }

    /// Bind a declared parameter list to context values, in declaration order
    ///
    /// Each parameter resolves independently: a record-typed parameter binds
    /// the active record; a name matching a context slot or extra binds that
    /// value; a service type falls back to the dependency lookup; anything
    /// else binds [`ContextValue::Nil`].
    pub fn bind(&self, params: &[Param]) -> Vec<ContextValue<'_>> {
        params.iter().map(|param| self.bind_one(param)).collect()
    }

    fn bind_one(&self, param: &Param) -> ContextValue<'_> {
        match param.ty {
            ParamType::Record => match self.record {
                Some(record) => ContextValue::Record(record),
                None => self.named(param.name),
            },
            ParamType::Service(key) => match self.named(param.name) {
                ContextValue::Nil => match self.deps.and_then(|d| d.get(key)) {
                    Some(service) => ContextValue::Service(service),
                    None => ContextValue::Nil,
                },
                bound => bound,
            },
            ParamType::Builtin => self.named(param.name),
        }
    }

    fn named(&self, name: &str) -> ContextValue<'_> {
        match name {
            "operation" => ContextValue::Operation(self.operation),
            "record" => match self.record {
                Some(record) => ContextValue::Record(record),
                None => ContextValue::Nil,
            },
            "request" => match self.request {
                Some(request) => ContextValue::Request(request),
                None => ContextValue::Nil,
            },
            _ => match self.extras.get(name) {
                Some(value) => ContextValue::Value(value.clone()),
                None => ContextValue::Nil,
            },
        }
    }
}
