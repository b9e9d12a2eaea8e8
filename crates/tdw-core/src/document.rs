//! # DID Document Model
//!
//! Strongly typed view of a DID document. Known members (`@context`, `id`,
//! `controller`, verification methods and relationships, services) are
//! typed; everything else lands in the `extra` bag and is written back
//! unchanged.
//!
//! Every optional member is an `Option` so that "absent" and "present but
//! empty" survive a parse/serialize cycle. Version hashes are computed over
//! the serialized document, so round-trip fidelity is a hard requirement.
//!
//! Documents are values: the `with_*` builders consume a document and return
//! the modified copy, leaving any state that holds the original untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TdwError;

/// A JSON member that may be a single value or an array of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// An array of values. Listed first so an array is never taken as a
    /// single `Value`.
    Many(Vec<T>),
    /// A single bare value.
    One(T),
}

impl<T> OneOrMany<T> {
    /// Iterate over the contained values.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            Self::One(v) => std::slice::from_ref(v).iter(),
            Self::Many(vs) => vs.iter(),
        }
    }

    /// Number of contained values.
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(vs) => vs.len(),
        }
    }

    /// True for an empty array.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a value, promoting a single value to an array.
    pub fn push(self, value: T) -> Self {
        match self {
            Self::One(v) => Self::Many(vec![v, value]),
            Self::Many(mut vs) => {
                vs.push(value);
                Self::Many(vs)
            }
        }
    }
}

impl<T: PartialEq> OneOrMany<T> {
    /// Whether `value` is among the contained values.
    pub fn contains(&self, value: &T) -> bool {
        self.iter().any(|v| v == value)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        Self::Many(values)
    }
}

/// A verification method entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// Fully qualified DID URL of the method.
    pub id: String,
    /// Method type, `Multikey` for keys produced here.
    #[serde(rename = "type")]
    pub type_: String,
    /// Controller DID.
    pub controller: String,
    /// Multibase-encoded public key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<String>,
    /// Unrecognized members.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An entry in `authentication`, `assertionMethod` and the other
/// verification relationships: a reference to a method or an embedded one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerificationRelationship {
    /// A DID URL referencing a method in `verificationMethod`.
    Reference(String),
    /// A method defined inline.
    Embedded(VerificationMethod),
}

impl VerificationRelationship {
    /// The referenced or embedded method id.
    pub fn id(&self) -> &str {
        match self {
            Self::Reference(id) => id,
            Self::Embedded(vm) => &vm.id,
        }
    }
}

/// A service endpoint entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Service id, usually `<did>#<name>`.
    pub id: String,
    /// Service type or types.
    #[serde(rename = "type")]
    pub type_: OneOrMany<String>,
    /// Endpoint URL, map or set.
    pub service_endpoint: Value,
    /// Unrecognized members.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A DID document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    /// JSON-LD context.
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<OneOrMany<Value>>,
    /// The DID this document describes.
    pub id: String,
    /// Controller DID or DIDs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<OneOrMany<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_method: Option<Vec<VerificationMethod>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Vec<VerificationRelationship>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_method: Option<Vec<VerificationRelationship>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Vec<Service>>,
    /// Unrecognized members, preserved in insertion order.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DidDocument {
    /// A document carrying only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            context: None,
            id: id.into(),
            controller: None,
            verification_method: None,
            authentication: None,
            assertion_method: None,
            service: None,
            extra: Map::new(),
        }
    }

    /// Parse from a JSON value.
    ///
    /// # Errors
    ///
    /// `InvalidGenesisFormat` when `id` is missing or a known member has the
    /// wrong shape.
    pub fn from_value(value: Value) -> Result<Self, TdwError> {
        serde_json::from_value(value)
            .map_err(|e| TdwError::InvalidGenesisFormat(format!("invalid DID document: {e}")))
    }

    /// Serialize to a JSON value.
    pub fn to_value(&self) -> Result<Value, TdwError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Look up a verification method by id. A bare `#fragment` is resolved
    /// against the document id.
    pub fn find_verification_method(&self, id: &str) -> Option<&VerificationMethod> {
        let full = self.absolute_id(id);
        let in_list = self
            .verification_method
            .iter()
            .flatten()
            .find(|vm| self.absolute_id(&vm.id) == full);
        in_list.or_else(|| {
            self.authentication
                .iter()
                .chain(self.assertion_method.iter())
                .flatten()
                .find_map(|rel| match rel {
                    VerificationRelationship::Embedded(vm) if self.absolute_id(&vm.id) == full => {
                        Some(vm)
                    }
                    _ => None,
                })
        })
    }

    /// Whether `id` is listed under `assertionMethod`.
    pub fn has_assertion_method(&self, id: &str) -> bool {
        let full = self.absolute_id(id);
        self.assertion_method
            .iter()
            .flatten()
            .any(|rel| self.absolute_id(rel.id()) == full)
    }

    /// Whether `id` is listed under `authentication`.
    pub fn has_authentication(&self, id: &str) -> bool {
        let full = self.absolute_id(id);
        self.authentication
            .iter()
            .flatten()
            .any(|rel| self.absolute_id(rel.id()) == full)
    }

    fn absolute_id(&self, id: &str) -> String {
        if id.starts_with('#') {
            format!("{}{id}", self.id)
        } else {
            id.to_string()
        }
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    /// Add a context entry unless it is already present.
    pub fn with_context(mut self, context: impl Into<Value>) -> Self {
        let context = context.into();
        self.context = Some(match self.context.take() {
            None => OneOrMany::Many(vec![context]),
            Some(existing) if existing.contains(&context) => existing,
            Some(existing) => existing.push(context),
        });
        self
    }

    /// Replace the controller list.
    pub fn with_controller(mut self, controllers: Vec<String>) -> Self {
        self.controller = Some(OneOrMany::Many(controllers));
        self
    }

    /// Append a verification method.
    pub fn with_verification_method(mut self, vm: VerificationMethod) -> Self {
        self.verification_method.get_or_insert_with(Vec::new).push(vm);
        self
    }

    /// Append an `authentication` entry.
    pub fn with_authentication(mut self, rel: VerificationRelationship) -> Self {
        self.authentication.get_or_insert_with(Vec::new).push(rel);
        self
    }

    /// Replace the `assertionMethod` list.
    pub fn with_assertion_methods(mut self, rels: Vec<VerificationRelationship>) -> Self {
        self.assertion_method = Some(rels);
        self
    }

    /// Append a service.
    pub fn with_service(mut self, service: Service) -> Self {
        self.service.get_or_insert_with(Vec::new).push(service);
        self
    }

    /// Set an extension member.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
