//! FHIR request facade over an established session.
//!
//! Form renderers and other consumers want a small, uniform client: issue a
//! request by path or by full descriptor, learn the server's FHIR version,
//! and read the resources in context. [`SmartFhirClient`] provides that on
//! top of the session's authenticated request primitive.

use std::sync::Arc;

use serde_json::Value;

use crate::context::FhirContext;
use crate::library::{FhirRequest, RequestOptions, SmartSession};
use crate::{SmartError, SmartResult};

/// FHIR version assumed when the server does not report one.
pub const DEFAULT_FHIR_VERSION: &str = "4.0.1";

/// A request given either as a resource path or as a full request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestDescriptor {
    /// Path relative to the FHIR base, requested with GET.
    Path(String),
    /// Full request with method, headers and body.
    Full(FhirRequest),
}

impl RequestDescriptor {
    /// Normalizes the descriptor into a request.
    #[must_use]
    pub fn into_request(self) -> FhirRequest {
        match self {
            Self::Path(path) => FhirRequest::get(path),
            Self::Full(request) => request,
        }
    }
}

impl From<&str> for RequestDescriptor {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for RequestDescriptor {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl From<FhirRequest> for RequestDescriptor {
    fn from(request: FhirRequest) -> Self {
        Self::Full(request)
    }
}

impl TryFrom<Value> for RequestDescriptor {
    type Error = SmartError;

    /// Accepts a JSON string (path) or a JSON object (`{url, method, headers, body}`).
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(path) => Ok(Self::Path(path)),
            Value::Object(_) => serde_json::from_value(value)
                .map(Self::Full)
                .map_err(|e| SmartError::invalid_request(format!("invalid request object: {e}"))),
            other => Err(SmartError::invalid_request(format!(
                "request must be a resource path or a request object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

async fn send(session: &dyn SmartSession, descriptor: RequestDescriptor) -> SmartResult<Value> {
    let request = descriptor.into_request();
    tracing::debug!(method = %request.method, url = %request.url, "FHIR request");
    session
        .request(request, RequestOptions { flat: true })
        .await
}

/// Resource ids already known to the caller, typically from [`FhirContext`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownIds {
    pub patient: Option<String>,
    pub encounter: Option<String>,
    /// Practitioner id of the user.
    pub user: Option<String>,
}

impl From<&FhirContext> for KnownIds {
    /// Takes patient and encounter from the context. The user id is taken from
    /// `fhirUser` only when it references a Practitioner.
    fn from(ctx: &FhirContext) -> Self {
        let user = ctx
            .fhir_user
            .as_deref()
            .and_then(|reference| reference.rsplit_once('/'))
            .filter(|(resource_type, _)| resource_type.ends_with("Practitioner"))
            .map(|(_, id)| id.to_string());

        Self {
            patient: ctx.patient_id.clone(),
            encounter: ctx.encounter_id.clone(),
            user,
        }
    }
}

/// A resource of a fixed type that may or may not have a known id.
#[derive(Clone)]
pub struct ResourceStub {
    resource_type: &'static str,
    id: Option<String>,
    session: Arc<dyn SmartSession>,
}

impl ResourceStub {
    fn new(resource_type: &'static str, id: Option<String>, session: Arc<dyn SmartSession>) -> Self {
        Self {
            resource_type,
            id,
            session,
        }
    }

    /// Resource type, e.g. `Patient`.
    #[must_use]
    pub fn resource_type(&self) -> &'static str {
        self.resource_type
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Reads the resource. Resolves to `Ok(None)` without touching the
    /// server when no id is known.
    ///
    /// # Errors
    ///
    /// Returns the library's error if the read fails.
    pub async fn read(&self) -> SmartResult<Option<Value>> {
        let Some(id) = self.id.as_deref() else {
            return Ok(None);
        };
        let path = format!("{}/{}", self.resource_type, urlencoding::encode(id));
        send(self.session.as_ref(), RequestDescriptor::Path(path))
            .await
            .map(Some)
    }

    /// Issues an arbitrary request through the same session.
    ///
    /// # Errors
    ///
    /// Returns the library's error if the request fails.
    pub async fn request(&self, descriptor: impl Into<RequestDescriptor>) -> SmartResult<Value> {
        send(self.session.as_ref(), descriptor.into()).await
    }
}

impl std::fmt::Debug for ResourceStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStub")
            .field("resource_type", &self.resource_type)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Request facade over an established SMART session.
#[derive(Clone)]
pub struct SmartFhirClient {
    session: Arc<dyn SmartSession>,
    /// Patient in context.
    pub patient: ResourceStub,
    /// Encounter in context.
    pub encounter: ResourceStub,
    /// Authenticated practitioner.
    pub user: ResourceStub,
}

impl SmartFhirClient {
    #[must_use]
    pub fn new(session: Arc<dyn SmartSession>, ids: KnownIds) -> Self {
        Self {
            patient: ResourceStub::new("Patient", ids.patient, Arc::clone(&session)),
            encounter: ResourceStub::new("Encounter", ids.encounter, Arc::clone(&session)),
            user: ResourceStub::new("Practitioner", ids.user, Arc::clone(&session)),
            session,
        }
    }

    /// The underlying session.
    #[must_use]
    pub fn session(&self) -> &Arc<dyn SmartSession> {
        &self.session
    }

    /// Issues a request given as a path or a full request.
    ///
    /// # Errors
    ///
    /// Returns the library's error if the request fails.
    pub async fn request(&self, descriptor: impl Into<RequestDescriptor>) -> SmartResult<Value> {
        send(self.session.as_ref(), descriptor.into()).await
    }

    /// Issues a request given as untyped JSON (a path string or a request object).
    ///
    /// # Errors
    ///
    /// Returns `SmartError::InvalidRequest` for any other JSON value, and the
    /// library's error if the request fails.
    pub async fn request_value(&self, descriptor: Value) -> SmartResult<Value> {
        let descriptor = RequestDescriptor::try_from(descriptor)?;
        send(self.session.as_ref(), descriptor).await
    }

    /// FHIR version from the server's CapabilityStatement, or
    /// [`DEFAULT_FHIR_VERSION`] if it cannot be determined.
    pub async fn fhir_version(&self) -> String {
        match self.request("metadata").await {
            Ok(metadata) => metadata
                .get("fhirVersion")
                .and_then(Value::as_str)
                .filter(|version| !version.is_empty())
                .unwrap_or(DEFAULT_FHIR_VERSION)
                .to_string(),
            Err(e) => {
                tracing::debug!(error = %e, "capability statement unavailable, assuming FHIR {DEFAULT_FHIR_VERSION}");
                DEFAULT_FHIR_VERSION.to_string()
            }
        }
    }
}

impl std::fmt::Debug for SmartFhirClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartFhirClient")
            .field("patient", &self.patient)
            .field("encounter", &self.encounter)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}
