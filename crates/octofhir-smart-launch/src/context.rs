//! Clinical and user context of an established session.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::SmartResult;
use crate::library::SmartSession;

/// Patient, encounter and user in context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirContext {
    pub patient_id: Option<String>,
    pub encounter_id: Option<String>,
    /// FHIR reference of the authenticated user, e.g. `Practitioner/123`.
    pub fhir_user: Option<String>,
}

impl FhirContext {
    /// Returns `true` if no context is available at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patient_id.is_none() && self.encounter_id.is_none() && self.fhir_user.is_none()
    }
}

/// Fetches patient, encounter and user concurrently.
///
/// Each lookup is independent: a failed lookup degrades to `None` and never
/// affects the other two.
pub async fn get_context(session: &dyn SmartSession) -> FhirContext {
    let (patient_id, encounter_id, fhir_user) = tokio::join!(
        lookup("patient", session.patient_id()),
        lookup("encounter", session.encounter_id()),
        lookup("fhirUser", session.fhir_user()),
    );

    FhirContext {
        patient_id,
        encounter_id,
        fhir_user,
    }
}

async fn lookup(
    field: &'static str,
    fut: impl Future<Output = SmartResult<Option<String>>>,
) -> Option<String> {
    match fut.await {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(field, error = %e, "context lookup failed");
            None
        }
    }
}
