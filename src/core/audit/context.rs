//! Audit Context Tagger
//!
//! Builds the regulatory processing context for one mutating operation:
//! request and session identifiers, plus a processing purpose and legal basis
//! inferred from the request path.

use crate::domain::audit::{AuditContext, Operation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Purpose used when no path keyword matches
pub const DEFAULT_PURPOSE: &str = "general_service_provision";

/// Legal basis used when no path keyword matches
pub const DEFAULT_LEGAL_BASIS: &str = "legitimate_interests";

/// Path keyword → (processing purpose, legal basis), first match wins
const PATH_PURPOSES: &[(&[&str], &str, &str)] = &[
    (&["consent"], "consent_management", "consent"),
    (&["medical"], "healthcare_service_provision", "vital_interests"),
    (&["appointment"], "appointment_scheduling", "contract"),
    (&["billing", "payment"], "billing", "legal_obligation"),
    (&["research"], "scientific_research", "consent"),
    (&["admin"], "system_administration", "legitimate_interests"),
];

/// One mutating operation as reported by the request layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub table_name: String,
    pub operation: Operation,
    /// Request path, used to infer purpose and legal basis
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(default)]
    pub before_snapshot: Option<Value>,
    #[serde(default)]
    pub after_snapshot: Option<Value>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl OperationDescriptor {
    pub fn new(
        table_name: impl Into<String>,
        operation: Operation,
        path: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            operation,
            path: path.into(),
            actor_id: None,
            session_id: None,
            request_id: None,
            record_id: None,
            before_snapshot: None,
            after_snapshot: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_record_id(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    pub fn with_before(mut self, snapshot: Value) -> Self {
        self.before_snapshot = Some(snapshot);
        self
    }

    pub fn with_after(mut self, snapshot: Value) -> Self {
        self.after_snapshot = Some(snapshot);
        self
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// Stateless context builder
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditContextTagger;

impl AuditContextTagger {
    pub fn new() -> Self {
        Self
    }

    /// Build the audit context for an operation
    ///
    /// The request id is taken from the descriptor when present, else freshly
    /// generated. Without a session id, the session is derived from the actor
    /// so repeated requests by one actor share it.
    pub fn tag(&self, descriptor: &OperationDescriptor) -> AuditContext {
        let (processing_purpose, legal_basis) = infer_purpose(&descriptor.path);

        AuditContext {
            actor_id: descriptor.actor_id.clone(),
            session_id: descriptor
                .session_id
                .clone()
                .unwrap_or_else(|| derived_session_id(descriptor.actor_id.as_deref())),
            request_id: descriptor
                .request_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            processing_purpose: processing_purpose.to_string(),
            legal_basis: legal_basis.to_string(),
            ip_address: descriptor.ip_address.clone(),
            user_agent: descriptor.user_agent.clone(),
        }
    }
}

/// Processing purpose and legal basis for a request path
pub fn infer_purpose(path: &str) -> (&'static str, &'static str) {
    let path = path.to_lowercase();
    PATH_PURPOSES
        .iter()
        .find(|(keywords, _, _)| keywords.iter().any(|k| path.contains(k)))
        .map(|(_, purpose, basis)| (*purpose, *basis))
        .unwrap_or((DEFAULT_PURPOSE, DEFAULT_LEGAL_BASIS))
}

fn derived_session_id(actor_id: Option<&str>) -> String {
    let actor = actor_id.unwrap_or("anonymous");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("warden-session:{actor}").as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("/api/medical-records/42", "healthcare_service_provision", "vital_interests")]
    #[test_case("/api/patients/7/consents", "consent_management", "consent")]
    #[test_case("/api/Appointments", "appointment_scheduling", "contract")]
    #[test_case("/api/payments/3", "billing", "legal_obligation")]
    #[test_case("/research/cohorts", "scientific_research", "consent")]
    #[test_case("/admin/users", "system_administration", "legitimate_interests")]
    #[test_case("/api/feature-flags", "general_service_provision", "legitimate_interests")]
    fn test_path_lookup(path: &str, purpose: &str, basis: &str) {
        assert_eq!(infer_purpose(path), (purpose, basis));
    }

    #[test]
    fn test_session_is_stable_per_actor() {
        let tagger = AuditContextTagger::new();
        let op = |operation, actor: &str| {
            OperationDescriptor::new("patients", operation, "/api/patients").with_actor(actor)
        };
        let a = tagger.tag(&op(Operation::Update, "dr-li"));
        let b = tagger.tag(&op(Operation::Delete, "dr-li"));
        let c = tagger.tag(&op(Operation::Update, "dr-wu"));
        assert_eq!(a.session_id, b.session_id);
        assert_ne!(a.session_id, c.session_id);
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_explicit_session_and_request_are_kept() {
        let mut descriptor =
            OperationDescriptor::new("patients", Operation::Insert, "/api/patients")
                .with_session("sess-1");
        descriptor.request_id = Some("req-9".to_string());
        let context = AuditContextTagger::new().tag(&descriptor);
        assert_eq!(context.session_id, "sess-1");
        assert_eq!(context.request_id, "req-9");
    }
}
