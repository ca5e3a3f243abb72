//! UUID-backed entity identifiers.
//!
//! Strongly-typed wrappers built on [`domain-key`](https://crates.io/crates/domain-key)
//! `Uuid<D>` — each type is parameterized by a unique domain marker so a
//! `WorkflowId` can never be passed where an `ApprovalId` is expected.
//!
//! All ID types are `Copy` (16 bytes) and support `v4()`, `nil()`,
//! `parse(&str)`, serde (as UUID string), `Display`, `FromStr`, `Eq`,
//! `Ord`, `Hash`.

use domain_key::define_uuid;

// Re-export for downstream parse error handling
pub use domain_key::UuidParseError;

define_uuid!(pub WorkflowIdDomain => WorkflowId);
define_uuid!(pub OrganizationIdDomain => OrganizationId);
define_uuid!(pub ApprovalIdDomain => ApprovalId);
define_uuid!(pub AgentIdDomain => AgentId);
define_uuid!(pub FileIdDomain => FileId);
define_uuid!(pub ArtifactIdDomain => ArtifactId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_creates_non_nil_ids() {
        assert!(!WorkflowId::v4().is_nil());
        assert!(!OrganizationId::v4().is_nil());
        assert!(!ApprovalId::v4().is_nil());
        assert!(!AgentId::v4().is_nil());
        assert!(!FileId::v4().is_nil());
        assert!(!ArtifactId::v4().is_nil());
    }

    #[test]
    fn parse_valid_uuid_string() {
        let id = WorkflowId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn parse_invalid_string_fails() {
        assert!(WorkflowId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn serde_json_roundtrip() {
        let id = ApprovalId::v4();
        let json = serde_json::to_string(&id).unwrap();
        let back: ApprovalId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn distinct_id_types_do_not_mix() {
        fn accepts_workflow(_id: WorkflowId) {}
        fn accepts_org(_id: OrganizationId) {}

        accepts_workflow(WorkflowId::v4());
        accepts_org(OrganizationId::v4());
        // accepts_workflow(OrganizationId::v4()); // Would not compile
    }
}
