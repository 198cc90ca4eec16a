//! The closed enumeration of authorization-subject operations.

/// Every operation access control can be asked about.
///
/// `Action::ALL` exists so coverage validation can iterate the enum; keep it
/// in sync when adding variants (the `coverage_list_is_exhaustive` test
/// counts on the compiler's exhaustive match to catch omissions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    DepositionCreate,
    DepositionRead,
    DepositionUpdate,
    DepositionSubmit,
    DepositionDelete,
    DepositionApprove,
    DepositionReject,

    SchemaRead,
    SchemaCreate,
    SchemaUpdate,
    SchemaDelete,

    ConventionRead,
    ConventionCreate,
    ConventionUpdate,
    ConventionDelete,

    OntologyRead,
    OntologyCreate,
    OntologyUpdate,
    OntologyDelete,

    RecordRead,
    SearchQuery,

    ValidationCreate,
    ValidationRead,

    RoleAssign,
    RoleRevoke,
    RoleRead,
}

impl Action {
    pub const ALL: [Action; 26] = [
        Action::DepositionCreate,
        Action::DepositionRead,
        Action::DepositionUpdate,
        Action::DepositionSubmit,
        Action::DepositionDelete,
        Action::DepositionApprove,
        Action::DepositionReject,
        Action::SchemaRead,
        Action::SchemaCreate,
        Action::SchemaUpdate,
        Action::SchemaDelete,
        Action::ConventionRead,
        Action::ConventionCreate,
        Action::ConventionUpdate,
        Action::ConventionDelete,
        Action::OntologyRead,
        Action::OntologyCreate,
        Action::OntologyUpdate,
        Action::OntologyDelete,
        Action::RecordRead,
        Action::SearchQuery,
        Action::ValidationCreate,
        Action::ValidationRead,
        Action::RoleAssign,
        Action::RoleRevoke,
        Action::RoleRead,
    ];

    /// Stable `domain:verb` string used in audit lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::DepositionCreate => "deposition:create",
            Action::DepositionRead => "deposition:read",
            Action::DepositionUpdate => "deposition:update",
            Action::DepositionSubmit => "deposition:submit",
            Action::DepositionDelete => "deposition:delete",
            Action::DepositionApprove => "deposition:approve",
            Action::DepositionReject => "deposition:reject",
            Action::SchemaRead => "schema:read",
            Action::SchemaCreate => "schema:create",
            Action::SchemaUpdate => "schema:update",
            Action::SchemaDelete => "schema:delete",
            Action::ConventionRead => "convention:read",
            Action::ConventionCreate => "convention:create",
            Action::ConventionUpdate => "convention:update",
            Action::ConventionDelete => "convention:delete",
            Action::OntologyRead => "ontology:read",
            Action::OntologyCreate => "ontology:create",
            Action::OntologyUpdate => "ontology:update",
            Action::OntologyDelete => "ontology:delete",
            Action::RecordRead => "record:read",
            Action::SearchQuery => "search:query",
            Action::ValidationCreate => "validation:create",
            Action::ValidationRead => "validation:read",
            Action::RoleAssign => "role:assign",
            Action::RoleRevoke => "role:revoke",
            Action::RoleRead => "role:read",
        }
    }
}
