pub mod assignment;
pub mod audit;
pub mod membership;
pub mod organization;
pub mod record;
pub mod user;

pub use assignment::CaregiverHomeAssignment;
pub use audit::{
    AuditAction, AuditCursor, AuditFilter, AuditLogEntry, AuditOutcome, AuditPartition,
    NewAuditEntry,
};
pub use membership::{OrgRole, OrganizationMembership, OrganizationSummary};
pub use organization::Organization;
pub use record::{NewRecord, RecordChanges, RecordFilter, RecordKind, RecordLocation, TenantRecord};
pub use user::{GlobalRole, SanitizedUser, User};
