//! Services layer for care-service.
//!
//! Tenant context resolution, the row-level isolation filter, home scoping,
//! session issuing, membership management and the audit writer, all on top
//! of the `CareStore` persistence seam.

pub mod audit;
pub mod context;
mod database;
pub mod error;
pub mod home_scope;
pub mod incident_number;
pub mod isolation;
pub mod jwt;
pub mod membership;
mod memory;
pub mod onboarding;
pub mod policy;
pub mod session;
pub mod store;

pub use audit::{AuditPage, AuditQuery, AuditWriter};
pub use context::{resolve_caller, Caller, Principal, TenantContext};
pub use database::Database;
pub use error::ServiceError;
pub use home_scope::{HomeScope, HomeScopeService};
pub use isolation::TenantRecords;
pub use jwt::{JwtService, SessionClaims, TokenUse};
pub use membership::{MembershipChange, MembershipRejection, MembershipService};
pub use memory::MemoryStore;
pub use onboarding::OnboardingService;
pub use session::{LoginOutcome, SessionService, SessionToken};
pub use store::{CareStore, StoreError};
