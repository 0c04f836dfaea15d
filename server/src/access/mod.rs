//! Guild access resolution.
//!
//! - Role requirements: both role schemas normalized into one view
//! - Resolver: single-guild checks, accessible-guild listing, membership reports
//! - Store: read access to guild records

pub mod membership;
pub mod models;
pub mod requirement;
pub mod resolver;
pub mod store;

pub use membership::{GuildMembership, GuildPermissionsReport};
pub use models::Guild;
pub use requirement::{RoleRequirement, RoleSource, RoleSources, UnconfiguredPolicy};
pub use resolver::{
    evaluate_guild, AccessDecision, AccessError, AccessPolicy, AccessRequest, AccessResolver,
    AccessTier,
};
pub use store::{GuildStore, MemoryGuildStore, PgGuildStore, StoreError};
