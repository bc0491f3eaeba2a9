//! Authentication module

pub mod context;
pub mod identity;
pub mod jwt;
pub mod middleware;
pub mod org_key;

pub use context::RequestContext;
pub use identity::IdentityResolver;
pub use jwt::{Claims, JwtService};
pub use middleware::{auth_middleware, extract_token};
pub use org_key::OrgKeyGenerator;
