pub mod auth;
pub mod backend;
pub mod calendar;
pub mod policy;
pub mod realtime;
pub mod service;
pub mod storage;

pub use auth::{IdentityClaim, TokenPair};
pub use backend::Backend;
pub use calendar::{AccessLevel, Calendar, Event, User, UserRole};
pub use policy::{AuthzDecision, DenyReason, MutationPolicy, PolicyEngine};
pub use service::ServiceError;
