//! Infrastructure layer: stores, token signing, password hashing and the
//! services that compose them.

pub mod iam;
pub mod password;
pub mod school_context;
pub mod session;
pub mod stores;
pub mod token;

pub use iam::{IamError, IamService, SchoolAdminService};
pub use password::{PasswordError, PasswordHasher};
pub use school_context::{SchoolContextError, SchoolContextService};
pub use session::{AuthOutcome, AuthResult, SessionError, SessionService};
pub use stores::{StoreError, Stores};
pub use token::{TokenConfig, TokenError, TokenPair, TokenService};
