pub mod claim;
pub mod refresh;
pub mod token;

pub use claim::IdentityClaim;
pub use refresh::{AuthError, TokenPair, TokenService};
pub use token::{hash_token, TokenError, TokenSigner};
