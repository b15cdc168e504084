pub mod bearer;
pub mod jwt;
pub mod password;

// Re-export the pieces the services use so we can do "use crate::auth::*;"
pub use bearer::{bearer_token, BearerShapeError};
pub use jwt::{Claims, IssuedToken, TokenError, TokenIssuer};
pub use password::{hash_blocking, verify_blocking, BcryptHasher, HashError, PasswordHasher};
