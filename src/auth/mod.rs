/// Authentication
///
/// JWT access and refresh tokens delivered as HttpOnly cookies, and the [`AuthUser`]
/// extractor that guards every user-scoped route.

pub mod extractor;
pub mod tokens;

pub use extractor::AuthUser;
pub use tokens::{Claims, TokenService, ACCESS_COOKIE, REFRESH_COOKIE};
