mod user;

pub use user::{AuthUser, AUTH_USER_HEADER};
