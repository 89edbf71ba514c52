//! Request middleware

pub mod auth;

pub use auth::{
    auth_middleware, check_permission, encode_token, AuthUser, CurrentUser, INVENTORY_READ,
    INVENTORY_WRITE,
};
