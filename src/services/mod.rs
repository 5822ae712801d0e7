pub mod auth;
pub mod forward;
