pub mod factory;
pub mod gate;
pub mod guest;
pub mod ip_binding;
pub mod token;

pub use factory::build_gate;
pub use gate::{AuthDecision, AuthorizationGate, Policy};
