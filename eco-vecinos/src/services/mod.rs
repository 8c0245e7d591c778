pub mod auth_gateway;
pub mod backend;
pub mod navigation;
pub mod policy;
pub mod session_store;

pub use auth_gateway::{AuthError, AuthGateway, NewAccount};
pub use session_store::{SessionPhase, SessionRegistry, SessionStore};
