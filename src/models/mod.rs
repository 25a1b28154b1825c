// Models module - Backend ledger wire types

pub mod auth;
pub mod card;
pub mod page;
pub mod request;
pub mod wire;

pub use auth::{AuthResponse, LoginCredentials, UserRole};
pub use card::{Card, CardStatus};
pub use page::Page;
pub use request::{LifecycleRequest, ReasonCode, RequestStatus};
