pub mod account;
pub mod app;
pub mod transition;

pub use account::Account;
pub use app::{AppAuthConfig, AppRuntimeDetails};
pub use transition::{AuthTransition, StoredCookie};
