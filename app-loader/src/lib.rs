// app-loader/src/lib.rs
pub mod api;
pub mod error;
pub mod loader;
pub mod middleware;
pub mod profile;
pub mod redirects;
pub mod responder;
pub mod store;
pub mod transition_cache;
pub mod upstream;

pub use error::{LoaderError, LoaderResult};
pub use loader::{AppLoader, LoadOutcome};
pub use profile::{AppRegistry, AppRuntime, AuthProfile, LoginContext};
pub use store::{KeyValueStore, MemoryStore};
