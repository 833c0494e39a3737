pub mod config;
pub mod models;
pub mod utils;

pub use crate::config::*;
pub use crate::models::*;
pub use crate::utils::*;
