//! Database models split into domain-specific modules.

pub mod audit;
pub mod campaign;
pub mod common;
pub mod company;
pub mod employee;
pub mod target;
pub mod template;
pub mod user;

pub use audit::*;
pub use campaign::*;
pub use common::*;
pub use company::*;
pub use employee::*;
pub use target::*;
pub use template::*;
pub use user::*;
