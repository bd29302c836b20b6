//! Data Transfer Objects for REST request/response serialization.

pub mod common_dto;
pub mod notify_dto;

pub use common_dto::*;
pub use notify_dto::*;
