pub mod aggregate;
pub mod models;
pub mod permissions;
pub mod workflow;
