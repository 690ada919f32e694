mod dto;
pub mod gateway;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod signature;
