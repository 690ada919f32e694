mod dto;
pub mod fallback;
pub mod handlers;
pub mod password;
pub mod provider;
pub mod repo;
pub mod repo_types;
