// Lineup core - festival lineup scheduling and promoter/artist invitations

// Core types and primitives
pub mod core;

// Persistence, ids, viewer context and collaborator directories
pub mod infrastructure;

// Domain models
pub mod models;

// Services
pub mod invitations;
pub mod scheduling;

// HTTP surface and wiring
pub mod api;
pub mod app_state;
pub mod config;

// Common utilities
pub mod error;
pub mod data_seeder;

// Re-exports for convenience
pub use error::{AppError, AppResult};
