//! API handlers module

pub mod admin;
pub mod agents;
pub mod chat;
pub mod conversations;
pub mod health;
