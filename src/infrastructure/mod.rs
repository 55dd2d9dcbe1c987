//! Infrastructure layer: persistence and event plumbing

pub mod database;
pub mod events;
