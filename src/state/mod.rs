//! Word persistence and in-memory practice state

mod app_state;
mod database;

pub use app_state::PracticeState;
pub use database::{JsonWordStore, WordStore};

#[cfg(test)]
pub use database::MemoryWordStore;
