//! Remote writes with optimistic updates and rollback.

mod engine;

pub use engine::{Mutation, MutationEngine};
