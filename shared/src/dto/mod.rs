//! Cross-crate DTOs: the message shapes `core`, `services/api` and
//! `services/worker` all need to agree on without depending on each
//! other's internals.

pub mod feedback;
pub mod provider;
pub mod tracking;
