//! Domain types and invariants for render jobs.

pub mod job;
pub mod tier;
