//! fucina — render-job orchestration service.
//!
//! Accepts render submissions over HTTP, picks a compute tier, runs each job
//! through a supervised pipeline (audio acquisition, front-end bootstrap,
//! render invocation, artifact persistence) on a detached worker, reports
//! progress to an external control plane via webhook callbacks, and answers
//! zero-wait status polls against the in-memory execution registry.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
