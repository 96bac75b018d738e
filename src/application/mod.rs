//! Application services: dispatch, execution tracking, the render pipeline,
//! and control-plane callbacks.

pub mod callback;
pub mod dispatcher;
pub mod error;
pub mod pipeline;
pub mod registry;
