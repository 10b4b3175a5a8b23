//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Access logger, on every route
//! 2. Session validator, on protected `/api` routes

pub mod audit;
pub mod auth;
