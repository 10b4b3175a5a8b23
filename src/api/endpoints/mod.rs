//! HTTP endpoint handlers.
//!
//! JSON handlers live under `/api`; `pages` and `diagnostics` serve the
//! web views. Handlers delegate to the clinic and auth services.

pub mod auth;
pub mod billing;
pub mod diagnostics;
pub mod health;
pub mod network;
pub mod pages;
pub mod patients;
pub mod visits;
