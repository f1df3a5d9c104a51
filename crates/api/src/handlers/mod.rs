//! Request handlers, grouped by resource.

pub mod accounts;
pub mod audit;
pub mod auth;
pub mod transfers;
