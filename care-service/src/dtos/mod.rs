//! Request and response bodies for the HTTP surface.

pub mod audit;
pub mod auth;
pub mod members;
pub mod onboarding;
pub mod records;
