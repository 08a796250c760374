pub mod audit;
pub mod auth;
pub mod bypass;
pub mod health;
pub mod homes;
pub mod members;
pub mod onboarding;
pub mod records;

pub use auth::{context, login, select_organization, switch_organization};
pub use health::{health_check, metrics};
