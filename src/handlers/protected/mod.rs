// handlers/protected/mod.rs - endpoints behind the JWT middleware
//
// Every handler receives the caller as `Extension<AuthUser>`. Role checks
// happen in the handler; ownership checks happen in the services.

pub mod activities;
pub mod analytics;
pub mod applications;
pub mod audit;
pub mod auth;
pub mod clients;
pub mod follow_ups;
pub mod jobs;
pub mod leads;
pub mod notifications;
pub mod onboarding;
pub mod rules;
pub mod system_health;
pub mod users;
