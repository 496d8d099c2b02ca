// handlers/public/mod.rs - endpoints reachable without a JWT
//
// Login and logout, the public view and submit endpoints of onboarding forms,
// and the cron endpoints guarded by the shared cron secret.

pub mod auth;
pub mod cron;
pub mod onboarding;
