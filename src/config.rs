//! Environment-based configuration accessors

use std::env;

/// Deployment environment, e.g. "production" or "sandbox".
pub fn get_environment() -> String {
    env::var("ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string())
}

/// Postgres connection string for the price store.
pub fn get_database_url() -> String {
    env::var("DATABASE_URL")
        .unwrap_or_else(|_| "host=localhost user=postgres dbname=banggia".to_string())
}

/// Admin console passcode. Admin routes answer 503 until this is set.
pub fn get_admin_passcode() -> Option<String> {
    env::var("ADMIN_PASSCODE").ok().filter(|p| !p.is_empty())
}

/// Failed-passcode attempts allowed per client before lockout.
pub fn get_admin_max_attempts() -> u32 {
    env::var("ADMIN_MAX_ATTEMPTS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5)
}

/// Lockout / attempt-counting window in seconds.
pub fn get_admin_lockout_seconds() -> u64 {
    env::var("ADMIN_LOCKOUT_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(300)
}
