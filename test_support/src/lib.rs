//! ABOUTME: Fixture constants and unique-name helpers for seatdesk tests
//! ABOUTME: Common test fixtures for all crates

/// Password used for fixture accounts
pub const TEST_PASSWORD: &str = "password123";

/// Session secret long enough to pass config validation
pub const TEST_SESSION_SECRET: &str = "test_session_secret_32_characters_min";

/// A fixed billing month for report fixtures
pub const TEST_MONTH: &str = "2024-03";

/// A date inside [`TEST_MONTH`]
pub const TEST_DATE: &str = "2024-03-10";

/// Unique, readable name for fixtures that hit unique constraints
pub fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, ulid::Ulid::new().to_string().to_lowercase())
}

/// Email address derived from a unique name
pub fn unique_email(prefix: &str) -> String {
    format!("{}@example.com", unique_name(prefix))
}
