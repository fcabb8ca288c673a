//! Test fixtures.

use axum::http::HeaderMap;
use chat_relay::config::Config;
use std::collections::HashMap;

/// Identity header used by [`test_config`].
pub const TEST_IDENTITY_HEADER: &str = "x-authenticated-user";

/// In-memory configuration with short timeouts.
pub fn test_config() -> Config {
    test_config_with(&[])
}

/// [`test_config`] with extra variables layered on top.
pub fn test_config_with(overrides: &[(&str, &str)]) -> Config {
    let mut vars = HashMap::from([
        ("RELAY_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ("RELAY_STORE_TIMEOUT_MS".to_string(), "500".to_string()),
        ("RELAY_SEND_TIMEOUT_MS".to_string(), "200".to_string()),
        (
            "RELAY_IDENTITY_HEADER".to_string(),
            TEST_IDENTITY_HEADER.to_string(),
        ),
        ("RELAY_REQUEST_TIMEOUT_SECONDS".to_string(), "5".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert((*key).to_string(), (*value).to_string());
    }

    Config::from_vars(&vars).expect("test config should be valid")
}

/// Headers identifying the caller as `identity`.
pub fn identity_headers(identity: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        TEST_IDENTITY_HEADER,
        identity.parse().expect("identity should be a valid header value"),
    );
    headers
}
