use std::time::Duration;

use reqwest::Client;

use crate::config::Config;

/// Builds the shared client; a zero timeout leaves requests unbounded.
pub fn build_http_client(config: &Config) -> reqwest::Result<Client> {
    let mut builder = Client::builder().user_agent(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
    ));
    if config.http_timeout_seconds > 0 {
        builder = builder.timeout(Duration::from_secs(config.http_timeout_seconds));
    }
    builder.build()
}
