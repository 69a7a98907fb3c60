use std::env;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub concurrency_limit: usize,
    pub body_limit_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("APP_PORT", 3000);
        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret,
            jwt_ttl_hours: parse_or("JWT_TTL_HOURS", 24),
            concurrency_limit: parse_or("CONCURRENCY_LIMIT", 100),
            body_limit_bytes: parse_or("BODY_LIMIT_BYTES", 1024 * 1024),
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::parse_or;

    #[test]
    fn missing_or_garbage_values_fall_back() {
        assert_eq!(parse_or("STOREFRONT_CART_UNSET_KEY", 42_u16), 42);
        // SAFETY: test-local variable name, not read by any other test.
        unsafe { std::env::set_var("STOREFRONT_CART_BAD_PORT", "not-a-port") };
        assert_eq!(parse_or("STOREFRONT_CART_BAD_PORT", 3000_u16), 3000);
    }
}
