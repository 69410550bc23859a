use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub trusted_hosts: Vec<String>,
    pub dev_auth_overrides_enabled: bool,
    pub rate_limit_enabled: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_min_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub db_pool_idle_timeout_seconds: u64,
    pub auth_jwt_secret: Option<String>,
    pub auth_url: Option<String>,
    pub auth_service_key: Option<String>,
    pub admin_emails: Vec<String>,
    pub storage_bucket: Option<String>,
    pub storage_region: String,
    pub storage_endpoint: Option<String>,
    pub storage_public_base_url: Option<String>,
    pub public_listings_cache_ttl_seconds: u64,
    pub public_listings_cache_max_entries: u64,
    pub wizard_session_ttl_seconds: u64,
    pub wizard_session_max_entries: u64,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "Property Admin API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/v1")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:3000")),
            trusted_hosts: parse_csv(&env_or("TRUSTED_HOSTS", "localhost,127.0.0.1")),
            dev_auth_overrides_enabled: env_parse_bool_or("DEV_AUTH_OVERRIDES_ENABLED", false),
            rate_limit_enabled: env_parse_bool_or("RATE_LIMIT_ENABLED", true),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            database_url: env_opt("DATABASE_URL"),
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_min_connections: env_parse_or("DB_POOL_MIN_CONNECTIONS", 1),
            db_pool_acquire_timeout_seconds: env_parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            db_pool_idle_timeout_seconds: env_parse_or("DB_POOL_IDLE_TIMEOUT_SECONDS", 600),
            auth_jwt_secret: env_opt("AUTH_JWT_SECRET"),
            auth_url: env_opt("AUTH_URL"),
            auth_service_key: env_opt("AUTH_SERVICE_KEY"),
            admin_emails: parse_csv(&env_or("ADMIN_EMAILS", ""))
                .into_iter()
                .map(|email| email.to_ascii_lowercase())
                .collect(),
            storage_bucket: env_opt("STORAGE_BUCKET"),
            storage_region: env_or("STORAGE_REGION", "us-east-1"),
            storage_endpoint: env_opt("STORAGE_ENDPOINT"),
            storage_public_base_url: env_opt("STORAGE_PUBLIC_BASE_URL"),
            public_listings_cache_ttl_seconds: env_parse_or(
                "PUBLIC_LISTINGS_CACHE_TTL_SECONDS",
                15,
            ),
            public_listings_cache_max_entries: env_parse_or(
                "PUBLIC_LISTINGS_CACHE_MAX_ENTRIES",
                500,
            ),
            wizard_session_ttl_seconds: env_parse_or("WIZARD_SESSION_TTL_SECONDS", 3600),
            wizard_session_max_entries: env_parse_or("WIZARD_SESSION_MAX_ENTRIES", 200),
            max_upload_bytes: env_parse_or("MAX_UPLOAD_BYTES", 25 * 1024 * 1024),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    pub fn auth_dev_overrides_enabled(&self) -> bool {
        if self.is_production() {
            return false;
        }
        self.dev_auth_overrides_enabled
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_ascii_lowercase();
        !email.is_empty() && self.admin_emails.iter().any(|admin| admin == &email)
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref().map(str::to_ascii_lowercase) {
        Some(value) if value == "1" || value == "true" || value == "yes" || value == "on" => true,
        Some(value) if value == "0" || value == "false" || value == "no" || value == "off" => false,
        Some(_) => default,
        None => default,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/v1".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        app_name: "Property Admin API".to_string(),
        environment: "test".to_string(),
        api_prefix: "/v1".to_string(),
        host: "127.0.0.1".to_string(),
        port: 8000,
        cors_origins: Vec::new(),
        trusted_hosts: vec!["localhost".to_string()],
        dev_auth_overrides_enabled: false,
        rate_limit_enabled: false,
        rate_limit_per_second: 10,
        rate_limit_burst_size: 100,
        database_url: None,
        db_pool_max_connections: 1,
        db_pool_min_connections: 0,
        db_pool_acquire_timeout_seconds: 1,
        db_pool_idle_timeout_seconds: 60,
        auth_jwt_secret: None,
        auth_url: None,
        auth_service_key: None,
        admin_emails: vec!["owner@example.com".to_string()],
        storage_bucket: None,
        storage_region: "us-east-1".to_string(),
        storage_endpoint: None,
        storage_public_base_url: None,
        public_listings_cache_ttl_seconds: 15,
        public_listings_cache_max_entries: 10,
        wizard_session_ttl_seconds: 60,
        wizard_session_max_entries: 10,
        max_upload_bytes: 1024,
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_prefix, parse_csv, test_config};

    #[test]
    fn normalizes_prefix() {
        assert_eq!(normalize_prefix("v1"), "/v1");
        assert_eq!(normalize_prefix("/v1/"), "/v1");
        assert_eq!(normalize_prefix(""), "/v1");
    }

    #[test]
    fn parses_csv_lists() {
        assert_eq!(parse_csv(" a@x.com, ,b@x.com "), vec!["a@x.com", "b@x.com"]);
        assert!(parse_csv("").is_empty());
    }

    #[test]
    fn matches_admin_emails_case_insensitively() {
        let config = test_config();
        assert!(config.is_admin_email(" Owner@Example.com "));
        assert!(!config.is_admin_email("guest@example.com"));
        assert!(!config.is_admin_email(""));
    }
}
