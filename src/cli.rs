//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::gatekeeper::RouteTable;
use clap::Parser;
use tracing::error;
use url::Url;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Feedgate",
    about = "Web tier with session gatekeeping and credential teardown"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Base URL of the backend API (e.g., "https://api.example.com/v1")
    #[arg(long, env = "BACKEND_URL")]
    pub backend_url: String,

    /// Public origin browsers use to reach this server. Cookies are marked Secure when it is HTTPS
    #[arg(long, env = "PUBLIC_ORIGIN", default_value = "http://localhost:3000")]
    pub public_origin: String,

    /// Additional route reachable without a session (repeatable)
    #[arg(long = "public-route")]
    pub public_routes: Vec<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Parse and validate the backend URL.
/// Returns None and logs an error if validation fails.
pub fn validate_backend_url(backend_url: &str) -> Option<Url> {
    let url = match Url::parse(backend_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %backend_url, error = %e, "Invalid backend URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        error!(url = %backend_url, "Backend URL must use http or https");
        return None;
    }

    Some(url)
}

/// Parse and validate the public origin.
/// Returns None and logs an error if validation fails.
pub fn validate_public_origin(public_origin: &str) -> Option<Url> {
    let url = match Url::parse(public_origin) {
        Ok(url) => url,
        Err(e) => {
            error!(origin = %public_origin, error = %e, "Invalid public origin URL");
            return None;
        }
    };

    let is_https = url.scheme() == "https";
    let is_localhost = url.host_str() == Some("localhost");

    if !is_https && !is_localhost {
        error!("public-origin must use HTTPS for non-localhost deployments");
        return None;
    }

    Some(url)
}

fn validate_route(route: &str) -> bool {
    route.starts_with('/') && !route.chars().any(|c| !c.is_ascii() || c.is_whitespace())
}

/// Build ServerConfig from validated arguments.
/// Returns None and logs an error if a public route is malformed.
pub fn build_config(
    backend_url: Url,
    public_origin: &Url,
    public_routes: Vec<String>,
) -> Option<ServerConfig> {
    let mut routes = RouteTable::default();
    for route in public_routes {
        if !validate_route(&route) {
            error!(route = %route, "Public route must start with '/' and contain no whitespace");
            return None;
        }
        routes = routes.with_public(route);
    }

    Some(ServerConfig {
        backend_url,
        secure_cookies: public_origin.scheme() == "https",
        routes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_backend_url() {
        assert!(validate_backend_url("https://api.example.com/v1").is_some());
        assert!(validate_backend_url("http://127.0.0.1:8080").is_some());
        assert!(validate_backend_url("ftp://api.example.com").is_none());
        assert!(validate_backend_url("not a url").is_none());
    }

    #[test]
    fn test_validate_public_origin() {
        assert!(validate_public_origin("https://feed.example.com").is_some());
        assert!(validate_public_origin("http://localhost:3000").is_some());
        assert!(validate_public_origin("http://feed.example.com").is_none());
    }

    #[test]
    fn test_build_config_secure_cookies() {
        let backend = Url::parse("http://localhost:8080").unwrap();
        let https = Url::parse("https://feed.example.com").unwrap();
        let http = Url::parse("http://localhost:3000").unwrap();

        assert!(build_config(backend.clone(), &https, vec![]).unwrap().secure_cookies);
        assert!(!build_config(backend, &http, vec![]).unwrap().secure_cookies);
    }

    #[test]
    fn test_build_config_rejects_bad_route() {
        let backend = Url::parse("http://localhost:8080").unwrap();
        let origin = Url::parse("http://localhost:3000").unwrap();

        assert!(build_config(backend.clone(), &origin, vec!["about".into()]).is_none());
        let config = build_config(backend, &origin, vec!["/about".into()]).unwrap();
        assert_eq!(
            config.routes.classify("/about"),
            crate::gatekeeper::PathClass::Public
        );
    }
}
