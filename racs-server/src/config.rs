//! Server configuration

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "racs", about = "Multi-project continuous-build service", long_about = None)]
pub struct Config {
    /// SSL certificate (TLS termination is expected in front of the server;
    /// the flag is accepted for compatibility and warned about)
    #[arg(long = "ssl-cert")]
    pub ssl_cert: Option<String>,

    /// SSL key
    #[arg(long = "ssl-key")]
    pub ssl_key: Option<String>,

    /// Allow all actions without login
    #[arg(long = "no-login")]
    pub no_login: bool,

    /// Web server port
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["racs"]);
        assert_eq!(config.port, 8080);
        assert!(!config.no_login);
        assert!(config.ssl_cert.is_none());
    }

    #[test]
    fn test_flags() {
        let config = Config::parse_from(["racs", "--no-login", "--port", "8081"]);
        assert_eq!(config.port, 8081);
        assert!(config.no_login);
    }
}
