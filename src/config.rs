use chrono::FixedOffset;
use reqwest::Method;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    ParseFile {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Environment(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// How the `SSL` setting is interpreted when `URI` has no scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslParsing {
    /// Loose comparison against boolean true: only a value numerically
    /// equal to 1 selects https (`1`, `1.0`, `0x1`, `0b1`, `0o1`).
    /// `"true"` does not.
    #[default]
    Legacy,
    /// Conventional boolean parsing (`true/1/yes/on`, `false/0/no/off`).
    Boolean,
}

impl FromStr for SslParsing {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(SslParsing::Legacy),
            "boolean" | "bool" => Ok(SslParsing::Boolean),
            other => Err(ConfigError::Invalid {
                name: "SSL_PARSING",
                reason: format!("expected 'legacy' or 'boolean', got '{other}'"),
            }),
        }
    }
}

impl SslParsing {
    /// Decides whether the given raw `SSL` value selects https.
    pub fn use_https(self, raw: Option<&str>) -> Result<bool, ConfigError> {
        let Some(raw) = raw else {
            return Ok(false);
        };
        match self {
            SslParsing::Legacy => Ok(loose_number(raw) == Some(1.0)),
            SslParsing::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" | "" => Ok(false),
                other => Err(ConfigError::Invalid {
                    name: "SSL",
                    reason: format!("'{other}' is not a boolean"),
                }),
            },
        }
    }
}

/// Numeric reading of a text value for the loose comparison: blank is 0,
/// `0x`/`0b`/`0o` prefixes are integers in that radix (unsigned only),
/// anything else goes through the decimal float parser.
fn loose_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return Some(0.0);
    }
    let radix = match s.get(..2).map(str::to_ascii_lowercase).as_deref() {
        Some("0x") => Some(16),
        Some("0b") => Some(2),
        Some("0o") => Some(8),
        _ => None,
    };
    match radix {
        Some(radix) => u64::from_str_radix(&s[2..], radix).ok().map(|v| v as f64),
        None => s.parse::<f64>().ok(),
    }
}

#[derive(Clone)]
pub struct SaslCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub bootstrap_servers: String,
    pub credentials: Option<SaslCredentials>,
    /// Explicit `security.protocol`; derived from `credentials` when unset.
    pub security_protocol: Option<String>,
    pub delivery_timeout: Duration,
}

impl KafkaSettings {
    pub fn security_protocol(&self) -> &str {
        match (&self.security_protocol, &self.credentials) {
            (Some(protocol), _) => protocol,
            (None, Some(_)) => "SASL_SSL",
            (None, None) => "PLAINTEXT",
        }
    }
}

/// Immutable process configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Scheme-qualified URL that gets probed.
    pub target_url: String,
    pub expected_status_code: u16,
    /// Total number of probe attempts.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub http_method: Method,
    pub timestamp_offset: FixedOffset,
    pub kafka: KafkaSettings,
    pub log_dir: Option<String>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialConfig {
    uri: Option<String>,
    ssl: Option<String>,
    ssl_parsing: Option<String>,
    expected_status_code: Option<u16>,
    max_retries: Option<u32>,
    retry_delay_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    http_method: Option<String>,
    timestamp_utc_offset: Option<String>,
    kafka_server: Option<String>,
    kafka_user: Option<String>,
    kafka_password: Option<String>,
    kafka_security_protocol: Option<String>,
    kafka_delivery_timeout_secs: Option<u64>,
    log_dir: Option<String>,
}

fn default_expected_status_code() -> u16 {
    200
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_delivery_timeout_secs() -> u64 {
    10
}

impl HealthCheckConfig {
    /// Loads `.env`, the optional TOML file and the process environment.
    /// Environment values override file values.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path_str) if Path::new(path_str).exists() => {
                let contents = fs::read_to_string(path_str).map_err(|source| ConfigError::ReadFile {
                    path: path_str.to_string(),
                    source,
                })?;
                toml::from_str(&contents).map_err(|source| ConfigError::ParseFile {
                    path: path_str.to_string(),
                    source,
                })?
            }
            _ => PartialConfig::default(),
        };

        let env_config: PartialConfig = envy::from_env()?;

        Self::from_layers(env_config, file_config)
    }

    fn from_layers(env: PartialConfig, file: PartialConfig) -> Result<Self, ConfigError> {
        let uri = non_empty(env.uri.or(file.uri)).ok_or(ConfigError::Missing("URI"))?;
        let bootstrap_servers =
            non_empty(env.kafka_server.or(file.kafka_server)).ok_or(ConfigError::Missing("KAFKA_SERVER"))?;

        let ssl_parsing = match env.ssl_parsing.or(file.ssl_parsing) {
            Some(raw) => raw.parse()?,
            None => SslParsing::default(),
        };
        let target_url = resolve_target(&uri, env.ssl.or(file.ssl).as_deref(), ssl_parsing)?;

        let max_retries = env
            .max_retries
            .or(file.max_retries)
            .unwrap_or_else(default_max_retries);
        if max_retries == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_RETRIES",
                reason: "at least one attempt is required".to_string(),
            });
        }

        let http_method = match env.http_method.or(file.http_method) {
            Some(raw) => Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes()).map_err(|e| {
                ConfigError::Invalid {
                    name: "HTTP_METHOD",
                    reason: e.to_string(),
                }
            })?,
            None => Method::GET,
        };

        let timestamp_offset = match env.timestamp_utc_offset.or(file.timestamp_utc_offset) {
            Some(raw) => parse_utc_offset(&raw)?,
            None => FixedOffset::east_opt(0).ok_or(ConfigError::Invalid {
                name: "TIMESTAMP_UTC_OFFSET",
                reason: "UTC offset out of range".to_string(),
            })?,
        };

        let credentials = match (
            non_empty(env.kafka_user.or(file.kafka_user)),
            non_empty(env.kafka_password.or(file.kafka_password)),
        ) {
            (Some(username), Some(password)) => Some(SaslCredentials { username, password }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    name: "KAFKA_USER",
                    reason: "KAFKA_USER and KAFKA_PASSWORD must be set together".to_string(),
                })
            }
        };

        Ok(HealthCheckConfig {
            target_url,
            expected_status_code: env
                .expected_status_code
                .or(file.expected_status_code)
                .unwrap_or_else(default_expected_status_code),
            max_retries,
            retry_delay: Duration::from_secs(
                env.retry_delay_secs
                    .or(file.retry_delay_secs)
                    .unwrap_or_else(default_retry_delay_secs),
            ),
            request_timeout: positive_secs(
                "REQUEST_TIMEOUT_SECS",
                env.request_timeout_secs
                    .or(file.request_timeout_secs)
                    .unwrap_or_else(default_request_timeout_secs),
            )?,
            http_method,
            timestamp_offset,
            kafka: KafkaSettings {
                bootstrap_servers,
                credentials,
                security_protocol: non_empty(env.kafka_security_protocol.or(file.kafka_security_protocol)),
                delivery_timeout: positive_secs(
                    "KAFKA_DELIVERY_TIMEOUT_SECS",
                    env.kafka_delivery_timeout_secs
                        .or(file.kafka_delivery_timeout_secs)
                        .unwrap_or_else(default_delivery_timeout_secs),
                )?,
            },
            log_dir: non_empty(env.log_dir.or(file.log_dir)),
        })
    }
}

fn positive_secs(name: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be at least 1 second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Builds the probe URL. A `URI` that already names a scheme wins over `SSL`.
pub fn resolve_target(uri: &str, ssl: Option<&str>, parsing: SslParsing) -> Result<String, ConfigError> {
    let uri = uri.trim();
    let lower = uri.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(uri.to_string());
    }
    let scheme = if parsing.use_https(ssl)? { "https" } else { "http" };
    Ok(format!("{scheme}://{uri}"))
}

/// Parses offsets such as `+05:30`, `-0800`, `+02` or `Z`.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        name: "TIMESTAMP_UTC_OFFSET",
        reason: format!("'{raw}': {reason}"),
    };

    let s = raw.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| invalid("out of range"));
    }

    let (sign, rest) = match s.chars().next() {
        Some('+') => (1, &s[1..]),
        Some('-') => (-1, &s[1..]),
        _ => return Err(invalid("must start with '+' or '-'")),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("expected digits"));
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.as_str(), "0"),
        4 => digits.split_at(2),
        _ => return Err(invalid("expected hh, hhmm or hh:mm")),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid("bad hours"))?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid("bad minutes"))?;
    if minutes >= 60 {
        return Err(invalid("minutes must be below 60"));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(|| invalid("out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_layer(pairs: &[(&str, &str)]) -> PartialConfig {
        envy::from_iter(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string()))).unwrap()
    }

    fn minimal_env() -> Vec<(&'static str, &'static str)> {
        vec![("URI", "example.com/health"), ("KAFKA_SERVER", "kafka:9092")]
    }

    #[test]
    fn test_defaults_applied() {
        let config = HealthCheckConfig::from_layers(env_layer(&minimal_env()), PartialConfig::default()).unwrap();

        assert_eq!(config.target_url, "http://example.com/health");
        assert_eq!(config.expected_status_code, 200);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.http_method, Method::GET);
        assert_eq!(config.timestamp_offset.local_minus_utc(), 0);
        assert_eq!(config.kafka.bootstrap_servers, "kafka:9092");
        assert!(config.kafka.credentials.is_none());
        assert_eq!(config.kafka.security_protocol(), "PLAINTEXT");
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_full_environment() {
        let env = env_layer(&[
            ("URI", "status.internal:8443/ready"),
            ("SSL", "1"),
            ("EXPECTED_STATUS_CODE", "204"),
            ("MAX_RETRIES", "5"),
            ("RETRY_DELAY_SECS", "0"),
            ("HTTP_METHOD", "head"),
            ("TIMESTAMP_UTC_OFFSET", "+05:30"),
            ("KAFKA_SERVER", "broker-1:9093"),
            ("KAFKA_USER", "svc"),
            ("KAFKA_PASSWORD", "hunter2"),
        ]);
        let config = HealthCheckConfig::from_layers(env, PartialConfig::default()).unwrap();

        assert_eq!(config.target_url, "https://status.internal:8443/ready");
        assert_eq!(config.expected_status_code, 204);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::ZERO);
        assert_eq!(config.http_method, Method::HEAD);
        assert_eq!(config.timestamp_offset.local_minus_utc(), 5 * 3600 + 30 * 60);
        let credentials = config.kafka.credentials.as_ref().unwrap();
        assert_eq!(credentials.username, "svc");
        assert_eq!(credentials.password, "hunter2");
        assert_eq!(config.kafka.security_protocol(), "SASL_SSL");
    }

    #[test]
    fn test_environment_overrides_file() {
        let file: PartialConfig = toml::from_str(
            r#"
            uri = "file-host"
            kafka_server = "file-broker:9092"
            max_retries = 7
            expected_status_code = 301
            "#,
        )
        .unwrap();
        let env = env_layer(&[("URI", "env-host"), ("MAX_RETRIES", "2")]);

        let config = HealthCheckConfig::from_layers(env, file).unwrap();
        assert_eq!(config.target_url, "http://env-host");
        assert_eq!(config.kafka.bootstrap_servers, "file-broker:9092");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.expected_status_code, 301);
    }

    #[test]
    fn test_missing_required_values() {
        let err = HealthCheckConfig::from_layers(env_layer(&[("KAFKA_SERVER", "k:9092")]), PartialConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("URI")));

        let err = HealthCheckConfig::from_layers(env_layer(&[("URI", "host")]), PartialConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("KAFKA_SERVER")));

        let err = HealthCheckConfig::from_layers(
            env_layer(&[("URI", "  "), ("KAFKA_SERVER", "k:9092")]),
            PartialConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("URI")));
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut pairs = minimal_env();
        pairs.push(("MAX_RETRIES", "0"));
        let err = HealthCheckConfig::from_layers(env_layer(&pairs), PartialConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "MAX_RETRIES", .. }));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        for name in ["REQUEST_TIMEOUT_SECS", "KAFKA_DELIVERY_TIMEOUT_SECS"] {
            let mut pairs = minimal_env();
            pairs.push((name, "0"));
            let err = HealthCheckConfig::from_layers(env_layer(&pairs), PartialConfig::default()).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { name: rejected, .. } if rejected == name),
                "{name}: {err}"
            );
        }
    }

    #[test]
    fn test_non_numeric_retries_rejected() {
        let result = envy::from_iter::<_, PartialConfig>(vec![("MAX_RETRIES".to_string(), "three".to_string())]);
        assert!(result.is_err());
    }

    #[test]
    fn test_half_credentials_rejected() {
        let mut pairs = minimal_env();
        pairs.push(("KAFKA_USER", "svc"));
        let err = HealthCheckConfig::from_layers(env_layer(&pairs), PartialConfig::default()).unwrap_err();
        assert!(err.to_string().contains("must be set together"));
    }

    #[test]
    fn test_explicit_security_protocol() {
        let mut pairs = minimal_env();
        pairs.extend([
            ("KAFKA_USER", "svc"),
            ("KAFKA_PASSWORD", "pw"),
            ("KAFKA_SECURITY_PROTOCOL", "SASL_PLAINTEXT"),
        ]);
        let config = HealthCheckConfig::from_layers(env_layer(&pairs), PartialConfig::default()).unwrap();
        assert_eq!(config.kafka.security_protocol(), "SASL_PLAINTEXT");
    }

    #[test]
    fn test_password_not_in_debug_output() {
        let credentials = SaslCredentials {
            username: "svc".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("svc"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_legacy_ssl_parsing() {
        let legacy = SslParsing::Legacy;
        assert!(!legacy.use_https(None).unwrap());
        assert!(legacy.use_https(Some("1")).unwrap());
        assert!(legacy.use_https(Some(" 1 ")).unwrap());
        assert!(legacy.use_https(Some("1.0")).unwrap());
        assert!(!legacy.use_https(Some("true")).unwrap());
        assert!(!legacy.use_https(Some("TRUE")).unwrap());
        assert!(!legacy.use_https(Some("0")).unwrap());
        assert!(!legacy.use_https(Some("")).unwrap());
        assert!(!legacy.use_https(Some("yes")).unwrap());
    }

    #[test]
    fn test_legacy_ssl_accepts_prefixed_integers() {
        let legacy = SslParsing::Legacy;
        assert!(legacy.use_https(Some("0x1")).unwrap());
        assert!(legacy.use_https(Some("0X01")).unwrap());
        assert!(legacy.use_https(Some("0b1")).unwrap());
        assert!(legacy.use_https(Some("0o1")).unwrap());
        assert!(!legacy.use_https(Some("0x2")).unwrap());
        assert!(!legacy.use_https(Some("0x")).unwrap());
        assert!(!legacy.use_https(Some("-0x1")).unwrap());
    }

    #[test]
    fn test_boolean_ssl_parsing() {
        let boolean = SslParsing::Boolean;
        assert!(!boolean.use_https(None).unwrap());
        assert!(boolean.use_https(Some("true")).unwrap());
        assert!(boolean.use_https(Some("True")).unwrap());
        assert!(boolean.use_https(Some("1")).unwrap());
        assert!(boolean.use_https(Some("on")).unwrap());
        assert!(!boolean.use_https(Some("false")).unwrap());
        assert!(!boolean.use_https(Some("")).unwrap());
        assert!(boolean.use_https(Some("maybe")).is_err());
    }

    #[test]
    fn test_ssl_parsing_selected_by_environment() {
        let mut pairs = minimal_env();
        pairs.extend([("SSL", "true"), ("SSL_PARSING", "boolean")]);
        let config = HealthCheckConfig::from_layers(env_layer(&pairs), PartialConfig::default()).unwrap();
        assert_eq!(config.target_url, "https://example.com/health");

        let mut pairs = minimal_env();
        pairs.push(("SSL", "true"));
        let config = HealthCheckConfig::from_layers(env_layer(&pairs), PartialConfig::default()).unwrap();
        assert_eq!(config.target_url, "http://example.com/health");

        let mut pairs = minimal_env();
        pairs.push(("SSL_PARSING", "strict"));
        assert!(HealthCheckConfig::from_layers(env_layer(&pairs), PartialConfig::default()).is_err());
    }

    #[test]
    fn test_scheme_in_uri_wins() {
        assert_eq!(
            resolve_target("https://a.example/h", Some("0"), SslParsing::Boolean).unwrap(),
            "https://a.example/h"
        );
        assert_eq!(
            resolve_target("HTTP://a.example", Some("1"), SslParsing::Legacy).unwrap(),
            "HTTP://a.example"
        );
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("+05:30").unwrap().local_minus_utc(), 19800);
        assert_eq!(parse_utc_offset("-0800").unwrap().local_minus_utc(), -28800);
        assert_eq!(parse_utc_offset("+02").unwrap().local_minus_utc(), 7200);
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("05:30").is_err());
        assert!(parse_utc_offset("+05:75").is_err());
        assert!(parse_utc_offset("+123").is_err());
        assert!(parse_utc_offset("+ab:cd").is_err());
    }
}
