/// Crate version, or `HEALTHCHECK_VERSION` when set at build time
/// (release pipelines stamp the git tag there).
pub const VERSION: &str = match option_env!("HEALTHCHECK_VERSION") {
    Some(stamped) => stamped,
    None => env!("CARGO_PKG_VERSION"),
};

/// User agent sent with every probe request.
pub fn user_agent() -> String {
    format!("healthcheck-publisher/{VERSION}")
}
