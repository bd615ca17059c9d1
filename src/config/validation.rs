//! Configuration validation.

use crate::config::Config;
use hyper::header::HeaderName;
use std::collections::HashSet;

/// Validate the configuration.
///
/// Checks for:
/// - A valid log level
/// - A session header that is a legal HTTP header name
/// - Control and metrics paths that start with `/`
/// - Distinct control paths
/// - A metrics address that does not collide with the front end
/// - No duplicate static servers
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing every problem found.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();
    let frontend = &config.frontend;

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    // Session header must be usable as a header name
    if frontend.session_header.is_empty()
        || HeaderName::from_bytes(frontend.session_header.as_bytes()).is_err()
    {
        errors.push(format!(
            "invalid session header name '{}'",
            frontend.session_header
        ));
    }

    // Control paths
    let control_paths = [
        ("register_path", &frontend.register_path),
        ("unregister_path", &frontend.unregister_path),
        ("end_session_path", &frontend.end_session_path),
    ];
    let mut seen = HashSet::new();
    for (name, path) in control_paths {
        if !path.starts_with('/') {
            errors.push(format!("{} '{}' must start with '/'", name, path));
        }
        if path == "/" {
            errors.push(format!("{} cannot be '/', it would shadow session routing", name));
        }
        if !seen.insert(path.as_str()) {
            errors.push(format!("duplicate control path: {}", path));
        }
    }

    // Metrics endpoint
    let metrics = &config.global.metrics;
    if metrics.enabled {
        if !metrics.path.starts_with('/') {
            errors.push(format!("metrics path '{}' must start with '/'", metrics.path));
        }
        if metrics.address == frontend.listen {
            errors.push(format!(
                "metrics address {} collides with frontend listen address",
                metrics.address
            ));
        }
    }

    // Static servers
    let mut servers = HashSet::new();
    for server in &config.balancer.servers {
        if !servers.insert(server) {
            errors.push(format!("duplicate server address: {}", server));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
