//! Resolution of `env:`-indirected option values.
//!
//! A config option value of the form `env:SOME_VAR` means "read the value
//! from the named process environment variable instead of using the literal".
//! Resolution is a pure function over a caller-supplied lookup so it can be
//! tested without touching the real environment.

/// Resolve a single option value through the `env:` indirection.
///
/// Returns `None` when the value names an environment variable that the
/// lookup cannot supply; literal values always resolve to themselves.
pub fn resolve_option<F>(value: &str, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match value.strip_prefix("env:") {
        Some(var) => lookup(var),
        None => Some(value.to_string()),
    }
}

/// Resolve against the real process environment.
pub fn resolve_option_from_env(value: &str) -> Option<String> {
    resolve_option(value, |var| std::env::var(var).ok())
}
