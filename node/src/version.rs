pub const CUSTCAT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commit recorded by the release pipeline, if any.
pub fn git_commit_hash() -> &'static str {
    option_env!("GIT_COMMIT_HASH").unwrap_or("unknown")
}
