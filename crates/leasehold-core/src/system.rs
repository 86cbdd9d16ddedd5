use std::sync::OnceLock;

static HOST_NAME: OnceLock<String> = OnceLock::new();

/// Host name of this machine, or `"unknown-host"` when it cannot be read.
pub fn host_name() -> &'static str {
    HOST_NAME.get_or_init(|| {
        hostname::get()
            .ok()
            .and_then(|h| h.to_str().map(str::to_owned))
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "unknown-host".to_string())
    })
}

/// Generate an identifier for one lease holder: `<host>-<pid>-<uuid>`.
///
/// The value is stored inside lease markers for diagnostics only.
pub fn new_holder_id() -> String {
    format!(
        "{}-{}-{}",
        host_name(),
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    )
}
