//! Identity resolver — wallet address to storage namespace key

/// Namespace used when no wallet is connected
pub const GLOBAL_NAMESPACE: &str = "global";

/// Map an optional wallet address to its storage namespace.
///
/// The same address always yields the same key (addresses are
/// case-normalized); distinct addresses never collide.
pub fn resolve_key(address: Option<&str>) -> String {
    match address.map(str::trim) {
        Some(addr) if !addr.is_empty() => addr.to_lowercase(),
        _ => GLOBAL_NAMESPACE.to_string(),
    }
}
