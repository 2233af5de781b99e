//! Environment-variable toggles for the sync coordinator (spec.md §6).

/// `ZINC_SYNC_DISABLE_DISCOVERY` — when set, `Coordinator::start` skips
/// advertise/browse, leaving only explicit `connect_to_endpoint` dials.
/// Used for direct-endpoint testing so tests don't race real UDP sockets.
pub fn discovery_disabled() -> bool {
    std::env::var_os("ZINC_SYNC_DISABLE_DISCOVERY").is_some()
}

/// `ZINC_DEBUG_SYNC` — when set, raises the default log filter so sync
/// events (Hello decisions, dedup, change application) are visible.
pub fn debug_sync_enabled() -> bool {
    std::env::var_os("ZINC_DEBUG_SYNC").is_some()
}

/// Install a `tracing_subscriber` filter honoring `ZINC_DEBUG_SYNC`,
/// following `braidfs-daemon`'s `tracing_subscriber::fmt::init()` pattern.
pub fn init_tracing() {
    let default_filter = if debug_sync_enabled() {
        "zinc_sync=debug,zinc_transport=debug,zinc_discovery=debug"
    } else {
        "zinc_sync=info,zinc_transport=info,zinc_discovery=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
