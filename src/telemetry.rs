//! Tracing setup for applications embedding `chart-scales`.
//!
//! The crate only emits `tracing` events. Hosts either call
//! `init_default_tracing` or install their own subscriber and filters.

/// Filter used when `RUST_LOG` is unset: engine events at `info`, everything
/// else at `warn`.
pub const DEFAULT_FILTER: &str = "warn,chart_scales=info";

/// Installs a compact `fmt` subscriber filtered by `RUST_LOG` (falling back
/// to [`DEFAULT_FILTER`]) when the `telemetry` feature is enabled.
///
/// Returns `false` when the feature is disabled or the host already set a
/// global subscriber.
#[must_use]
pub fn init_default_tracing() -> bool {
    init_tracing_with_filter(DEFAULT_FILTER)
}

/// Same as [`init_default_tracing`] with a caller-chosen fallback filter.
/// `RUST_LOG` still wins when set.
#[must_use]
pub fn init_tracing_with_filter(fallback: &str) -> bool {
    #[cfg(feature = "telemetry")]
    {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback));
        let Ok(filter) = filter else {
            return false;
        };
        // module targets (model::time_scale, model::data_layer) carry meaning
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact();

        return builder.try_init().is_ok();
    }

    #[cfg(not(feature = "telemetry"))]
    {
        let _ = fallback;
        false
    }
}
