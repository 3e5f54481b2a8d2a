//! Internal logging helpers for structured storage events.

/// Single logging target for geostore.
pub(crate) const LOG_TARGET: &str = "geostore";

/// Optional common key/value fields appended to all logs emitted by one
/// component, e.g. the file it owns.
#[derive(Clone, Debug)]
pub(crate) struct LogContext {
    common_kv: String,
}

impl LogContext {
    /// Build a context that appends `file=<path>` to every event.
    pub(crate) fn for_file(path: &std::path::Path) -> Self {
        Self {
            common_kv: format!("file={}", path.display()),
        }
    }

    pub(crate) fn common_kv(&self) -> Option<&str> {
        if self.common_kv.is_empty() {
            None
        } else {
            Some(&self.common_kv)
        }
    }
}

macro_rules! geostore_log {
    ($level:expr, ctx: $ctx:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!(target: crate::logging::LOG_TARGET, $level) {
            if let Some(common_kv) = $ctx.common_kv() {
                log::log!(
                    target: crate::logging::LOG_TARGET,
                    $level,
                    "event={} {} {}",
                    $event,
                    common_kv,
                    format_args!($fmt $(, $args)*)
                );
            } else {
                log::log!(
                    target: crate::logging::LOG_TARGET,
                    $level,
                    "event={} {}",
                    $event,
                    format_args!($fmt $(, $args)*)
                );
            }
        }
    }};
    ($level:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!(target: crate::logging::LOG_TARGET, $level) {
            log::log!(
                target: crate::logging::LOG_TARGET,
                $level,
                "event={} {}",
                $event,
                format_args!($fmt $(, $args)*)
            );
        }
    }};
}

pub(crate) use geostore_log;
