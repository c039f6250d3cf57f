//! ---
//! pw_section: "03-logging"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Structured logging adapters and sinks."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---

#[doc(hidden)]
#[macro_export]
macro_rules! __pw_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        $crate::tracing::event!(
            $level,
            route = ctx.route.unwrap_or(""),
            controller = ctx.controller.unwrap_or(""),
            view = ctx.view.unwrap_or(""),
            transition = ctx.transition.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with page context.
#[macro_export]
macro_rules! pw_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__pw_event!($crate::tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__pw_event!($crate::tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with page context.
#[macro_export]
macro_rules! pw_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__pw_event!($crate::tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__pw_event!($crate::tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with page context.
#[macro_export]
macro_rules! pw_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__pw_event!($crate::tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__pw_event!($crate::tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with page context.
#[macro_export]
macro_rules! pw_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__pw_event!($crate::tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__pw_event!($crate::tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
