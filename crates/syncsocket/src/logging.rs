//! Session-scoped logging.
//!
//! Every line carries the session id and the current connection id, and is
//! only emitted while `logging_enabled` is set in the session's config.

macro_rules! session_log {
    ($session:expr, $level:ident, $($arg:tt)+) => {
        if $session.logging_enabled() {
            ::tracing::$level!(
                session = %$session.id,
                conn = %$session.conn_label(),
                $($arg)+
            );
        }
    };
}
