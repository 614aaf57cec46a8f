//! The `critical!`/`error!`/`warning!`/`info!`/`debug!`/`trace!` family used at the diagnostic
//! call sites throughout the crate (schema resolution misses in `tag.rs`, duplicate-definition
//! skips in `definitions/mod.rs` and `sidecar/mod.rs`, `UnmatchedOffset` in `events.rs`, sidecar
//! merge overrides, row assembly failures in `tabular.rs`). Each expands to a `tracing::event!`
//! at its level, carrying an explicit `threshold` field the crate's verbosity gate reads back out
//! (see `threshold_filter`). A call with no threshold defaults to 0, which is always emitted.
//! All six delegate to `__hed_log_event` so the threshold/format-args plumbing is written once.

#[doc(hidden)]
#[macro_export]
macro_rules! __hed_log_event {
  ($level:expr, [$($field:ident = $value:expr),*], $threshold:expr, $($arg:tt)+) => {
    {
      $crate::log::init_logger();
      tracing::event!($level, $($field = $value,)* threshold = $threshold, message = format_args!($($arg)+));
    }
  };
}

#[macro_export]
macro_rules! critical {
  ($threshold:expr, $($arg:tt)+) => { $crate::__hed_log_event!(tracing::Level::ERROR, [critical = true], $threshold, $($arg)+) };
  ($($arg:tt)+) => { $crate::__hed_log_event!(tracing::Level::ERROR, [critical = true], 0, $($arg)+) };
}

#[macro_export]
macro_rules! error {
  ($threshold:expr, $($arg:tt)+) => { $crate::__hed_log_event!(tracing::Level::ERROR, [], $threshold, $($arg)+) };
  ($($arg:tt)+) => { $crate::__hed_log_event!(tracing::Level::ERROR, [], 0, $($arg)+) };
}

#[macro_export]
macro_rules! warning {
  ($threshold:expr, $($arg:tt)+) => { $crate::__hed_log_event!(tracing::Level::WARN, [], $threshold, $($arg)+) };
  ($($arg:tt)+) => { $crate::__hed_log_event!(tracing::Level::WARN, [], 0, $($arg)+) };
}

#[macro_export]
macro_rules! info {
  ($threshold:expr, $($arg:tt)+) => { $crate::__hed_log_event!(tracing::Level::INFO, [], $threshold, $($arg)+) };
  ($($arg:tt)+) => { $crate::__hed_log_event!(tracing::Level::INFO, [], 0, $($arg)+) };
}

#[macro_export]
macro_rules! debug {
  ($threshold:expr, $($arg:tt)+) => { $crate::__hed_log_event!(tracing::Level::DEBUG, [], $threshold, $($arg)+) };
  ($($arg:tt)+) => { $crate::__hed_log_event!(tracing::Level::DEBUG, [], 0, $($arg)+) };
}

#[macro_export]
macro_rules! trace {
  ($threshold:expr, $($arg:tt)+) => { $crate::__hed_log_event!(tracing::Level::TRACE, [], $threshold, $($arg)+) };
  ($($arg:tt)+) => { $crate::__hed_log_event!(tracing::Level::TRACE, [], 0, $($arg)+) };
}

// Makes the macros importable directly from the `log` module.
pub use {critical, error, warning, info, debug, trace};
