/*!

A thin logging facade over `tracing`/`tracing-subscriber`: a process-wide verbosity threshold
(`AtomicU8`) gates emission independent of `tracing`'s own level filter, and a subscriber is
installed lazily on first use rather than at link time.

Each of the call sites elsewhere in the crate — schema resolution misses (`tag.rs`),
duplicate-definition skips (`definitions/mod.rs`, `sidecar/mod.rs`), `UnmatchedOffset`
(`events.rs`), sidecar merge overrides, and row assembly failures (`tabular.rs`) — names a
`tracing::Level` and a numeric threshold. A message is emitted only if its threshold is at most
the current global threshold; a threshold of 0 is always emitted.

```
use hed_core::log::*;

fn main() {
    set_global_logging_threshold(1);
    critical!(3, "schema lookup crashed while resolving a tag"); // not emitted
    error!(2, "DuplicateDefinition: {}", "Blink");                // not emitted
    warning!(2, "sidecar column '{}' has no HED key", "onset");   // not emitted
    info!(1, "assembled {} rows", 128);                           // emitted
    debug!(0, "row 4 onset={}", 1.0);                             // emitted
    trace!(0, "entering expand_defs");                            // emitted
}
```

The six macros are `critical!`, `error!`, `warning!`, `info!`, `debug!`, `trace!`, each taking
either `level!(threshold, "fmt", args...)` or `level!("fmt", args...)` (threshold defaults to 0).

*/
mod formatter;
mod threshold_filter;
mod macros;

use std::sync::{
    atomic::{AtomicU8, Ordering},
    LazyLock
  };

use tracing_subscriber::{
  fmt,
  layer::SubscriberExt,
  Registry
};

use threshold_filter::ThresholdFilterLayer;
use formatter::CustomFieldFormatter;
pub use macros::*;

/// Used for implicit initialization.
static INIT_LOGGER: LazyLock<()> = LazyLock::new(|| {
  let subscriber = Registry::default()
      .with(ThresholdFilterLayer)
      .with(
        fmt::layer()
            .fmt_fields(CustomFieldFormatter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stdout),
      );

  tracing::subscriber::set_global_default(subscriber).expect("failed to set subscriber");
});

/// Called automatically by every logging macro; idempotent.
pub fn init_logger() {
  LazyLock::force(&INIT_LOGGER);
}

static GLOBAL_LOGGING_THRESHOLD: AtomicU8 = AtomicU8::new(3);

/// Sets the global threshold. Call before logging starts to change the default of 3.
pub fn set_global_logging_threshold(new_threshold: u8) {
  GLOBAL_LOGGING_THRESHOLD.store(new_threshold, Ordering::SeqCst);
}

/// Retrieves the global threshold.
pub fn get_global_logging_threshold() -> u8 {
  GLOBAL_LOGGING_THRESHOLD.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn threshold_gates_emission_without_panicking() {
    set_global_logging_threshold(2);
    info!(1, "assembled {} rows", 4);
    debug!(5, "this row is above the threshold and should not print");
    warning!("duplicate definition '{}' skipped", "Blink");
    error!(3, "row {} failed: {}", 2, "blank HED string");
    critical!(0, "schema lookup crashed while resolving '{}'", "Red");
    set_global_logging_threshold(3);
  }
}
