use std::fmt::Debug;
use tracing::{
  field::{Field, Visit},
  Event,
  Subscriber
};
use tracing_subscriber::{
  Layer,
  layer::Context,
  registry::LookupSpan
};

use super::get_global_logging_threshold;

/// Gates every event emitted by the `critical!`/`error!`/.../`trace!` family against the crate's
/// global verbosity threshold, independent of `tracing`'s own level filter. An event with no
/// `threshold` field (none of this crate's logging call sites omit one, but a bare `tracing::info!`
/// elsewhere would) is treated as threshold 0 and always passes.
pub(crate) struct ThresholdFilterLayer;

impl<S> Layer<S> for ThresholdFilterLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
  fn event_enabled(&self, event: &Event<'_>, _ctx: Context<'_, S>) -> bool {
    let mut visitor = ThresholdVisitor { threshold: None };
    event.record(&mut visitor);
    visitor.threshold.map_or(true, |threshold| threshold <= get_global_logging_threshold())
  }
}

/// Pulls the numeric `threshold` field back out of a log record.
struct ThresholdVisitor {
  threshold: Option<u8>,
}

impl ThresholdVisitor {
  fn record(&mut self, field: &Field, value: i64) {
    if field.name() == "threshold" {
      match u8::try_from(value) {
        Ok(t) => self.threshold = Some(t),
        Err(_) => panic!("invalid threshold value supplied to the logger: {:?}", value),
      }
    }
  }
}

impl Visit for ThresholdVisitor {
  fn record_i64(&mut self, field: &Field, value: i64) {
    self.record(field, value);
  }

  fn record_u64(&mut self, field: &Field, value: u64) {
    match i64::try_from(value) {
      Ok(v) => self.record(field, v),
      Err(_) => panic!("invalid threshold value supplied to the logger: {:?}", value),
    }
  }

  fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
    if field.name() == "threshold" {
      panic!("invalid threshold value supplied to the logger: {:?}", value);
    }
  }
}
