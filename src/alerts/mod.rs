//! Alert construction and delivery

mod factory;
mod sink;

pub use factory::AlertFactory;
pub use sink::{build_sinks, dispatch_all, AlertSink, LogAlertSink, NullAlertSink};
