//! Event sink that writes core events to the log.

use crate::app::events::CoreEvent;
use crate::app::ports::EventSink;

/// Forwards every [`CoreEvent`] to the `log` facade. The default sink for
/// headless deployments and the replay tool.
#[derive(Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&mut self, event: &CoreEvent) {
        match event {
            CoreEvent::FlowStarted(flow) => {
                log::info!("event: flow {} started on '{}'", flow.id(), flow.meter_name());
            }
            CoreEvent::FlowUpdated(flow) => {
                log::debug!(
                    "event: flow {} at {} ticks ({:.1} ml)",
                    flow.id(),
                    flow.ticks(),
                    flow.volume_ml()
                );
            }
            CoreEvent::FlowEnded(flow) => {
                log::info!(
                    "event: flow {} ended, {:.1} ml by {}",
                    flow.id(),
                    flow.volume_ml(),
                    flow.username().unwrap_or("<anonymous>")
                );
            }
            CoreEvent::TapListChanged => log::info!("event: tap list changed"),
            CoreEvent::DrinkRecorded(drink) => {
                log::info!(
                    "event: drink {} recorded, {:.1} ml on keg {}",
                    drink.id,
                    drink.volume_ml,
                    drink.keg_id
                );
            }
        }
    }
}
