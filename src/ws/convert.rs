//! Native → domain conversion seam.

use crate::domain::account::wire::MergedUpdate;
use crate::domain::DomainEvent;
use crate::error::DecodeError;
use crate::shared::Topic;
use crate::ws::NativeEvent;

/// Stateless mapping from wire events to domain events.
///
/// Runs on the conversion workers, never on the read loop. Implementations
/// must not block.
pub trait Converter: Send + Sync + 'static {
    fn convert(&self, topic: &Topic, event: NativeEvent) -> Result<DomainEvent, DecodeError>;

    fn convert_merged(&self, merged: MergedUpdate) -> Result<DomainEvent, DecodeError>;
}

/// Default mapping built from the domain slices' `From` impls.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardConverter;

impl Converter for StandardConverter {
    fn convert(&self, topic: &Topic, event: NativeEvent) -> Result<DomainEvent, DecodeError> {
        Ok(match event {
            NativeEvent::Ticker(t) => DomainEvent::Ticker(t.into()),
            NativeEvent::Depth(d) => DomainEvent::Depth(d.into()),
            NativeEvent::Trade(t) => DomainEvent::Trade(t.into()),
            NativeEvent::Candle(c) => DomainEvent::Candle(c.into()),
            NativeEvent::Order(o) => DomainEvent::Order(o.into()),
            NativeEvent::Balance(b) => DomainEvent::Balance(b.into()),
            NativeEvent::Position(p) => DomainEvent::Position(p.into()),
            NativeEvent::Snapshot(page) => {
                return self.convert_merged(MergedUpdate::single(topic.clone(), page))
            }
        })
    }

    fn convert_merged(&self, merged: MergedUpdate) -> Result<DomainEvent, DecodeError> {
        Ok(DomainEvent::Account(merged.into()))
    }
}
