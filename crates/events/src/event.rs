use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A fact recorded by an aggregate.
///
/// Events are never edited once emitted. The type name and schema version are
/// stored next to the serialized payload so streams can be replayed later.
pub trait Event:
    Clone + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Stable name, e.g. `"sales.order.status_changed"`.
    fn event_type(&self) -> &'static str;

    /// Payload schema version.
    fn version(&self) -> u32;

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;
}
