//! Events dispatched by elements and stamped nodes.

use std::rc::Rc;

use tempera_carton::CompactString;
use tempera_relief::Value;

use crate::error::HandlerResult;

/// Event listener.
pub type Listener = Rc<dyn Fn(&Event) -> HandlerResult<()>>;

/// Returned by `add_event_listener`, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u32);

impl ListenerId {
    #[inline(always)]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventDetail {
    pub value: Value,
    /// Set when the event reports a change below the property.
    pub path: Option<CompactString>,
    /// The receiver only queues the write; whoever sent the event flushes.
    pub queue_property: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: CompactString,
    pub detail: EventDetail,
}

impl Event {
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            detail: EventDetail::default(),
        }
    }

    pub fn with_value(name: impl Into<CompactString>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            detail: EventDetail {
                value: value.into(),
                ..EventDetail::default()
            },
        }
    }

    /// `<prop>-changed` event sent by notify effects.
    pub(crate) fn notify(name: &str, value: Value, path: Option<&str>) -> Self {
        Self {
            name: name.into(),
            detail: EventDetail {
                value,
                path: path.map(CompactString::from),
                queue_property: true,
            },
        }
    }
}

pub(crate) struct ListenerEntry {
    pub id: ListenerId,
    pub event: CompactString,
    pub listener: Listener,
}

/// Run the listeners registered for `event`. Every listener runs; the first
/// error is returned.
pub(crate) fn dispatch(listeners: Vec<Listener>, event: &Event) -> HandlerResult<()> {
    let mut result = Ok(());
    for listener in listeners {
        if let Err(err) = listener(event) {
            if result.is_ok() {
                result = Err(err);
            }
        }
    }
    result
}
