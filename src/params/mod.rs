// Parameter pub/sub over websocket

pub mod dispatch;
pub mod registry;
pub mod value;
pub mod wire;

pub use dispatch::{spawn_dispatch, Dispatcher, Event};
pub use registry::Registry;
pub use value::{ParamKind, Value};

/// Opaque parameter identity as issued by the parameter store. The store
/// owns the parameter and its value; this crate only holds handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamHandle(pub u32);

/// The device's parameter subsystem. Value changes for activated parameters
/// come back asynchronously as [`Event::StateChange`] posts into the
/// dispatch queue.
pub trait ParamStore: Send {
    fn lookup(&self, name: &str) -> Option<ParamHandle>;

    fn name(&self, param: ParamHandle) -> Option<String>;

    fn kind(&self, param: ParamHandle) -> Option<ParamKind>;

    /// Disabled parameters keep their subscriptions but are not broadcast.
    fn is_enabled(&self, param: ParamHandle) -> bool;

    /// Current value, rendered into the subscribe acknowledgment.
    fn current(&self, param: ParamHandle) -> Option<Value>;

    /// Start delivering value-change notifications for this parameter.
    /// Returns false if activation failed.
    fn activate(&mut self, param: ParamHandle) -> bool;

    /// Stop delivering value-change notifications.
    fn deactivate(&mut self, param: ParamHandle);

    /// Apply a client write that already passed type validation.
    fn write(&mut self, param: ParamHandle, value: Value);
}
