//! Record handlers: the producers and consumers of individual records.
//!
//! A handler owns the local representation of one record (a slider, a toggle,
//! a rig pose) and exchanges serialized JSON with the [`SessionStore`]. The
//! store only ever sees the [`RecordHandler`] capability, never a concrete
//! type, and holds nothing but a weak reference to it.
//!
//! [`SessionStore`]: crate::store::SessionStore

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::store::ChangeSink;

/// Shared, externally owned handler reference.
pub type RecordHandle = Rc<RefCell<dyn RecordHandler>>;

/// Errors a handler can report while applying or capturing a value.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The value is not valid JSON for this record.
    #[error("invalid record JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The handler refused the value.
    #[error("record rejected update: {0}")]
    Rejected(String),
}

/// Whether a handler takes part in each sync direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPermissions {
    /// Remote updates are delivered to the handler.
    pub can_receive: bool,
    /// Local changes from the handler are stored and sent.
    pub can_send: bool,
}

impl Default for RecordPermissions {
    fn default() -> Self {
        Self {
            can_receive: true,
            can_send: true,
        }
    }
}

impl RecordPermissions {
    /// Receive remote updates but never publish local changes.
    pub const RECEIVE_ONLY: Self = Self {
        can_receive: true,
        can_send: false,
    };

    /// Publish local changes but ignore remote updates.
    pub const SEND_ONLY: Self = Self {
        can_receive: false,
        can_send: true,
    };
}

/// Capability implemented by every record producer/consumer.
///
/// `receive_update` must not call back into the store for its own id. Local
/// changes it triggers may be submitted to a [`ChangeSink`]; the sink drops
/// them while the remote value is being applied.
pub trait RecordHandler {
    /// Stable, non-empty record id.
    fn id(&self) -> &str;

    /// Apply a value that arrived from the peer.
    fn receive_update(&mut self, json: &str) -> Result<(), RecordError>;

    /// Serialize the current local representation.
    fn capture_local(&self) -> Result<String, RecordError>;

    /// Sync directions this handler takes part in.
    fn permissions(&self) -> RecordPermissions {
        RecordPermissions::default()
    }
}

// ---------------------------------------------------------------------------
// Stock records
// ---------------------------------------------------------------------------

/// Slider position, serialized as `{"_value": f32}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SliderValue {
    /// Current slider position.
    #[serde(rename = "_value")]
    pub value: f32,
}

/// Toggle state, serialized as `{"_isOn": bool}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleValue {
    /// Whether the toggle is on.
    #[serde(rename = "_isOn")]
    pub is_on: bool,
}

/// A record whose whole state is one serde value.
///
/// Setting the value locally submits it to the attached [`ChangeSink`], the
/// way a UI control's change listener would. Remote updates go through the
/// same setter, so the sink's remote-apply guard is what keeps them from being
/// echoed back.
pub struct ValueRecord<S> {
    id: String,
    value: S,
    permissions: RecordPermissions,
    sink: Option<ChangeSink>,
}

/// A slider record.
pub type SliderRecord = ValueRecord<SliderValue>;
/// A toggle record.
pub type ToggleRecord = ValueRecord<ToggleValue>;

impl<S> ValueRecord<S>
where
    S: Serialize + DeserializeOwned + PartialEq + 'static,
{
    /// Create a record with an initial local value.
    pub fn new(id: impl Into<String>, value: S) -> Self {
        Self {
            id: id.into(),
            value,
            permissions: RecordPermissions::default(),
            sink: None,
        }
    }

    /// Submit local changes to `sink`.
    pub fn with_sink(mut self, sink: ChangeSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Override the default permissions.
    pub fn with_permissions(mut self, permissions: RecordPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Wrap into a shared handle for the store.
    pub fn into_handle(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    /// Current value.
    pub fn value(&self) -> &S {
        &self.value
    }

    /// Change the id. Detach from the store first and attach again after.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Change the value locally. Returns whether a change was submitted.
    pub fn set(&mut self, value: S) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.submit()
    }

    fn submit(&self) -> bool {
        if !self.permissions.can_send {
            return false;
        }
        let Some(sink) = &self.sink else {
            return false;
        };
        match serde_json::to_string(&self.value) {
            Ok(json) => sink.submit(&self.id, json),
            Err(e) => {
                tracing::warn!("Record '{}' failed to serialize: {e}", self.id);
                false
            }
        }
    }
}

impl<S> RecordHandler for ValueRecord<S>
where
    S: Serialize + DeserializeOwned + PartialEq + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn receive_update(&mut self, json: &str) -> Result<(), RecordError> {
        let incoming: S = serde_json::from_str(json)?;
        self.set(incoming);
        Ok(())
    }

    fn capture_local(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string(&self.value)?)
    }

    fn permissions(&self) -> RecordPermissions {
        self.permissions
    }
}

impl<S: fmt::Debug> fmt::Debug for ValueRecord<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueRecord")
            .field("id", &self.id)
            .field("value", &self.value)
            .field("permissions", &self.permissions)
            .finish()
    }
}
