//! The session data store: the local cache of `record id -> serialized JSON`.
//!
//! Values are last-write-wins in arrival order. Every mutation carries an
//! [`Origin`]: remote values are forwarded to the bound [`RecordHandler`] and
//! never sent back, local values are sent to the peer as `UDAT` whenever the
//! [`Uplink`] is running.
//!
//! Handlers bind by id through a weak reference. While a remote value is being
//! delivered to a handler, the [`ChangeSink`] rejects local submissions for
//! that id, which is what breaks the receive → UI change → send feedback loop.
//! A remote value also discards local submissions for its id that are still
//! waiting for a flush, since they arrived earlier.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

use crate::codec::{Packet, Snapshot, UpdateEnvelope};
use crate::record::{RecordHandle, RecordHandler};

/// Where a mutation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Produced on this peer; must be sent.
    Local,
    /// Arrived from the server; must not be echoed.
    Remote,
}

/// Outbound side the store publishes local changes through.
pub trait Uplink {
    /// Whether outbound sends currently go anywhere.
    fn is_running(&self) -> bool;

    /// Value for the `senderIp` field of outgoing updates.
    fn sender_ip(&self) -> String;

    /// Fire-and-forget send.
    fn send_packet(&mut self, packet: &Packet);
}

/// Errors from binding handlers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// Another live handler is already bound to this id.
    #[error("record '{0}' is already bound to a handler")]
    AlreadyBound(String),

    /// The handler reported an empty id.
    #[error("record handler has an empty id")]
    EmptyId,
}

// ---------------------------------------------------------------------------
// Change sink
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SinkState {
    pending: VecDeque<(String, String)>,
    /// Id whose remote value is currently being delivered to its handler.
    applying_remote: Option<String>,
}

/// Local-change path from handlers into the store.
///
/// Handlers keep a clone and submit whenever their local representation
/// changes. Submissions queue until the store flushes them, once per tick.
#[derive(Clone, Default)]
pub struct ChangeSink {
    state: Rc<RefCell<SinkState>>,
}

impl ChangeSink {
    /// Queue a local change. Returns `false` if it was dropped because the
    /// remote value for `id` is being applied right now.
    pub fn submit(&self, id: &str, json: impl Into<String>) -> bool {
        let mut state = self.state.borrow_mut();
        if state.applying_remote.as_deref() == Some(id) {
            tracing::trace!("Ignoring local change to '{id}' during remote update");
            return false;
        }
        state.pending.push_back((id.to_owned(), json.into()));
        true
    }

    /// Whether the remote value for `id` is being applied.
    pub fn is_applying_remote(&self, id: &str) -> bool {
        self.state.borrow().applying_remote.as_deref() == Some(id)
    }

    /// Number of submissions waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.state.borrow().pending.len()
    }

    fn begin_remote(&self, id: &str) {
        self.state.borrow_mut().applying_remote = Some(id.to_owned());
    }

    fn end_remote(&self) {
        self.state.borrow_mut().applying_remote = None;
    }

    /// Drop queued submissions for `id`; a newer remote value supersedes them.
    fn discard_pending(&self, id: &str) -> usize {
        let mut state = self.state.borrow_mut();
        let before = state.pending.len();
        state.pending.retain(|(pending, _)| pending != id);
        before - state.pending.len()
    }

    fn take_pending(&self) -> VecDeque<(String, String)> {
        std::mem::take(&mut self.state.borrow_mut().pending)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Authoritative local copy of every record.
#[derive(Default)]
pub struct SessionStore {
    records: HashMap<String, String>,
    bindings: HashMap<String, Weak<RefCell<dyn RecordHandler>>>,
    sink: ChangeSink,
    trace: bool,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every mutation at debug level.
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// A handle handlers use to submit local changes.
    pub fn change_sink(&self) -> ChangeSink {
        self.sink.clone()
    }

    /// Current value for `id`. Never blocks and never touches the network.
    pub fn get(&self, id: &str) -> Option<&str> {
        self.records.get(id).map(String::as_str)
    }

    /// Whether a value is stored for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Store `json` under `id` and propagate according to `origin`.
    pub fn apply_update(
        &mut self,
        id: &str,
        json: impl Into<String>,
        origin: Origin,
        uplink: &mut dyn Uplink,
    ) {
        let json = json.into();
        if self.trace {
            tracing::debug!("Update '{id}' ({origin:?}): {json}");
        }
        match origin {
            Origin::Remote => self.apply_remote(id, json),
            Origin::Local => self.apply_local(id, json, uplink),
        }
    }

    /// Replace the whole store with `snapshot`.
    ///
    /// Every previous record is discarded; each snapshot entry is then applied
    /// as a remote update. Returns the number of records loaded.
    pub fn load(&mut self, snapshot: Snapshot) -> usize {
        self.records.clear();
        let count = snapshot.len();
        for (id, json) in snapshot {
            self.apply_remote(&id, json);
        }
        tracing::debug!("Loaded {count} records from full sync");
        count
    }

    /// Drop one record. Bound handlers keep their own last value.
    pub fn remove(&mut self, id: &str) -> Option<String> {
        self.records.remove(id)
    }

    /// Drop every record.
    pub fn remove_all(&mut self) {
        self.records.clear();
    }

    /// Bind `handler` to its id.
    ///
    /// Fails without changing anything if another live handler holds the id.
    pub fn bind(&mut self, handler: &RecordHandle) -> Result<(), StoreError> {
        let id = handler.borrow().id().to_owned();
        self.check_bindable(&id)?;
        self.bindings.insert(id, Rc::downgrade(handler));
        Ok(())
    }

    /// Release `handler`'s binding. Returns `false` if it was not bound.
    pub fn unbind(&mut self, handler: &RecordHandle) -> bool {
        let target = Rc::as_ptr(handler);
        let key = self
            .bindings
            .iter()
            .find(|(_, bound)| std::ptr::addr_eq(bound.as_ptr(), target))
            .map(|(id, _)| id.clone());

        match key {
            Some(id) => {
                self.bindings.remove(&id);
                true
            }
            None => false,
        }
    }

    /// Whether a live handler is bound to `id`.
    pub fn is_bound(&self, id: &str) -> bool {
        self.bindings
            .get(id)
            .is_some_and(|bound| bound.strong_count() > 0)
    }

    /// Bring `handler` up to date and bind it.
    ///
    /// If a value is stored for its id the handler receives it, with the same
    /// echo protection as a remote update. Otherwise the handler keeps its
    /// local representation.
    pub fn attach(&mut self, handler: &RecordHandle) -> Result<(), StoreError> {
        let id = handler.borrow().id().to_owned();
        self.check_bindable(&id)?;

        if let Some(json) = self.records.get(&id) {
            deliver(&self.sink, handler, &id, json);
        }
        self.bindings.insert(id, Rc::downgrade(handler));
        Ok(())
    }

    /// Unbind `handler`. The stored value stays.
    pub fn detach(&mut self, handler: &RecordHandle) -> bool {
        self.unbind(handler)
    }

    /// Capture `handler`'s local value and apply it as a local update.
    ///
    /// Returns `false` when skipped: the handler cannot send, its remote
    /// update is being applied, or capturing failed.
    pub fn save_local(&mut self, handler: &RecordHandle, uplink: &mut dyn Uplink) -> bool {
        let (id, captured, permissions) = {
            let handler = handler.borrow();
            (
                handler.id().to_owned(),
                handler.capture_local(),
                handler.permissions(),
            )
        };

        if !permissions.can_send || self.sink.is_applying_remote(&id) {
            return false;
        }
        match captured {
            Ok(json) => {
                self.apply_local(&id, json, uplink);
                true
            }
            Err(e) => {
                tracing::warn!("Record '{id}' could not capture its local value: {e}");
                false
            }
        }
    }

    /// Apply every queued [`ChangeSink`] submission as a local update.
    ///
    /// Submissions from a bound handler that cannot send are dropped.
    /// Returns the number applied.
    pub fn flush_local(&mut self, uplink: &mut dyn Uplink) -> usize {
        let mut applied = 0;
        for (id, json) in self.sink.take_pending() {
            if let Some(handler) = self.bound_handler(&id)
                && !handler.borrow().permissions().can_send
            {
                tracing::debug!("Record '{id}' cannot send, dropping local change");
                continue;
            }
            if self.trace {
                tracing::debug!("Update '{id}' (Local): {json}");
            }
            self.apply_local(&id, json, uplink);
            applied += 1;
        }
        applied
    }

    fn apply_local(&mut self, id: &str, json: String, uplink: &mut dyn Uplink) {
        if uplink.is_running() {
            let envelope = UpdateEnvelope {
                sender_ip: uplink.sender_ip(),
                session_data_id: id.to_owned(),
                session_data_json: json.clone(),
            };
            uplink.send_packet(&Packet::Update(envelope));
        }
        self.records.insert(id.to_owned(), json);
    }

    fn apply_remote(&mut self, id: &str, json: String) {
        let superseded = self.sink.discard_pending(id);
        if superseded > 0 {
            tracing::debug!("Remote update to '{id}' supersedes {superseded} local change(s)");
        }
        let handler = self.bound_handler(id);
        let json = self.records.entry(id.to_owned()).insert_entry(json).into_mut();
        if let Some(handler) = handler {
            deliver(&self.sink, &handler, id, json);
        }
    }

    /// Upgrade the binding for `id`, pruning it if the handler is gone.
    fn bound_handler(&mut self, id: &str) -> Option<RecordHandle> {
        let handler = self.bindings.get(id)?.upgrade();
        if handler.is_none() {
            self.bindings.remove(id);
        }
        handler
    }

    fn check_bindable(&mut self, id: &str) -> Result<(), StoreError> {
        if id.is_empty() {
            tracing::error!("Record handler must have an id assigned");
            return Err(StoreError::EmptyId);
        }
        if self.bound_handler(id).is_some() {
            tracing::error!("Record with id '{id}' is already active");
            return Err(StoreError::AlreadyBound(id.to_owned()));
        }
        Ok(())
    }
}

/// Hand a remote value to `handler` with the sink's echo guard raised.
fn deliver(sink: &ChangeSink, handler: &RecordHandle, id: &str, json: &str) {
    let Ok(mut handler) = handler.try_borrow_mut() else {
        tracing::warn!("Record '{id}' is busy, skipping remote update");
        return;
    };
    if !handler.permissions().can_receive {
        return;
    }

    sink.begin_remote(id);
    let result = handler.receive_update(json);
    sink.end_remote();

    if let Err(e) = result {
        tracing::warn!("Record '{id}' rejected remote update: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{
        RecordError, RecordPermissions, SliderRecord, SliderValue, ToggleRecord, ToggleValue,
    };

    /// Uplink that records every packet it is asked to send.
    struct RecordingUplink {
        running: bool,
        sent: Vec<Packet>,
    }

    impl RecordingUplink {
        fn running() -> Self {
            Self {
                running: true,
                sent: Vec::new(),
            }
        }

        fn stopped() -> Self {
            Self {
                running: false,
                sent: Vec::new(),
            }
        }

        fn updates(&self) -> Vec<&UpdateEnvelope> {
            self.sent
                .iter()
                .filter_map(|p| match p {
                    Packet::Update(envelope) => Some(envelope),
                    _ => None,
                })
                .collect()
        }
    }

    impl Uplink for RecordingUplink {
        fn is_running(&self) -> bool {
            self.running
        }

        fn sender_ip(&self) -> String {
            "192.168.1.20:51000".to_string()
        }

        fn send_packet(&mut self, packet: &Packet) {
            self.sent.push(packet.clone());
        }
    }

    /// Handler that records every remote value it receives.
    struct Probe {
        id: String,
        received: Vec<String>,
    }

    impl Probe {
        fn handle(id: &str) -> (Rc<RefCell<Probe>>, RecordHandle) {
            let probe = Rc::new(RefCell::new(Probe {
                id: id.to_string(),
                received: Vec::new(),
            }));
            let handle: RecordHandle = probe.clone();
            (probe, handle)
        }
    }

    impl RecordHandler for Probe {
        fn id(&self) -> &str {
            &self.id
        }

        fn receive_update(&mut self, json: &str) -> Result<(), RecordError> {
            self.received.push(json.to_string());
            Ok(())
        }

        fn capture_local(&self) -> Result<String, RecordError> {
            Ok(r#"{"probe":true}"#.to_string())
        }
    }

    #[test]
    fn test_last_write_wins_regardless_of_origin() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();

        store.apply_update("foo", r#"{"x":1}"#, Origin::Local, &mut uplink);
        store.apply_update("foo", r#"{"x":2}"#, Origin::Remote, &mut uplink);
        assert_eq!(store.get("foo"), Some(r#"{"x":2}"#));

        store.apply_update("foo", r#"{"x":3}"#, Origin::Local, &mut uplink);
        assert_eq!(store.get("foo"), Some(r#"{"x":3}"#));
    }

    #[test]
    fn test_load_replaces_everything() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        store.apply_update("bar", "1", Origin::Remote, &mut uplink);
        store.apply_update("foo", "old", Origin::Local, &mut uplink);

        let snapshot: Snapshot = [
            ("foo".to_string(), r#"{"x":1}"#.to_string()),
            ("baz".to_string(), "[1,2]".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(store.load(snapshot), 2);

        assert_eq!(store.get("foo"), Some(r#"{"x":1}"#));
        assert_eq!(store.get("baz"), Some("[1,2]"));
        assert_eq!(store.get("bar"), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_load_notifies_bound_handlers_without_sending() {
        let mut store = SessionStore::new();
        let (probe, handle) = Probe::handle("foo");
        store.bind(&handle).unwrap();

        let snapshot: Snapshot = [("foo".to_string(), "7".to_string())].into_iter().collect();
        store.load(snapshot);
        assert_eq!(probe.borrow().received, ["7"]);
    }

    #[test]
    fn test_remote_update_reaches_only_bound_handler() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        let (foo, foo_handle) = Probe::handle("foo");
        let (bar, bar_handle) = Probe::handle("bar");
        store.bind(&foo_handle).unwrap();
        store.bind(&bar_handle).unwrap();

        store.apply_update("foo", r#"{"x":2}"#, Origin::Remote, &mut uplink);
        assert_eq!(foo.borrow().received, [r#"{"x":2}"#]);
        assert!(bar.borrow().received.is_empty());
    }

    #[test]
    fn test_second_bind_rejected_and_first_stays_active() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        let (first, first_handle) = Probe::handle("foo");
        let (second, second_handle) = Probe::handle("foo");

        store.bind(&first_handle).unwrap();
        assert_eq!(
            store.bind(&second_handle),
            Err(StoreError::AlreadyBound("foo".to_string()))
        );

        store.apply_update("foo", "1", Origin::Remote, &mut uplink);
        assert_eq!(first.borrow().received, ["1"]);
        assert!(second.borrow().received.is_empty());
    }

    #[test]
    fn test_empty_id_rejected() {
        let mut store = SessionStore::new();
        let (_probe, handle) = Probe::handle("");
        assert_eq!(store.bind(&handle), Err(StoreError::EmptyId));
    }

    #[test]
    fn test_remote_updates_never_send() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        store.apply_update("foo", "1", Origin::Remote, &mut uplink);
        assert!(uplink.sent.is_empty());
    }

    #[test]
    fn test_local_updates_send_only_while_running() {
        let mut store = SessionStore::new();

        let mut running = RecordingUplink::running();
        store.apply_update("foo", r#"{"x":1}"#, Origin::Local, &mut running);
        let updates = running.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].sender_ip, "192.168.1.20:51000");
        assert_eq!(updates[0].session_data_id, "foo");
        assert_eq!(updates[0].session_data_json, r#"{"x":1}"#);

        let mut stopped = RecordingUplink::stopped();
        store.apply_update("foo", r#"{"x":2}"#, Origin::Local, &mut stopped);
        assert!(stopped.sent.is_empty());
        assert_eq!(store.get("foo"), Some(r#"{"x":2}"#));
    }

    #[test]
    fn test_local_update_does_not_notify_handler() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        let (probe, handle) = Probe::handle("foo");
        store.bind(&handle).unwrap();

        store.apply_update("foo", "1", Origin::Local, &mut uplink);
        assert!(probe.borrow().received.is_empty());
    }

    #[test]
    fn test_unbind_and_rebind() {
        let mut store = SessionStore::new();
        let (_first, first_handle) = Probe::handle("foo");
        let (_second, second_handle) = Probe::handle("foo");

        assert!(!store.unbind(&second_handle), "not bound yet");
        store.bind(&first_handle).unwrap();
        assert!(!store.unbind(&second_handle), "different handler");
        assert!(store.unbind(&first_handle));
        assert!(!store.is_bound("foo"));
        store.bind(&second_handle).unwrap();
        assert!(store.is_bound("foo"));
    }

    #[test]
    fn test_dropped_handler_releases_binding() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        {
            let (_probe, handle) = Probe::handle("foo");
            store.bind(&handle).unwrap();
        }
        assert!(!store.is_bound("foo"));
        store.apply_update("foo", "1", Origin::Remote, &mut uplink);

        let (replacement, handle) = Probe::handle("foo");
        store.bind(&handle).unwrap();
        store.apply_update("foo", "2", Origin::Remote, &mut uplink);
        assert_eq!(replacement.borrow().received, ["2"]);
    }

    #[test]
    fn test_remove_keeps_handler_and_does_not_notify() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        let (probe, handle) = Probe::handle("foo");
        store.bind(&handle).unwrap();
        store.apply_update("foo", "1", Origin::Remote, &mut uplink);
        store.apply_update("bar", "2", Origin::Remote, &mut uplink);

        assert_eq!(store.remove("foo"), Some("1".to_string()));
        assert_eq!(store.remove("foo"), None);
        assert_eq!(probe.borrow().received.len(), 1);
        assert!(store.is_bound("foo"));

        store.remove_all();
        assert!(store.is_empty());
    }

    #[test]
    fn test_remote_update_is_not_echoed_by_record() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        let slider = SliderRecord::new("volume", SliderValue { value: 0.0 })
            .with_sink(store.change_sink())
            .into_handle();
        let handle: RecordHandle = slider.clone();
        store.bind(&handle).unwrap();

        store.apply_update("volume", r#"{"_value":0.75}"#, Origin::Remote, &mut uplink);
        assert_eq!(slider.borrow().value().value, 0.75);
        assert_eq!(store.flush_local(&mut uplink), 0);
        assert!(uplink.sent.is_empty());
    }

    #[test]
    fn test_local_change_flushed_as_update() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        let toggle = ToggleRecord::new("lights", ToggleValue::default())
            .with_sink(store.change_sink())
            .into_handle();
        let handle: RecordHandle = toggle.clone();
        store.attach(&handle).unwrap();

        toggle.borrow_mut().set(ToggleValue { is_on: true });
        assert_eq!(store.flush_local(&mut uplink), 1);
        assert_eq!(store.get("lights"), Some(r#"{"_isOn":true}"#));
        assert_eq!(uplink.updates()[0].session_data_id, "lights");
    }

    #[test]
    fn test_receive_only_handler_changes_dropped_at_flush() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        let (_probe, handle) = Probe::handle("foo");
        store.bind(&handle).unwrap();

        let sink = store.change_sink();
        sink.submit("foo", "1");
        sink.submit("unbound", "2");
        assert_eq!(store.flush_local(&mut uplink), 2);

        let guarded = ToggleRecord::new("guarded", ToggleValue::default())
            .with_permissions(RecordPermissions::RECEIVE_ONLY)
            .into_handle();
        let guarded_handle: RecordHandle = guarded.clone();
        store.bind(&guarded_handle).unwrap();
        sink.submit("guarded", r#"{"_isOn":true}"#);
        assert_eq!(store.flush_local(&mut uplink), 0);
        assert!(!store.contains("guarded"));
    }

    #[test]
    fn test_send_only_handler_ignores_remote_values() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        let toggle = ToggleRecord::new("lights", ToggleValue::default())
            .with_permissions(RecordPermissions::SEND_ONLY)
            .into_handle();
        let handle: RecordHandle = toggle.clone();
        store.bind(&handle).unwrap();

        store.apply_update("lights", r#"{"_isOn":true}"#, Origin::Remote, &mut uplink);
        assert!(!toggle.borrow().value().is_on);
        assert_eq!(store.get("lights"), Some(r#"{"_isOn":true}"#));
    }

    #[test]
    fn test_attach_delivers_stored_value() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        store.apply_update("volume", r#"{"_value":0.3}"#, Origin::Remote, &mut uplink);

        let slider = SliderRecord::new("volume", SliderValue { value: 1.0 })
            .with_sink(store.change_sink())
            .into_handle();
        let handle: RecordHandle = slider.clone();
        store.attach(&handle).unwrap();

        assert_eq!(slider.borrow().value().value, 0.3);
        assert_eq!(store.flush_local(&mut uplink), 0, "attach must not echo");
        assert!(store.is_bound("volume"));
    }

    #[test]
    fn test_attach_without_stored_value_keeps_local_value() {
        let mut store = SessionStore::new();
        let slider = SliderRecord::new("volume", SliderValue { value: 1.0 }).into_handle();
        let handle: RecordHandle = slider.clone();
        store.attach(&handle).unwrap();

        assert_eq!(slider.borrow().value().value, 1.0);
        assert!(!store.contains("volume"));
        assert!(store.detach(&handle));
    }

    #[test]
    fn test_save_local_captures_and_sends() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        let (_probe, handle) = Probe::handle("foo");

        assert!(store.save_local(&handle, &mut uplink));
        assert_eq!(store.get("foo"), Some(r#"{"probe":true}"#));
        assert_eq!(uplink.updates().len(), 1);
    }

    #[test]
    fn test_submit_rejected_only_for_id_being_applied() {
        let sink = ChangeSink::default();
        sink.begin_remote("foo");
        assert!(sink.is_applying_remote("foo"));
        assert!(!sink.submit("foo", "1"));
        assert!(sink.submit("bar", "1"));
        sink.end_remote();
        assert!(sink.submit("foo", "2"));
        assert_eq!(sink.pending_len(), 2);
    }
    #[test]
    fn test_remote_update_supersedes_unflushed_local_change() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        let slider = SliderRecord::new("volume", SliderValue { value: 0.0 })
            .with_sink(store.change_sink())
            .into_handle();
        let handle: RecordHandle = slider.clone();
        store.attach(&handle).unwrap();

        slider.borrow_mut().set(SliderValue { value: 0.9 });
        store.change_sink().submit("other", "1");
        store.apply_update("volume", r#"{"_value":0.2}"#, Origin::Remote, &mut uplink);

        assert_eq!(store.flush_local(&mut uplink), 1);
        assert_eq!(slider.borrow().value().value, 0.2);
        assert_eq!(store.get("volume"), Some(r#"{"_value":0.2}"#));
        let ids: Vec<String> = uplink
            .updates()
            .iter()
            .map(|update| update.session_data_id.clone())
            .collect();
        assert_eq!(ids, ["other"]);
    }

    #[test]
    fn test_full_sync_supersedes_unflushed_local_changes() {
        let mut store = SessionStore::new();
        let mut uplink = RecordingUplink::running();
        let sink = store.change_sink();
        sink.submit("foo", "1");
        sink.submit("bar", "2");

        let snapshot: Snapshot = [("foo".to_string(), "3".to_string())].into_iter().collect();
        store.load(snapshot);

        assert_eq!(store.flush_local(&mut uplink), 1);
        assert_eq!(store.get("foo"), Some("3"));
        assert_eq!(store.get("bar"), Some("2"));
    }
}
