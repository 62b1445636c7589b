//! The channel base (component C): the `SessionState`-aware dispatcher sitting
//! on top of a [`Transport`]. Routes each inbound envelope to subscribers,
//! enforces which operations are legal in which session state, and folds in
//! the two cross-cutting features of §4.C: the ping auto-responder and the
//! envelope recipient filler.
//!
//! No single teacher file matches this shape one-to-one (zeekoe's closest
//! analogue is the statically session-typed `dialectic` channel, which has no
//! runtime listener registry); the bag-plus-one-shot-queue design and the
//! single-monitor synchronization style follow zeekoe's
//! `transport/server.rs`, which serializes connection handling through one
//! `tokio::sync::Mutex` guarding shared state reached from multiple tasks.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use tracing::warn;

use crate::envelope::{
    Command, Envelope, Message, Notification, NotificationEvent, Session, SessionState,
};
use crate::error::{LimeError, Result};
use crate::node::Node;
use crate::ping;
use crate::recipient_filler;
use crate::trace::TraceWriter;
use crate::transport::{EnvelopeListener, StateListener, Transport};

/// A handle returned by `add_*_listener`, used to `remove_*_listener` it
/// later. Explicit rather than identity-based, since closures have no stable
/// identity to compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

type MessageListener = Arc<dyn Fn(Message) + Send + Sync>;
type CommandListener = Arc<dyn Fn(Command) + Send + Sync>;
type NotificationListener = Arc<dyn Fn(Notification) + Send + Sync>;
type SessionListener = Box<dyn FnOnce(Session) + Send>;

struct Registry<L> {
    next_id: u64,
    bag: Vec<(ListenerHandle, L)>,
    once: VecDeque<(ListenerHandle, L)>,
}

impl<L: Clone> Registry<L> {
    fn new() -> Self {
        Registry {
            next_id: 0,
            bag: Vec::new(),
            once: VecDeque::new(),
        }
    }

    fn add(&mut self, listener: L, once: bool) -> ListenerHandle {
        let handle = ListenerHandle(self.next_id);
        self.next_id += 1;
        if once {
            self.once.push_back((handle, listener));
        } else {
            self.bag.push((handle, listener));
        }
        handle
    }

    fn remove(&mut self, handle: ListenerHandle) {
        self.bag.retain(|(h, _)| *h != handle);
        self.once.retain(|(h, _)| *h != handle);
    }

    /// Take every queued one-shot listener, leaving the registry's one-shot
    /// queue empty. Each is delivered exactly once, in parallel with the bag.
    fn drain_once(&mut self) -> Vec<L> {
        self.once.drain(..).map(|(_, l)| l).collect()
    }

    fn bag_snapshot(&self) -> Vec<L> {
        self.bag.iter().map(|(_, l)| l.clone()).collect()
    }
}

struct Inner {
    state: SessionState,
    session_id: Option<String>,
    local_node: Option<Node>,
    remote_node: Option<Node>,
    message_listeners: Registry<MessageListener>,
    command_listeners: Registry<CommandListener>,
    notification_listeners: Registry<NotificationListener>,
    session_listeners: VecDeque<SessionListener>,
}

impl Inner {
    fn new() -> Self {
        Inner {
            state: SessionState::New,
            session_id: None,
            local_node: None,
            remote_node: None,
            message_listeners: Registry::new(),
            command_listeners: Registry::new(),
            notification_listeners: Registry::new(),
            session_listeners: VecDeque::new(),
        }
    }
}

/// The channel base: owns the [`Transport`] exclusively for its lifetime and
/// dispatches every inbound envelope under a single monitor.
pub struct ChannelBase {
    transport: Transport,
    inner: StdMutex<Inner>,
    fill_envelope_recipients: bool,
    auto_reply_pings: bool,
}

impl ChannelBase {
    /// Build a channel around a fresh transport. `fill_envelope_recipients`
    /// and `auto_reply_pings` toggle the two optional cross-cutting features
    /// of §4.C.
    pub fn new(
        trace: Arc<dyn TraceWriter>,
        fill_envelope_recipients: bool,
        auto_reply_pings: bool,
    ) -> Arc<Self> {
        Arc::new(ChannelBase {
            transport: Transport::new(trace),
            inner: StdMutex::new(Inner::new()),
            fill_envelope_recipients,
            auto_reply_pings,
        })
    }

    /// Wire this channel up as its own transport's envelope listener. Must be
    /// called once, before [`ChannelBase::open`].
    pub async fn install(self: &Arc<Self>) {
        let dispatcher: Arc<dyn EnvelopeListener> = Arc::new(Dispatcher(Arc::clone(self)));
        self.transport.set_envelope_listener(Some(dispatcher)).await;
    }

    pub async fn set_state_listener(&self, listener: Option<Arc<dyn StateListener>>) {
        self.transport.set_state_listener(listener).await;
    }

    pub async fn open(&self, uri: &str) -> Result<()> {
        self.transport.open(uri).await
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }

    pub async fn set_encryption(&self, encryption: crate::transport::Encryption) -> Result<()> {
        self.transport.set_encryption(encryption).await
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().unwrap().state
    }

    pub fn set_state(&self, state: SessionState) {
        self.inner.lock().unwrap().state = state;
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.lock().unwrap().session_id.clone()
    }

    pub fn set_session_id(&self, id: Option<String>) {
        self.inner.lock().unwrap().session_id = id;
    }

    pub fn local_node(&self) -> Option<Node> {
        self.inner.lock().unwrap().local_node.clone()
    }

    pub fn set_local_node(&self, node: Option<Node>) {
        self.inner.lock().unwrap().local_node = node;
    }

    pub fn remote_node(&self) -> Option<Node> {
        self.inner.lock().unwrap().remote_node.clone()
    }

    pub fn set_remote_node(&self, node: Option<Node>) {
        self.inner.lock().unwrap().remote_node = node;
    }

    pub fn add_message_listener(&self, listener: MessageListener, once: bool) -> ListenerHandle {
        self.inner.lock().unwrap().message_listeners.add(listener, once)
    }

    pub fn remove_message_listener(&self, handle: ListenerHandle) {
        self.inner.lock().unwrap().message_listeners.remove(handle)
    }

    pub fn add_command_listener(&self, listener: CommandListener, once: bool) -> ListenerHandle {
        self.inner.lock().unwrap().command_listeners.add(listener, once)
    }

    pub fn remove_command_listener(&self, handle: ListenerHandle) {
        self.inner.lock().unwrap().command_listeners.remove(handle)
    }

    pub fn add_notification_listener(
        &self,
        listener: NotificationListener,
        once: bool,
    ) -> ListenerHandle {
        self.inner
            .lock()
            .unwrap()
            .notification_listeners
            .add(listener, once)
    }

    pub fn remove_notification_listener(&self, handle: ListenerHandle) {
        self.inner
            .lock()
            .unwrap()
            .notification_listeners
            .remove(handle)
    }

    /// Queue a one-shot listener for the next inbound Session envelope.
    /// Queued listeners are delivered strictly in FIFO order, one per
    /// envelope, unlike the other three kinds' parallel-shot queues.
    pub fn enqueue_session_listener(&self, listener: SessionListener) {
        self.inner.lock().unwrap().session_listeners.push_back(listener);
    }

    fn require_state(&self, allowed: &[SessionState]) -> Result<()> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(LimeError::invalid_state(format!(
                "operation not legal in session state {:?}",
                state
            )))
        }
    }

    pub async fn send_message(&self, message: Message) -> Result<()> {
        self.require_state(&[SessionState::Established])?;
        let mut envelope = Envelope::Message(message);
        self.fill_if_enabled(&mut envelope);
        self.transport.send(&envelope).await
    }

    pub async fn send_command(&self, command: Command) -> Result<()> {
        self.require_state(&[SessionState::Established])?;
        let mut envelope = Envelope::Command(command);
        self.fill_if_enabled(&mut envelope);
        self.transport.send(&envelope).await
    }

    pub async fn send_notification(&self, notification: Notification) -> Result<()> {
        self.require_state(&[SessionState::Established])?;
        let mut envelope = Envelope::Notification(notification);
        self.fill_if_enabled(&mut envelope);
        self.transport.send(&envelope).await
    }

    pub async fn send_session(&self, session: Session) -> Result<()> {
        self.require_state(&[
            SessionState::New,
            SessionState::Negotiating,
            SessionState::Authenticating,
            SessionState::Established,
            SessionState::Finishing,
        ])?;
        self.transport.send(&Envelope::Session(session)).await
    }

    /// Report delivery of a previously received message: writes exactly one
    /// `received` Notification addressed to `to`. Legal only in `established`;
    /// in any other state this fails with *invalid-state* and writes nothing.
    pub async fn send_received_notification(&self, id: impl Into<String>, to: Node) -> Result<()> {
        self.require_state(&[SessionState::Established])?;
        let mut notification = Notification::new(NotificationEvent::Received);
        notification.shared.id = Some(id.into());
        notification.shared.to = Some(to);
        let mut envelope = Envelope::Notification(notification);
        self.fill_if_enabled(&mut envelope);
        self.transport.send(&envelope).await
    }

    fn fill_if_enabled(&self, envelope: &mut Envelope) {
        if self.fill_envelope_recipients {
            let (local, remote) = {
                let inner = self.inner.lock().unwrap();
                (inner.local_node.clone(), inner.remote_node.clone())
            };
            recipient_filler::fill_recipients(envelope, local.as_ref(), remote.as_ref());
        }
    }

    fn dispatch(self: &Arc<Self>, mut envelope: Envelope) {
        self.fill_if_enabled(&mut envelope);

        match envelope {
            Envelope::Message(m) => self.dispatch_message(m),
            Envelope::Notification(n) => self.dispatch_notification(n),
            Envelope::Command(c) => self.dispatch_command(c),
            Envelope::Session(s) => self.dispatch_session(s),
        }
    }

    /// Report a rejected out-of-state dispatch to the transport's state
    /// listener, without blocking the reader task that called us.
    fn reject_out_of_state(self: &Arc<Self>, kind: &'static str) {
        let state = self.state();
        let error = LimeError::invalid_state(format!("{} received outside established state (state is {:?})", kind, state));
        warn!(%error);
        let channel = Arc::clone(self);
        tokio::spawn(async move {
            channel.transport.notify_exception(&error).await;
        });
    }

    fn dispatch_message(self: &Arc<Self>, message: Message) {
        if self.state() != SessionState::Established {
            self.reject_out_of_state("message");
            return;
        }
        let (once, bag) = {
            let mut inner = self.inner.lock().unwrap();
            (
                inner.message_listeners.drain_once(),
                inner.message_listeners.bag_snapshot(),
            )
        };
        for listener in once {
            listener(message.clone());
        }
        for listener in bag {
            listener(message.clone());
        }
    }

    fn dispatch_notification(self: &Arc<Self>, notification: Notification) {
        if self.state() != SessionState::Established {
            self.reject_out_of_state("notification");
            return;
        }
        let (once, bag) = {
            let mut inner = self.inner.lock().unwrap();
            (
                inner.notification_listeners.drain_once(),
                inner.notification_listeners.bag_snapshot(),
            )
        };
        for listener in once {
            listener(notification.clone());
        }
        for listener in bag {
            listener(notification.clone());
        }
    }

    fn dispatch_command(self: &Arc<Self>, command: Command) {
        if self.auto_reply_pings && ping::is_ping_request(&command) {
            let response = ping::ping_response(&command);
            let channel = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(error) = channel.send_command(response).await {
                    warn!(%error, "failed to send ping response");
                }
            });
            return;
        }

        if self.state() != SessionState::Established {
            self.reject_out_of_state("command");
            return;
        }
        let (once, bag) = {
            let mut inner = self.inner.lock().unwrap();
            (
                inner.command_listeners.drain_once(),
                inner.command_listeners.bag_snapshot(),
            )
        };
        for listener in once {
            listener(command.clone());
        }
        for listener in bag {
            listener(command.clone());
        }
    }

    fn dispatch_session(self: &Arc<Self>, session: Session) {
        let listener = self.inner.lock().unwrap().session_listeners.pop_front();
        match listener {
            Some(listener) => listener(session),
            None => warn!("session envelope received with no listener queued"),
        }
    }
}

struct Dispatcher(Arc<ChannelBase>);

impl EnvelopeListener for Dispatcher {
    fn on_receive(&self, envelope: Envelope) {
        self.0.dispatch(envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::CommandMethod;
    use crate::trace::NullTraceWriter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_channel() -> Arc<ChannelBase> {
        ChannelBase::new(Arc::new(NullTraceWriter), false, false)
    }

    #[test]
    fn send_message_rejected_before_established() {
        let channel = test_channel();
        assert_eq!(channel.state(), SessionState::New);
        // require_state is synchronous; exercise it directly without a runtime.
        assert!(channel.require_state(&[SessionState::Established]).is_err());
    }

    #[test]
    fn once_listener_fires_exactly_once() {
        let channel = test_channel();
        channel.set_state(SessionState::Established);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        channel.add_message_listener(
            Arc::new(move |_msg| {
                calls2.fetch_add(1, Ordering::SeqCst);
            }),
            true,
        );

        channel.dispatch(Envelope::Message(Message::new(serde_json::json!("a"))));
        channel.dispatch(Envelope::Message(Message::new(serde_json::json!("b"))));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bag_listener_fires_on_every_delivery() {
        let channel = test_channel();
        channel.set_state(SessionState::Established);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        channel.add_message_listener(
            Arc::new(move |_msg| {
                calls2.fetch_add(1, Ordering::SeqCst);
            }),
            false,
        );

        channel.dispatch(Envelope::Message(Message::new(serde_json::json!("a"))));
        channel.dispatch(Envelope::Message(Message::new(serde_json::json!("b"))));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn removed_listener_does_not_fire() {
        let channel = test_channel();
        channel.set_state(SessionState::Established);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let handle = channel.add_message_listener(
            Arc::new(move |_msg| {
                calls2.fetch_add(1, Ordering::SeqCst);
            }),
            false,
        );
        channel.remove_message_listener(handle);

        channel.dispatch(Envelope::Message(Message::new(serde_json::json!("a"))));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn message_dispatch_outside_established_does_not_deliver() {
        let channel = test_channel();
        assert_eq!(channel.state(), SessionState::New);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        channel.add_message_listener(
            Arc::new(move |_msg| {
                calls2.fetch_add(1, Ordering::SeqCst);
            }),
            false,
        );

        channel.dispatch(Envelope::Message(Message::new(serde_json::json!("a"))));
        tokio::task::yield_now().await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn session_listeners_deliver_in_fifo_order_one_at_a_time() {
        let channel = test_channel();
        let order = Arc::new(StdMutex::new(Vec::new()));
        let order1 = Arc::clone(&order);
        let order2 = Arc::clone(&order);
        channel.enqueue_session_listener(Box::new(move |s: Session| order1.lock().unwrap().push((1, s.state))));
        channel.enqueue_session_listener(Box::new(move |s: Session| order2.lock().unwrap().push((2, s.state))));

        channel.dispatch(Envelope::Session(Session::new(SessionState::Negotiating)));
        channel.dispatch(Envelope::Session(Session::new(SessionState::Established)));

        let order = order.lock().unwrap();
        assert_eq!(order[0], (1, SessionState::Negotiating));
        assert_eq!(order[1], (2, SessionState::Established));
    }

    #[test]
    fn command_dispatch_auto_replies_to_ping() {
        let mut command = Command::new("1", CommandMethod::Get);
        command.uri = Some("/ping".to_string());
        assert!(ping::is_ping_request(&command));
    }
}
