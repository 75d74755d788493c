use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use tracing::trace;

use crate::error::Result;
use crate::event::{CoreError, CoreFrame, Event};

/// Receives frames and errors from TIC streams.
///
/// Callbacks run on a delivery thread owned by the registration, never on
/// the thread reading the modem. Events from one stream reach a given
/// registration in the order they were produced.
pub trait Subscriber: Send + Sync {
    fn on_data(&self, frame: CoreFrame);
    fn on_error(&self, error: CoreError);
}

/// Subscribers are compared by the address of their shared handle.
pub(crate) fn same_subscriber(a: &Arc<dyn Subscriber>, b: &Arc<dyn Subscriber>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// How a subscriber got attached to a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Through `subscribe`, for every stream.
    Global,
    /// Through `subscribe_to`, for this stream only.
    Direct,
}

/// A queue plus the thread draining it into one subscriber.
///
/// Dropping the mailbox closes the queue; the thread delivers what is
/// already queued and exits.
struct Mailbox {
    subscriber: Arc<dyn Subscriber>,
    sender: Sender<Event>,
}

impl Mailbox {
    fn spawn(subscriber: Arc<dyn Subscriber>, name: String) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Event>();
        let target = Arc::clone(&subscriber);
        thread::Builder::new().name(name).spawn(move || {
            for event in receiver {
                match event {
                    Event::Data(frame) => target.on_data(frame),
                    Event::Error(error) => target.on_error(error),
                }
            }
        })?;
        Ok(Self { subscriber, sender })
    }

    fn deliver(&self, event: Event) {
        if self.sender.send(event).is_err() {
            trace!("delivery thread gone; event dropped");
        }
    }
}

struct Registration {
    route: Route,
    mailbox: Mailbox,
}

/// Registrations attached to one stream.
pub(crate) struct SubscriberList {
    name: String,
    entries: Mutex<Vec<Registration>>,
}

impl SubscriberList {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Attach `subscriber` through `route`. Returns false if it already was.
    pub(crate) fn add(&self, route: Route, subscriber: Arc<dyn Subscriber>) -> Result<bool> {
        let mut entries = self.lock();
        if entries
            .iter()
            .any(|r| r.route == route && same_subscriber(&r.mailbox.subscriber, &subscriber))
        {
            return Ok(false);
        }
        let mailbox = Mailbox::spawn(subscriber, format!("{}-deliver", self.name))?;
        entries.push(Registration { route, mailbox });
        Ok(true)
    }

    /// Detach `subscriber` from `route`. Returns false if it was not attached.
    pub(crate) fn remove(&self, route: Route, subscriber: &Arc<dyn Subscriber>) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|r| !(r.route == route && same_subscriber(&r.mailbox.subscriber, subscriber)));
        entries.len() != before
    }

    /// Whether `subscriber` is attached through any route.
    pub(crate) fn contains(&self, subscriber: &Arc<dyn Subscriber>) -> bool {
        self.lock()
            .iter()
            .any(|r| same_subscriber(&r.mailbox.subscriber, subscriber))
    }

    pub(crate) fn publish(&self, event: Event) {
        let entries = self.lock();
        for registration in entries.iter() {
            registration.mailbox.deliver(event.clone());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
