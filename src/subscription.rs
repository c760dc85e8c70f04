use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::state::State;

type Observer = Rc<dyn Fn(&State)>;
type ObserverEntries = Rc<RefCell<Vec<(u64, Observer)>>>;

/// Synchronous change-event channel.
///
/// Observers run on the designated scheduling context, in subscription
/// order, after every state assignment.
pub(crate) struct Observers {
    next_id: Cell<u64>,
    entries: ObserverEntries,
}

impl Observers {
    pub(crate) fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            entries: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub(crate) fn subscribe(&self, observer: impl Fn(&State) + 'static) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push((id, Rc::new(observer)));
        Subscription {
            id,
            entries: Rc::downgrade(&self.entries),
        }
    }

    /// The current observers, detached from the registration list so that
    /// callbacks may subscribe or unsubscribe reentrantly.
    pub(crate) fn snapshot(&self) -> Vec<Observer> {
        self.entries
            .borrow()
            .iter()
            .map(|(_, observer)| Rc::clone(observer))
            .collect()
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.entries.borrow().len())
            .finish()
    }
}

/// Handle returned by `Client::subscribe`. Dropping it unsubscribes.
#[must_use = "dropping the subscription immediately unsubscribes"]
pub struct Subscription {
    id: u64,
    entries: Weak<RefCell<Vec<(u64, Observer)>>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(entries) = self.entries.upgrade() {
            entries.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
