use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::data::Project;

const FEED_CAPACITY: usize = 32;

/// Notification sent to display-layer subscribers
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// The in-memory project list changed; carries the new list
    Updated(Arc<Vec<Project>>),
    /// The realtime listener failed; the list was left as it was
    ReadFailed(String),
}

type Callback = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Fan-out of repository changes to callbacks and async receivers.
///
/// Callbacks run synchronously on the emitting task and must not
/// register further callbacks.
pub struct ChangeFeed {
    callbacks: Mutex<Vec<Callback>>,
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            callbacks: Mutex::new(Vec::new()),
            sender,
        }
    }

    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.callbacks.lock().push(Box::new(callback));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ChangeEvent) {
        for callback in self.callbacks.lock().iter() {
            callback(&event);
        }
        // Nobody listening is fine
        let _ = self.sender.send(event);
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("callbacks", &self.callbacks.lock().len())
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}
