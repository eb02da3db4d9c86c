//! Change feed: a pub/sub fan-out over trades and position updates.
//! With no subscribers attached, publishing is a single
//! length check and nothing else is allocated or cloned.

use std::sync::{Arc, Mutex};

use crate::domain::{Fill, Order, Position, Trade};

#[derive(Debug, Clone)]
pub enum ChangeEvent {
    OrderUpdated(Order),
    FillRecorded(Fill),
    PositionUpdated(Position),
    TradeClosed(Trade),
}

type Subscriber = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Default)]
pub struct ChangeFeed {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl ChangeFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .expect("change feed mutex poisoned")
            .push(Box::new(callback));
    }

    pub fn publish(&self, event: ChangeEvent) {
        let subscribers = self.subscribers.lock().expect("change feed mutex poisoned");
        if subscribers.is_empty() {
            return;
        }
        for subscriber in subscribers.iter() {
            subscriber(&event);
        }
    }
}
