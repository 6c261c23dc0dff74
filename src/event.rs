/*
 * event.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Busta, an email protocol engine library.
 *
 * Busta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Busta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Busta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Event bus for unsolicited server responses. One bus per client;
//! subscribers are invoked synchronously, in subscription order, and
//! must not block.

use std::sync::{Arc, Mutex};

use crate::mime::MimeMessage;

/// Asynchronous mailbox events (EXPUNGE, EXISTS, RECENT, FETCH pushed
/// during IDLE or between commands) and session-level notifications.
#[derive(Debug, Clone)]
pub enum MailEvent {
    ConnectionLost,
    /// Message at this sequence number was removed; later messages shift down.
    Expunge(u32),
    Exists(u32),
    Recent(u32),
    Fetch(MimeMessage),
    FlagsChanged(u32, Vec<String>),
}

type Subscriber = Arc<dyn Fn(&MailEvent) + Send + Sync>;

/// Per-client event bus. Cheap to clone; clones share the subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Subscribers are called in registration order.
    pub fn subscribe<F>(&self, f: F)
    where
        F: Fn(&MailEvent) + Send + Sync + 'static,
    {
        self.subscribers.lock().unwrap().push(Arc::new(f));
    }

    /// Deliver an event to all subscribers, synchronously.
    pub fn emit(&self, event: &MailEvent) {
        let subs: Vec<Subscriber> = self.subscribers.lock().unwrap().clone();
        for s in subs {
            s(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn subscribers_run_in_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3u32 {
            let log = log.clone();
            bus.subscribe(move |_| log.lock().unwrap().push(i));
        }
        bus.emit(&MailEvent::Exists(1));
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn clones_share_subscribers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        bus.clone().subscribe(move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        bus.emit(&MailEvent::Recent(2));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
