use std::cell::RefCell;

use crate::{LinkError, LinkHandler, LinkStore, QueryString, Subscribers};

/// In-memory link store for headless runs and tests.
///
/// Every committed write is kept in a log so callers can check that only
/// final values reached the URL.
#[derive(Default)]
pub struct MemoryLinkStore {
    query: RefCell<QueryString>,
    writes: RefCell<Vec<(String, String)>>,
    subscribers: Subscribers,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_query(raw: &str) -> Self {
        Self {
            query: RefCell::new(QueryString::parse(raw)),
            ..Self::default()
        }
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Replaces the whole query as a back/forward navigation would and
    /// notifies subscribers of every key whose token changed.
    pub fn navigate(&self, raw: &str) {
        let next = QueryString::parse(raw);
        let before = self.query.replace(next.clone());
        self.subscribers.notify_changes(&before, &next);
    }
}

impl LinkStore for MemoryLinkStore {
    fn read(&self, id: &str) -> Option<String> {
        self.query.borrow().get(id).map(str::to_string)
    }

    fn write(&self, id: &str, token: &str) -> Result<(), LinkError> {
        self.query.borrow_mut().set(id, token);
        self.writes
            .borrow_mut()
            .push((id.to_string(), token.to_string()));
        Ok(())
    }

    fn subscribe(&self, id: &str, handler: LinkHandler) -> Option<String> {
        self.subscribers.add(id, handler);
        self.read(id)
    }

    fn query(&self) -> QueryString {
        self.query.borrow().clone()
    }
}
