//! Link store: the URL query string as the persistent home of harness
//! parameters.
//!
//! Each parameter id owns one query key. Writes rewrite the current history
//! entry in place; external navigation (back/forward) is reported to
//! subscribers key by key.

pub mod memory;
pub mod query;

use std::cell::RefCell;
use std::rc::Rc;

pub use memory::MemoryLinkStore;
pub use query::QueryString;

/// Callback for external changes of one key. `None` means the key vanished.
pub type LinkHandler = Rc<dyn Fn(Option<&str>)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    Unavailable,
    Io(String),
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::Unavailable => write!(f, "browser location unavailable"),
            LinkError::Io(msg) => write!(f, "link store error: {msg}"),
        }
    }
}

impl std::error::Error for LinkError {}

pub trait LinkStore {
    fn read(&self, id: &str) -> Option<String>;
    fn write(&self, id: &str, token: &str) -> Result<(), LinkError>;
    /// Registers `handler` for external changes of `id` and returns the token
    /// present right now.
    fn subscribe(&self, id: &str, handler: LinkHandler) -> Option<String>;
    /// The whole query as it would appear in a shared link.
    fn query(&self) -> QueryString;
}

/// Per-key subscriber list shared by the store implementations.
#[derive(Default)]
pub struct Subscribers {
    handlers: RefCell<Vec<(String, LinkHandler)>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: &str, handler: LinkHandler) {
        self.handlers.borrow_mut().push((id.to_string(), handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.borrow().is_empty()
    }

    /// Fires the handlers of every key that differs between `before` and
    /// `after`. Handlers run with no borrow held and may re-enter the store.
    pub fn notify_changes(&self, before: &QueryString, after: &QueryString) {
        for key in before.changed_keys(after) {
            let targets: Vec<LinkHandler> = self
                .handlers
                .borrow()
                .iter()
                .filter(|(id, _)| *id == key)
                .map(|(_, h)| Rc::clone(h))
                .collect();
            if targets.is_empty() {
                continue;
            }
            let token = after.get(&key);
            tracing::debug!(key = %key, token = ?token, "link changed externally");
            for handler in targets {
                handler(token);
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod browser {
    use super::{LinkError, LinkHandler, LinkStore, QueryString, Subscribers};
    use std::rc::Rc;
    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::*;

    struct Shared {
        last: std::cell::RefCell<QueryString>,
        subscribers: Subscribers,
    }

    /// Link store backed by `window.location` and `history.replaceState`.
    pub struct BrowserLinkStore {
        shared: Rc<Shared>,
        on_popstate: Closure<dyn FnMut(web_sys::Event)>,
    }

    impl BrowserLinkStore {
        pub fn new() -> Result<Self, LinkError> {
            let win = web_sys::window().ok_or(LinkError::Unavailable)?;
            let shared = Rc::new(Shared {
                last: std::cell::RefCell::new(location_query()?),
                subscribers: Subscribers::new(),
            });

            let listener_shared = Rc::clone(&shared);
            let on_popstate = Closure::<dyn FnMut(web_sys::Event)>::new(move |_ev: web_sys::Event| {
                let next = match location_query() {
                    Ok(q) => q,
                    Err(e) => {
                        tracing::warn!("popstate without readable location: {e}");
                        return;
                    }
                };
                let before = listener_shared.last.replace(next.clone());
                listener_shared.subscribers.notify_changes(&before, &next);
            });
            win.add_event_listener_with_callback("popstate", on_popstate.as_ref().unchecked_ref())
                .map_err(|e| LinkError::Io(format!("addEventListener(popstate) failed: {:?}", e)))?;

            Ok(Self {
                shared,
                on_popstate,
            })
        }
    }

    impl Drop for BrowserLinkStore {
        fn drop(&mut self) {
            if let Some(win) = web_sys::window() {
                let _ = win.remove_event_listener_with_callback(
                    "popstate",
                    self.on_popstate.as_ref().unchecked_ref(),
                );
            }
        }
    }

    impl LinkStore for BrowserLinkStore {
        fn read(&self, id: &str) -> Option<String> {
            match location_query() {
                Ok(q) => q.get(id).map(str::to_string),
                Err(_) => self.shared.last.borrow().get(id).map(str::to_string),
            }
        }

        fn write(&self, id: &str, token: &str) -> Result<(), LinkError> {
            let win = web_sys::window().ok_or(LinkError::Unavailable)?;
            let location = win.location();
            let mut query = location_query()?;
            query.set(id, token);

            let path = location
                .pathname()
                .map_err(|e| LinkError::Io(format!("location.pathname failed: {:?}", e)))?;
            let hash = location.hash().unwrap_or_default();
            let url = format!("{path}{query}{hash}");

            win.history()
                .map_err(|e| LinkError::Io(format!("history unavailable: {:?}", e)))?
                .replace_state_with_url(&JsValue::NULL, "", Some(&url))
                .map_err(|e| LinkError::Io(format!("replaceState failed: {:?}", e)))?;

            *self.shared.last.borrow_mut() = query;
            tracing::debug!(id, token, "link written");
            Ok(())
        }

        fn subscribe(&self, id: &str, handler: LinkHandler) -> Option<String> {
            self.shared.subscribers.add(id, handler);
            self.read(id)
        }

        fn query(&self) -> QueryString {
            location_query().unwrap_or_else(|_| self.shared.last.borrow().clone())
        }
    }

    fn location_query() -> Result<QueryString, LinkError> {
        let win = web_sys::window().ok_or(LinkError::Unavailable)?;
        let search = win
            .location()
            .search()
            .map_err(|e| LinkError::Io(format!("location.search failed: {:?}", e)))?;
        Ok(QueryString::parse(&search))
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserLinkStore;

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
pub struct BrowserLinkStore;

#[cfg(not(target_arch = "wasm32"))]
impl BrowserLinkStore {
    pub fn new() -> Result<Self, LinkError> {
        Err(LinkError::Unavailable)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl LinkStore for BrowserLinkStore {
    fn read(&self, _id: &str) -> Option<String> {
        None
    }

    fn write(&self, _id: &str, _token: &str) -> Result<(), LinkError> {
        Err(LinkError::Unavailable)
    }

    fn subscribe(&self, _id: &str, _handler: LinkHandler) -> Option<String> {
        None
    }

    fn query(&self) -> QueryString {
        QueryString::new()
    }
}
