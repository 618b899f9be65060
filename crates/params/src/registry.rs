use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use link::LinkStore;

use crate::control::{HeadlessControl, ParamControl};
use crate::domain::{Domain, ParamKind};
use crate::spec::ParamSpec;
use crate::value::ParamValue;

/// Change callback: `(value, is_initial)`.
pub type OnChange = Rc<dyn Fn(&ParamValue, bool)>;

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    AlreadyRegistered(String),
    InvalidDefault(String),
    Unknown(String),
    /// The parameter is an action and carries no value.
    NotValued(String),
    NotAction(String),
    OutOfDomain { id: String, value: ParamValue },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::AlreadyRegistered(id) => write!(f, "parameter {id:?} already registered"),
            RegistryError::InvalidDefault(msg) => write!(f, "invalid default: {msg}"),
            RegistryError::Unknown(id) => write!(f, "unknown parameter {id:?}"),
            RegistryError::NotValued(id) => write!(f, "parameter {id:?} is an action"),
            RegistryError::NotAction(id) => write!(f, "parameter {id:?} is not an action"),
            RegistryError::OutOfDomain { id, value } => {
                write!(f, "value {value} is outside the domain of {id:?}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

struct Entry {
    spec: ParamSpec,
    value: ParamValue,
    /// A range edit that has not been committed to the link yet.
    pending: bool,
    control: Rc<dyn ParamControl>,
    on_change: OnChange,
}

struct Inner {
    links: Rc<dyn LinkStore>,
    entries: RefCell<Vec<Entry>>,
}

impl Inner {
    fn with_entry<R>(&self, id: &str, f: impl FnOnce(&mut Entry) -> R) -> Option<R> {
        let mut entries = self.entries.borrow_mut();
        entries.iter_mut().find(|e| e.spec.id == id).map(f)
    }
}

/// Session-wide table of parameters, kept in sync with a [`LinkStore`].
///
/// Cloning yields another handle to the same registry. Callbacks and control
/// updates always run with no internal borrow held, so they may freely call
/// back into the registry.
#[derive(Clone)]
pub struct ParameterRegistry {
    inner: Rc<Inner>,
}

impl ParameterRegistry {
    pub fn new(links: Rc<dyn LinkStore>) -> Self {
        Self {
            inner: Rc::new(Inner {
                links,
                entries: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn links(&self) -> Rc<dyn LinkStore> {
        Rc::clone(&self.inner.links)
    }

    pub fn register(
        &self,
        spec: ParamSpec,
        on_change: impl Fn(&ParamValue, bool) + 'static,
    ) -> Result<Option<ParamValue>, RegistryError> {
        self.register_with_control(spec, Rc::new(HeadlessControl::new()), on_change)
    }

    /// Registers `spec`, hydrates it from the link and runs
    /// `on_change(initial, true)` before returning the initial value.
    ///
    /// Actions are registered without hydration or initial call and yield
    /// `Ok(None)`.
    pub fn register_with_control(
        &self,
        spec: ParamSpec,
        control: Rc<dyn ParamControl>,
        on_change: impl Fn(&ParamValue, bool) + 'static,
    ) -> Result<Option<ParamValue>, RegistryError> {
        if self.contains(&spec.id) {
            tracing::warn!(id = %spec.id, "duplicate parameter registration rejected");
            return Err(RegistryError::AlreadyRegistered(spec.id));
        }
        spec.validate().map_err(RegistryError::InvalidDefault)?;

        let on_change: OnChange = Rc::new(on_change);
        if spec.domain.kind() == ParamKind::Action {
            self.inner.entries.borrow_mut().push(Entry {
                spec,
                value: ParamValue::Trigger,
                pending: false,
                control,
                on_change,
            });
            return Ok(None);
        }

        let stored = self.subscribe(&spec.id);
        let initial = match stored.as_deref() {
            Some(token) => spec.domain.decode(token).unwrap_or_else(|| {
                tracing::debug!(id = %spec.id, token, "ignoring unusable link token");
                spec.default.clone()
            }),
            None => spec.default.clone(),
        };

        tracing::debug!(id = %spec.id, value = %initial, "parameter registered");
        self.inner.entries.borrow_mut().push(Entry {
            spec,
            value: initial.clone(),
            pending: false,
            control: Rc::clone(&control),
            on_change: Rc::clone(&on_change),
        });

        control.show(&initial);
        on_change(&initial, true);
        Ok(Some(initial))
    }

    fn subscribe(&self, id: &str) -> Option<String> {
        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        let key = id.to_string();
        self.inner.links.subscribe(
            id,
            Rc::new(move |token: Option<&str>| {
                if let Some(inner) = weak.upgrade() {
                    ParameterRegistry { inner }.apply_external(&key, token);
                }
            }),
        )
    }

    /// A value arriving from the link through navigation. Unusable or
    /// unchanged tokens are ignored.
    fn apply_external(&self, id: &str, token: Option<&str>) {
        let Some(token) = token else {
            tracing::debug!(id, "link entry removed; keeping live value");
            return;
        };
        let update = self
            .inner
            .with_entry(id, |entry| {
                let Some(value) = entry.spec.domain.decode(token) else {
                    tracing::debug!(id, token, "ignoring unusable link token");
                    return None;
                };
                if value == entry.value {
                    return None;
                }
                entry.value = value.clone();
                entry.pending = false;
                Some((value, Rc::clone(&entry.control), Rc::clone(&entry.on_change)))
            })
            .flatten();

        if let Some((value, control, on_change)) = update {
            tracing::debug!(id, value = %value, "parameter updated from link");
            control.show(&value);
            on_change(&value, false);
        }
    }

    /// A local edit from the widget.
    ///
    /// Toggles and choices are written to the link immediately; ranges stay
    /// pending until [`finish_edit`](Self::finish_edit). A link that refuses
    /// the write is logged and does not undo the edit: the live value and the
    /// callback still reflect it, only the URL lags behind.
    pub fn edit(&self, id: &str, value: impl Into<ParamValue>) -> Result<(), RegistryError> {
        let value = value.into();
        let (on_change, commit_now) = self
            .inner
            .with_entry(id, |entry| {
                match entry.spec.domain.kind() {
                    ParamKind::Action => return Err(RegistryError::NotValued(id.to_string())),
                    kind if !entry.spec.domain.contains(&value) => {
                        tracing::warn!(id, ?kind, value = %value, "edit outside domain rejected");
                        return Err(RegistryError::OutOfDomain {
                            id: id.to_string(),
                            value: value.clone(),
                        });
                    }
                    _ => {}
                }
                let immediate = entry.spec.domain.kind() != ParamKind::Range;
                entry.value = value.clone();
                entry.pending = !immediate;
                Ok((Rc::clone(&entry.on_change), immediate))
            })
            .ok_or_else(|| RegistryError::Unknown(id.to_string()))??;

        on_change(&value, false);
        if commit_now {
            self.commit(id);
        }
        Ok(())
    }

    /// Ends an edit interaction (drag release, blur). Writes the pending range
    /// value, if any, and reports whether the link accepted a write.
    pub fn finish_edit(&self, id: &str) -> Result<bool, RegistryError> {
        let pending = self
            .inner
            .with_entry(id, |entry| std::mem::replace(&mut entry.pending, false))
            .ok_or_else(|| RegistryError::Unknown(id.to_string()))?;
        Ok(pending && self.commit(id))
    }

    /// Writes the live value of `id` to the link. Failures are logged only.
    fn commit(&self, id: &str) -> bool {
        let Some(token) = self
            .inner
            .with_entry(id, |entry| entry.spec.domain.encode(&entry.value))
            .flatten()
        else {
            return false;
        };
        match self.inner.links.write(id, &token) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(id, token = %token, error = %e, "link write failed; URL left unchanged");
                false
            }
        }
    }

    /// Fires an action parameter.
    pub fn trigger(&self, id: &str) -> Result<(), RegistryError> {
        let on_change = self
            .inner
            .with_entry(id, |entry| {
                if entry.spec.domain.kind() == ParamKind::Action {
                    Ok(Rc::clone(&entry.on_change))
                } else {
                    Err(RegistryError::NotAction(id.to_string()))
                }
            })
            .ok_or_else(|| RegistryError::Unknown(id.to_string()))??;
        on_change(&ParamValue::Trigger, false);
        Ok(())
    }

    /// Attaches the GUI control for `id` and shows the live value on it.
    pub fn bind_control(
        &self,
        id: &str,
        control: Rc<dyn ParamControl>,
    ) -> Result<(), RegistryError> {
        let value = self
            .inner
            .with_entry(id, |entry| {
                entry.control = Rc::clone(&control);
                entry.value.clone()
            })
            .ok_or_else(|| RegistryError::Unknown(id.to_string()))?;
        if value != ParamValue::Trigger {
            control.show(&value);
        }
        Ok(())
    }

    /// Live value of `id`. For ids nobody registered yet, falls back to a
    /// best-effort read of the link.
    pub fn current_value(&self, id: &str) -> Option<ParamValue> {
        let live = self.inner.with_entry(id, |entry| match entry.spec.domain {
            Domain::Action => None,
            _ => Some(entry.value.clone()),
        });
        match live {
            Some(value) => value,
            None => self
                .inner
                .links
                .read(id)
                .map(|token| ParamValue::guess(&token)),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.entries.borrow().iter().any(|e| e.spec.id == id)
    }

    pub fn spec(&self, id: &str) -> Option<ParamSpec> {
        self.inner.with_entry(id, |entry| entry.spec.clone())
    }

    /// Ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.inner
            .entries
            .borrow()
            .iter()
            .map(|e| e.spec.id.clone())
            .collect()
    }

    /// Every valued parameter, sorted by id.
    pub fn snapshot(&self) -> BTreeMap<String, ParamValue> {
        self.inner
            .entries
            .borrow()
            .iter()
            .filter(|e| e.spec.domain.kind() != ParamKind::Action)
            .map(|e| (e.spec.id.clone(), e.value.clone()))
            .collect()
    }

    /// Query string of the current link, suitable for sharing.
    pub fn share_query(&self) -> String {
        self.inner.links.query().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{ParameterRegistry, RegistryError};
    use crate::control::HeadlessControl;
    use crate::spec::ParamSpec;
    use crate::value::ParamValue;
    use link::{LinkError, LinkHandler, LinkStore, MemoryLinkStore, QueryString};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Calls = Rc<RefCell<Vec<(ParamValue, bool)>>>;

    fn recorder() -> (Calls, impl Fn(&ParamValue, bool) + 'static) {
        let calls: Calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        (calls, move |v: &ParamValue, initial: bool| {
            sink.borrow_mut().push((v.clone(), initial))
        })
    }

    fn setup(query: &str) -> (Rc<MemoryLinkStore>, ParameterRegistry) {
        let links = Rc::new(MemoryLinkStore::from_query(query));
        let registry = ParameterRegistry::new(links.clone());
        (links, registry)
    }

    fn count_spec() -> ParamSpec {
        ParamSpec::range("count", "Feature count", 1.0, 20000.0, 1.0, 10.0)
    }

    #[test]
    fn hydrates_from_link_and_fires_initial_once() {
        let (_links, registry) = setup("?count=500");
        let (calls, cb) = recorder();
        let initial = registry.register(count_spec(), cb).unwrap();
        assert_eq!(initial, Some(ParamValue::Number(500.0)));
        assert_eq!(*calls.borrow(), vec![(ParamValue::Number(500.0), true)]);
    }

    #[test]
    fn out_of_domain_token_yields_default() {
        let (links, registry) = setup("?count=50000");
        let (calls, cb) = recorder();
        let initial = registry.register(count_spec(), cb).unwrap();
        assert_eq!(initial, Some(ParamValue::Number(10.0)));
        assert_eq!(*calls.borrow(), vec![(ParamValue::Number(10.0), true)]);
        // The stale token is left alone until the user edits.
        assert_eq!(links.read("count"), Some("50000".to_string()));
    }

    #[test]
    fn malformed_token_yields_default() {
        let (_links, registry) = setup("?animate=maybe");
        let initial = registry
            .register(
                ParamSpec::toggle("animate", "Animate", "true", "false", true),
                |_, _| {},
            )
            .unwrap();
        assert_eq!(initial, Some(ParamValue::Bool(true)));
    }

    #[test]
    fn range_commits_only_the_final_value() {
        let (links, registry) = setup("?count=500");
        let (calls, cb) = recorder();
        registry.register(count_spec(), cb).unwrap();

        registry.edit("count", 600.0).unwrap();
        registry.edit("count", 700.0).unwrap();
        registry.edit("count", 750.0).unwrap();
        assert!(links.writes().is_empty());
        assert_eq!(registry.current_value("count"), Some(ParamValue::Number(750.0)));

        assert!(registry.finish_edit("count").unwrap());
        assert_eq!(links.writes(), vec![("count".to_string(), "750".to_string())]);
        assert_eq!(links.query().to_string(), "?count=750");
        assert_eq!(calls.borrow().last(), Some(&(ParamValue::Number(750.0), false)));

        // A second release without edits writes nothing.
        assert!(!registry.finish_edit("count").unwrap());
        assert_eq!(links.writes().len(), 1);
    }

    #[test]
    fn single_numeric_edit_fires_once() {
        let (links, registry) = setup("?count=500");
        let (calls, cb) = recorder();
        registry.register(count_spec(), cb).unwrap();
        registry.edit("count", 750.0).unwrap();
        registry.finish_edit("count").unwrap();
        assert_eq!(
            *calls.borrow(),
            vec![
                (ParamValue::Number(500.0), true),
                (ParamValue::Number(750.0), false)
            ]
        );
        assert_eq!(links.query().to_string(), "?count=750");
    }

    #[test]
    fn toggle_commits_immediately() {
        let (links, registry) = setup("");
        registry
            .register(
                ParamSpec::toggle("animate", "Animate", "on", "off", false),
                |_, _| {},
            )
            .unwrap();
        registry.edit("animate", true).unwrap();
        assert_eq!(links.read("animate"), Some("on".to_string()));
        registry.edit("animate", false).unwrap();
        assert_eq!(links.read("animate"), Some("off".to_string()));
    }

    #[test]
    fn choice_commits_immediately() {
        let (links, registry) = setup("?utm=x");
        registry
            .register(
                ParamSpec::choice(
                    "renderer",
                    "Renderer",
                    &[("Canvas", "canvas"), ("WebGL", "webgl")],
                    "canvas",
                ),
                |_, _| {},
            )
            .unwrap();
        registry.edit("renderer", "webgl").unwrap();
        assert_eq!(registry.share_query(), "?utm=x&renderer=webgl");
    }

    #[test]
    fn rejected_edits_change_nothing() {
        let (links, registry) = setup("");
        let (calls, cb) = recorder();
        registry.register(count_spec(), cb).unwrap();
        assert_eq!(
            registry.edit("count", 0.0),
            Err(RegistryError::OutOfDomain {
                id: "count".to_string(),
                value: ParamValue::Number(0.0)
            })
        );
        assert_eq!(
            registry.edit("nope", 1.0),
            Err(RegistryError::Unknown("nope".to_string()))
        );
        assert_eq!(calls.borrow().len(), 1);
        assert!(links.writes().is_empty());
    }

    #[test]
    fn navigation_updates_value_control_and_callback() {
        let (links, registry) = setup("?count=500");
        let (calls, cb) = recorder();
        let control = HeadlessControl::new();
        registry
            .register_with_control(count_spec(), Rc::new(control.clone()), cb)
            .unwrap();

        links.navigate("?count=42");
        assert_eq!(registry.current_value("count"), Some(ParamValue::Number(42.0)));
        assert_eq!(control.last(), Some(ParamValue::Number(42.0)));
        assert_eq!(calls.borrow().last(), Some(&(ParamValue::Number(42.0), false)));
        // Navigation never writes back.
        assert!(links.writes().is_empty());
    }

    #[test]
    fn navigation_with_same_or_bad_token_is_ignored() {
        let (links, registry) = setup("?count=500");
        let (calls, cb) = recorder();
        registry.register(count_spec(), cb).unwrap();

        links.navigate("?count=500&other=1");
        links.navigate("?count=999999");
        links.navigate("?count=abc");
        links.navigate("");
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(registry.current_value("count"), Some(ParamValue::Number(500.0)));
    }

    #[test]
    fn navigation_discards_pending_range_edit() {
        let (links, registry) = setup("?count=500");
        registry.register(count_spec(), |_, _| {}).unwrap();
        registry.edit("count", 600.0).unwrap();
        links.navigate("?count=20");
        assert!(!registry.finish_edit("count").unwrap());
        assert_eq!(registry.current_value("count"), Some(ParamValue::Number(20.0)));
        assert!(links.writes().is_empty());
    }

    #[test]
    fn callbacks_may_read_the_registry() {
        let (links, registry) = setup("?renderer=webgl");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let reader = registry.clone();
        registry
            .register(
                ParamSpec::choice(
                    "renderer",
                    "Renderer",
                    &[("Canvas", "canvas"), ("WebGL", "webgl")],
                    "canvas",
                ),
                move |_, _| sink.borrow_mut().push(reader.current_value("renderer")),
            )
            .unwrap();
        links.navigate("?renderer=canvas");
        assert_eq!(
            *seen.borrow(),
            vec![Some(ParamValue::from("webgl")), Some(ParamValue::from("canvas"))]
        );
    }

    #[test]
    fn unregistered_ids_fall_back_to_the_link() {
        let (_links, registry) = setup("?instrument=true&zoom=3&name=x");
        assert_eq!(registry.current_value("instrument"), Some(ParamValue::Bool(true)));
        assert_eq!(registry.current_value("zoom"), Some(ParamValue::Number(3.0)));
        assert_eq!(registry.current_value("name"), Some(ParamValue::from("x")));
        assert_eq!(registry.current_value("missing"), None);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (_links, registry) = setup("");
        registry.register(count_spec(), |_, _| {}).unwrap();
        assert_eq!(
            registry.register(count_spec(), |_, _| {}),
            Err(RegistryError::AlreadyRegistered("count".to_string()))
        );
        assert_eq!(registry.ids(), vec!["count".to_string()]);
    }

    #[test]
    fn invalid_default_is_rejected() {
        let (_links, registry) = setup("");
        let spec = count_spec().with_default(-5.0);
        assert!(matches!(
            registry.register(spec, |_, _| {}),
            Err(RegistryError::InvalidDefault(_))
        ));
        assert!(!registry.contains("count"));
    }

    #[test]
    fn actions_fire_on_trigger_only() {
        let (links, registry) = setup("?regenerate=1");
        let (calls, cb) = recorder();
        assert_eq!(
            registry.register(ParamSpec::action("regenerate", "Regenerate"), cb),
            Ok(None)
        );
        assert!(calls.borrow().is_empty());
        assert_eq!(links.subscriber_count(), 0);

        registry.trigger("regenerate").unwrap();
        assert_eq!(*calls.borrow(), vec![(ParamValue::Trigger, false)]);
        assert_eq!(
            registry.edit("regenerate", true),
            Err(RegistryError::NotValued("regenerate".to_string()))
        );
        assert_eq!(registry.current_value("regenerate"), None);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn trigger_on_valued_parameter_is_an_error() {
        let (_links, registry) = setup("");
        registry.register(count_spec(), |_, _| {}).unwrap();
        assert_eq!(
            registry.trigger("count"),
            Err(RegistryError::NotAction("count".to_string()))
        );
    }

    #[test]
    fn bind_control_shows_live_value() {
        let (_links, registry) = setup("?count=7");
        registry.register(count_spec(), |_, _| {}).unwrap();
        let control = HeadlessControl::new();
        registry.bind_control("count", Rc::new(control.clone())).unwrap();
        assert_eq!(control.history(), vec![ParamValue::Number(7.0)]);
    }

    #[test]
    fn snapshot_is_sorted_by_id() {
        let (_links, registry) = setup("");
        registry
            .register(
                ParamSpec::toggle("z", "Z", "1", "0", true),
                |_, _| {},
            )
            .unwrap();
        registry.register(count_spec(), |_, _| {}).unwrap();
        let keys: Vec<String> = registry.snapshot().into_keys().collect();
        assert_eq!(keys, vec!["count".to_string(), "z".to_string()]);
        assert_eq!(registry.ids(), vec!["z".to_string(), "count".to_string()]);
    }

    /// Link whose every write is refused, like a browser blocking
    /// `replaceState`.
    struct RefusingLink {
        query: QueryString,
    }

    impl LinkStore for RefusingLink {
        fn read(&self, id: &str) -> Option<String> {
            self.query.get(id).map(str::to_string)
        }

        fn write(&self, _id: &str, _token: &str) -> Result<(), LinkError> {
            Err(LinkError::Io("replaceState blocked".to_string()))
        }

        fn subscribe(&self, id: &str, _handler: LinkHandler) -> Option<String> {
            self.read(id)
        }

        fn query(&self) -> QueryString {
            self.query.clone()
        }
    }

    #[test]
    fn refused_link_write_keeps_the_edit() {
        let links = Rc::new(RefusingLink {
            query: QueryString::parse("?animate=off&count=500"),
        });
        let registry = ParameterRegistry::new(links.clone());
        let (toggles, on_toggle) = recorder();
        let (counts, on_count) = recorder();
        registry
            .register(ParamSpec::toggle("animate", "Animate", "on", "off", false), on_toggle)
            .unwrap();
        registry.register(count_spec(), on_count).unwrap();

        assert_eq!(registry.edit("animate", true), Ok(()));
        assert_eq!(registry.current_value("animate"), Some(ParamValue::Bool(true)));
        assert_eq!(toggles.borrow().last(), Some(&(ParamValue::Bool(true), false)));

        assert_eq!(registry.edit("count", 750.0), Ok(()));
        assert_eq!(registry.finish_edit("count"), Ok(false));
        assert_eq!(registry.current_value("count"), Some(ParamValue::Number(750.0)));
        assert_eq!(counts.borrow().last(), Some(&(ParamValue::Number(750.0), false)));

        assert_eq!(links.query().to_string(), "?animate=off&count=500");
    }
}
