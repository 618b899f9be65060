use std::cell::RefCell;
use std::rc::Rc;

use crate::value::ParamValue;

/// Handle to the GUI widget bound to a parameter.
///
/// The registry only ever pushes values into it; user edits travel the other
/// way through [`crate::ParameterRegistry::edit`].
pub trait ParamControl {
    fn show(&self, value: &ParamValue);
}

/// Control used when no widget is attached. Clones share the same history.
#[derive(Debug, Default, Clone)]
pub struct HeadlessControl {
    shown: Rc<RefCell<Vec<ParamValue>>>,
}

impl HeadlessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<ParamValue> {
        self.shown.borrow().last().cloned()
    }

    pub fn history(&self) -> Vec<ParamValue> {
        self.shown.borrow().clone()
    }
}

impl ParamControl for HeadlessControl {
    fn show(&self, value: &ParamValue) {
        self.shown.borrow_mut().push(value.clone());
    }
}
