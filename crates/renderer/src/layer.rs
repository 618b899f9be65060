use std::cell::RefCell;
use std::rc::Rc;

use crate::mode::RendererMode;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LayerId(pub u64);

/// A rendering layer produced by a backend builder.
pub trait RenderLayer {
    fn mode(&self) -> RendererMode;

    /// Draws one frame.
    fn render(&mut self, frame_index: u64);

    /// Releases backend resources. Called once, when the layer is removed.
    fn dispose(&mut self) {}
}

/// What a builder is allowed to know about the map it renders into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapTarget {
    pub element_id: String,
    pub width: u32,
    pub height: u32,
}

impl MapTarget {
    pub fn new(element_id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            element_id: element_id.into(),
            width,
            height,
        }
    }
}

#[derive(Default)]
struct StackState {
    next_id: u64,
    layers: Vec<(LayerId, Box<dyn RenderLayer>)>,
}

/// The map's rendering layer collection.
///
/// Everyone may read it and drive frames; only the renderer selector inside
/// this crate attaches and clears layers.
#[derive(Clone, Default)]
pub struct LayerStack {
    state: Rc<RefCell<StackState>>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and disposes every layer; returns how many were removed.
    pub(crate) fn clear(&self) -> usize {
        let removed = std::mem::take(&mut self.state.borrow_mut().layers);
        let n = removed.len();
        for (_, mut layer) in removed {
            layer.dispose();
        }
        n
    }

    pub(crate) fn attach(&self, layer: Box<dyn RenderLayer>) -> LayerId {
        let mut state = self.state.borrow_mut();
        let id = LayerId(state.next_id);
        state.next_id += 1;
        state.layers.push((id, layer));
        id
    }

    pub fn len(&self) -> usize {
        self.state.borrow().layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_of(&self, mode: RendererMode) -> usize {
        self.state
            .borrow()
            .layers
            .iter()
            .filter(|(_, l)| l.mode() == mode)
            .count()
    }

    pub fn ids(&self) -> Vec<LayerId> {
        self.state.borrow().layers.iter().map(|(id, _)| *id).collect()
    }

    pub fn render_frame(&self, frame_index: u64) {
        for (_, layer) in self.state.borrow_mut().layers.iter_mut() {
            layer.render(frame_index);
        }
    }
}

impl std::fmt::Debug for LayerStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerStack")
            .field("ids", &self.ids())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{LayerId, LayerStack, RenderLayer};
    use crate::mode::RendererMode;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Layer that logs its lifecycle into a shared journal.
    pub(crate) struct RecordingLayer {
        pub mode: RendererMode,
        pub journal: Rc<RefCell<Vec<String>>>,
    }

    impl RenderLayer for RecordingLayer {
        fn mode(&self) -> RendererMode {
            self.mode
        }

        fn render(&mut self, frame_index: u64) {
            self.journal
                .borrow_mut()
                .push(format!("render {} {frame_index}", self.mode));
        }

        fn dispose(&mut self) {
            self.journal.borrow_mut().push(format!("dispose {}", self.mode));
        }
    }

    #[test]
    fn clear_disposes_everything_and_is_idempotent() {
        let journal = Rc::new(RefCell::new(Vec::new()));
        let stack = LayerStack::new();
        stack.attach(Box::new(RecordingLayer {
            mode: RendererMode::Canvas,
            journal: Rc::clone(&journal),
        }));
        assert_eq!(stack.clear(), 1);
        assert_eq!(stack.clear(), 0);
        assert!(stack.is_empty());
        assert_eq!(*journal.borrow(), vec!["dispose canvas".to_string()]);
    }

    #[test]
    fn ids_are_never_reused() {
        let journal = Rc::new(RefCell::new(Vec::new()));
        let stack = LayerStack::new();
        let a = stack.attach(Box::new(RecordingLayer {
            mode: RendererMode::WebGl,
            journal: Rc::clone(&journal),
        }));
        stack.clear();
        let b = stack.attach(Box::new(RecordingLayer {
            mode: RendererMode::WebGl,
            journal,
        }));
        assert_eq!((a, b), (LayerId(0), LayerId(1)));
        assert_eq!(stack.count_of(RendererMode::WebGl), 1);
    }

    #[test]
    fn render_frame_reaches_every_layer() {
        let journal = Rc::new(RefCell::new(Vec::new()));
        let stack = LayerStack::new();
        stack.attach(Box::new(RecordingLayer {
            mode: RendererMode::WebGpu,
            journal: Rc::clone(&journal),
        }));
        stack.render_frame(3);
        assert_eq!(*journal.borrow(), vec!["render webgpu 3".to_string()]);
    }
}
