use std::future::Future;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::layer::{MapTarget, RenderLayer};

pub type LayerBox = Box<dyn RenderLayer>;

/// Builder that cannot fail and finishes before returning.
pub type SyncBuilder = Rc<dyn Fn(&MapTarget) -> LayerBox>;

pub type AsyncBuilder =
    Rc<dyn Fn(&MapTarget) -> LocalBoxFuture<'static, Result<LayerBox, BackendError>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The platform lacks the capability (no adapter, no context).
    Unsupported(String),
    Init(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Unsupported(msg) => write!(f, "backend unsupported: {msg}"),
            BackendError::Init(msg) => write!(f, "backend init failed: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Builders supplied by the embedding application, resolved once at startup.
///
/// WebGPU is an optional capability: without it a WebGPU request lands on
/// canvas rather than WebGL.
#[derive(Clone)]
pub struct Backends {
    pub(crate) canvas: SyncBuilder,
    pub(crate) webgl: SyncBuilder,
    pub(crate) webgpu: Option<AsyncBuilder>,
}

impl Backends {
    pub fn new(
        canvas: impl Fn(&MapTarget) -> LayerBox + 'static,
        webgl: impl Fn(&MapTarget) -> LayerBox + 'static,
    ) -> Self {
        Self {
            canvas: Rc::new(canvas),
            webgl: Rc::new(webgl),
            webgpu: None,
        }
    }

    pub fn with_webgpu<F, Fut>(mut self, build: F) -> Self
    where
        F: Fn(&MapTarget) -> Fut + 'static,
        Fut: Future<Output = Result<LayerBox, BackendError>> + 'static,
    {
        self.webgpu = Some(Rc::new(move |target: &MapTarget| build(target).boxed_local()));
        self
    }

    pub fn has_webgpu(&self) -> bool {
        self.webgpu.is_some()
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("webgpu", &self.has_webgpu())
            .finish()
    }
}
