use std::cell::Cell;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};
use params::{ParamValue, ParameterRegistry};
use runtime::EventBus;
use serde::Serialize;

use crate::backends::{BackendError, Backends, LayerBox};
use crate::layer::{LayerStack, MapTarget};
use crate::mode::{RendererMode, SelectorState};

/// Hands a detached future to the host's executor.
pub type Spawner = Rc<dyn Fn(LocalBoxFuture<'static, ()>)>;

/// How one re-evaluation ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Settlement {
    Active {
        token: u64,
        mode: RendererMode,
        fell_back: bool,
    },
    /// A newer re-evaluation started before this one finished; nothing was
    /// attached.
    Superseded { token: u64 },
}

impl Settlement {
    pub fn token(&self) -> u64 {
        match self {
            Settlement::Active { token, .. } | Settlement::Superseded { token } => *token,
        }
    }
}

struct Shared {
    target: MapTarget,
    layers: LayerStack,
    backends: Backends,
    registry: ParameterRegistry,
    param_id: String,
    bus: EventBus,
    state: Cell<SelectorState>,
    generation: Cell<u64>,
}

/// Keeps exactly one backend attached to the map, following the renderer
/// parameter.
///
/// Every re-evaluation takes a fresh request token. An asynchronous WebGPU
/// construction that completes after a newer request has started is thrown
/// away.
#[derive(Clone)]
pub struct RendererSelector {
    shared: Rc<Shared>,
}

impl RendererSelector {
    pub fn new(
        target: MapTarget,
        layers: LayerStack,
        backends: Backends,
        registry: ParameterRegistry,
        param_id: impl Into<String>,
        bus: EventBus,
    ) -> Self {
        Self {
            shared: Rc::new(Shared {
                target,
                layers,
                backends,
                registry,
                param_id: param_id.into(),
                bus,
                state: Cell::new(SelectorState::Idle),
                generation: Cell::new(0),
            }),
        }
    }

    pub fn state(&self) -> SelectorState {
        self.shared.state.get()
    }

    pub fn active_mode(&self) -> Option<RendererMode> {
        self.state().active_mode()
    }

    /// Token of the most recent re-evaluation (0 before the first one).
    pub fn generation(&self) -> u64 {
        self.shared.generation.get()
    }

    pub fn layers(&self) -> LayerStack {
        self.shared.layers.clone()
    }

    pub fn requested_mode(&self) -> RendererMode {
        RendererMode::from_value(
            self.shared
                .registry
                .current_value(&self.shared.param_id)
                .as_ref(),
        )
    }

    /// Recomputes which backend should be active and swaps it in.
    ///
    /// Teardown, the mode lookup and the canvas/WebGL paths run before this
    /// returns; the future only has work left to do for WebGPU.
    pub fn reevaluate(&self) -> LocalBoxFuture<'static, Settlement> {
        let token = self.shared.generation.get() + 1;
        self.shared.generation.set(token);

        let removed = self.shared.layers.clear();
        let requested = self.requested_mode();
        tracing::debug!(token, %requested, removed, "renderer re-evaluation");

        if requested == RendererMode::WebGpu {
            if let Some(build) = &self.shared.backends.webgpu {
                self.shared.state.set(SelectorState::WebGpuPending);
                let pending = build(&self.shared.target);
                let this = self.clone();
                return async move {
                    let result = pending.await;
                    this.complete_webgpu(token, result)
                }
                .boxed_local();
            }
            tracing::debug!(token, "no webgpu builder; using canvas");
        }

        let mode = match requested {
            RendererMode::WebGl => RendererMode::WebGl,
            _ => RendererMode::Canvas,
        };
        future::ready(self.settle(token, mode, false)).boxed_local()
    }

    /// Callback for the renderer parameter: every change, the initial one
    /// included, starts a re-evaluation on `spawn`.
    ///
    /// The callback only holds the selector weakly; once every selector
    /// handle is dropped it does nothing.
    pub fn on_param_change(&self, spawn: Spawner) -> impl Fn(&ParamValue, bool) + 'static {
        let weak: Weak<Shared> = Rc::downgrade(&self.shared);
        move |_value: &ParamValue, _initial: bool| {
            if let Some(shared) = weak.upgrade() {
                let pending = RendererSelector { shared }.reevaluate();
                spawn(pending.map(|_| ()).boxed_local());
            }
        }
    }

    fn is_current(&self, token: u64) -> bool {
        self.shared.generation.get() == token
    }

    fn complete_webgpu(&self, token: u64, result: Result<LayerBox, BackendError>) -> Settlement {
        if !self.is_current(token) {
            if let Ok(mut layer) = result {
                layer.dispose();
            }
            tracing::debug!(token, latest = self.generation(), "stale webgpu completion dropped");
            self.shared.bus.emit(
                "renderer.superseded",
                format!("webgpu request #{token} superseded"),
            );
            return Settlement::Superseded { token };
        }

        match result {
            Ok(layer) => {
                self.shared.layers.clear();
                self.shared.layers.attach(layer);
                self.shared.state.set(SelectorState::WebGpuActive);
                self.announce(RendererMode::WebGpu, false);
                Settlement::Active {
                    token,
                    mode: RendererMode::WebGpu,
                    fell_back: false,
                }
            }
            Err(err) => {
                tracing::warn!(token, "webgpu unavailable, falling back to webgl: {err}");
                self.shared
                    .bus
                    .emit("renderer.fallback", format!("webgpu failed: {err}"));
                self.settle(token, RendererMode::WebGl, true)
            }
        }
    }

    fn settle(&self, token: u64, mode: RendererMode, fell_back: bool) -> Settlement {
        let shared = &self.shared;
        shared.layers.clear();
        let layer = match mode {
            RendererMode::WebGl => (shared.backends.webgl)(&shared.target),
            _ => (shared.backends.canvas)(&shared.target),
        };
        shared.layers.attach(layer);
        shared.state.set(match (mode, fell_back) {
            (RendererMode::WebGl, true) => SelectorState::WebGlFallback,
            (RendererMode::WebGl, false) => SelectorState::WebGl,
            _ => SelectorState::Canvas,
        });
        self.announce(mode, fell_back);
        Settlement::Active {
            token,
            mode,
            fell_back,
        }
    }

    fn announce(&self, mode: RendererMode, fell_back: bool) {
        let message = if fell_back {
            format!("{mode} renderer active (fallback from webgpu)")
        } else {
            format!("{mode} renderer active")
        };
        tracing::info!("{message}");
        self.shared.bus.emit("renderer.active", message);
    }
}
