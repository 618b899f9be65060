use std::cell::Cell;
use std::rc::Rc;

use futures::FutureExt;
use runtime::{MetricsSnapshot, SharedMetrics};
use web_time::Instant;

use crate::backends::{AsyncBuilder, Backends, LayerBox, SyncBuilder};
use crate::layer::{MapTarget, RenderLayer};
use crate::mode::RendererMode;

const PREFIX: &str = "instrument.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrumentError {
    /// Hooks were already installed this session, for the given mode.
    AlreadyActive(RendererMode),
}

impl std::fmt::Display for InstrumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrumentError::AlreadyActive(mode) => {
                write!(f, "instrumentation already active for {mode}")
            }
        }
    }
}

impl std::error::Error for InstrumentError {}

/// What the host must do after the instrumentation flag changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ToggleAction {
    None,
    /// Hooks cannot be installed or removed live; reload the page.
    Reload,
}

/// One-shot measurement hooks around the backend builders.
///
/// Activation consumes the [`Backends`] before any selector exists, so every
/// layer of the instrumented mode is constructed through the hooks.
pub struct Instrumentation {
    metrics: SharedMetrics,
    active: Cell<Option<RendererMode>>,
}

impl Instrumentation {
    pub fn new(metrics: SharedMetrics) -> Self {
        Self {
            metrics,
            active: Cell::new(None),
        }
    }

    pub fn metrics(&self) -> SharedMetrics {
        Rc::clone(&self.metrics)
    }

    pub fn active_mode(&self) -> Option<RendererMode> {
        self.active.get()
    }

    /// Wraps the builder for `mode`; the other builders pass through.
    pub fn activate(
        &self,
        mode: RendererMode,
        mut backends: Backends,
    ) -> Result<Backends, InstrumentError> {
        if let Some(current) = self.active.get() {
            return Err(InstrumentError::AlreadyActive(current));
        }
        self.active.set(Some(mode));

        let metrics = Rc::clone(&self.metrics);
        match mode {
            RendererMode::Canvas => backends.canvas = wrap_sync(backends.canvas, metrics),
            RendererMode::WebGl => backends.webgl = wrap_sync(backends.webgl, metrics),
            RendererMode::WebGpu => match backends.webgpu.take() {
                Some(build) => backends.webgpu = Some(wrap_async(build, metrics)),
                None => tracing::debug!("no webgpu builder to instrument"),
            },
        }
        tracing::info!(%mode, "instrumentation hooks installed");
        Ok(backends)
    }

    /// Reaction to a change of the instrumentation flag. The initial value is
    /// honored by [`activate`](Self::activate) at startup; any later change
    /// needs a reload.
    pub fn on_toggle(enabled: bool, initial: bool) -> ToggleAction {
        if initial {
            ToggleAction::None
        } else {
            tracing::info!(enabled, "instrumentation toggled; reload required");
            ToggleAction::Reload
        }
    }

    pub fn report(&self) -> MetricsSnapshot {
        self.metrics.borrow().snapshot_prefixed(PREFIX)
    }
}

fn wrap_sync(build: SyncBuilder, metrics: SharedMetrics) -> SyncBuilder {
    Rc::new(move |target: &MapTarget| {
        InstrumentedLayer::wrap(build(target), Rc::clone(&metrics))
    })
}

fn wrap_async(build: AsyncBuilder, metrics: SharedMetrics) -> AsyncBuilder {
    Rc::new(move |target: &MapTarget| {
        let metrics = Rc::clone(&metrics);
        build(target)
            .map(move |built| built.map(|layer| InstrumentedLayer::wrap(layer, metrics)))
            .boxed_local()
    })
}

/// Layer decorator that records constructions, frames, frame time and
/// disposals.
pub struct InstrumentedLayer {
    inner: LayerBox,
    metrics: SharedMetrics,
    prefix: String,
}

impl InstrumentedLayer {
    pub fn wrap(inner: LayerBox, metrics: SharedMetrics) -> LayerBox {
        let prefix = format!("{PREFIX}{}", inner.mode());
        metrics
            .borrow_mut()
            .inc_counter(format!("{prefix}.constructed"), 1);
        Box::new(Self {
            inner,
            metrics,
            prefix,
        })
    }
}

impl RenderLayer for InstrumentedLayer {
    fn mode(&self) -> RendererMode {
        self.inner.mode()
    }

    fn render(&mut self, frame_index: u64) {
        let start = Instant::now();
        self.inner.render(frame_index);
        let micros = i64::try_from(start.elapsed().as_micros()).unwrap_or(i64::MAX);

        let mut metrics = self.metrics.borrow_mut();
        metrics.inc_counter(format!("{}.frames", self.prefix), 1);
        metrics.record_histogram(format!("{}.frame_us", self.prefix), micros);
    }

    fn dispose(&mut self) {
        self.inner.dispose();
        self.metrics
            .borrow_mut()
            .inc_counter(format!("{}.disposed", self.prefix), 1);
    }
}
