//! Headless drivers behind the `paramsync` binary.
//!
//! Everything here runs against an in-memory link store and simulated
//! backends, so harness configurations and renderer selection can be checked
//! without a browser.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::str::FromStr;

use futures::executor::LocalPool;
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use link::MemoryLinkStore;
use params::{HarnessConfig, ParamKind, ParamSpec, ParamValue, ParameterRegistry};
use renderer::{
    BackendError, Backends, LayerBox, LayerStack, MapTarget, RenderLayer, RendererMode,
    RendererSelector, SelectorState, Spawner,
};
use runtime::{Event, EventBus};
use serde::Serialize;

/// How the simulated WebGPU builder behaves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum WebGpuSim {
    Succeed,
    #[default]
    Fail,
    Absent,
}

impl FromStr for WebGpuSim {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(WebGpuSim::Succeed),
            "fail" => Ok(WebGpuSim::Fail),
            "absent" => Ok(WebGpuSim::Absent),
            other => Err(format!("unknown webgpu behavior {other:?} (ok|fail|absent)")),
        }
    }
}

/// Stand-in layer that only remembers what it is.
struct SimLayer {
    mode: RendererMode,
    frames: u64,
}

impl RenderLayer for SimLayer {
    fn mode(&self) -> RendererMode {
        self.mode
    }

    fn render(&mut self, _frame_index: u64) {
        self.frames += 1;
    }

    fn dispose(&mut self) {
        tracing::debug!(mode = %self.mode, frames = self.frames, "sim layer disposed");
    }
}

fn sim_layer(mode: RendererMode) -> LayerBox {
    Box::new(SimLayer { mode, frames: 0 })
}

pub fn simulated_backends(webgpu: WebGpuSim) -> Backends {
    let backends = Backends::new(
        |_: &MapTarget| sim_layer(RendererMode::Canvas),
        |_: &MapTarget| sim_layer(RendererMode::WebGl),
    );
    match webgpu {
        WebGpuSim::Absent => backends,
        WebGpuSim::Succeed => backends.with_webgpu(|_: &MapTarget| async {
            Ok::<_, BackendError>(sim_layer(RendererMode::WebGpu))
        }),
        WebGpuSim::Fail => backends.with_webgpu(|_: &MapTarget| async {
            Err::<LayerBox, _>(BackendError::Unsupported("simulated adapter failure".to_string()))
        }),
    }
}

fn registry_for(query: &str) -> (Rc<MemoryLinkStore>, ParameterRegistry) {
    let links = Rc::new(MemoryLinkStore::from_query(query));
    let registry = ParameterRegistry::new(links.clone());
    (links, registry)
}

fn register_all(registry: &ParameterRegistry, config: &HarnessConfig) -> Result<(), String> {
    for spec in &config.params {
        registry
            .register(spec.clone(), |_, _| {})
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Values every parameter of `config` takes when loaded with `query`.
pub fn resolve(
    config: &HarnessConfig,
    query: &str,
) -> Result<BTreeMap<String, ParamValue>, String> {
    let (_links, registry) = registry_for(query);
    register_all(&registry, config)?;
    Ok(registry.snapshot())
}

#[derive(Debug, Clone, Serialize)]
pub struct EditReport {
    pub query: String,
    pub writes: Vec<(String, String)>,
    pub values: BTreeMap<String, ParamValue>,
}

/// Splits `id=token`.
pub fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((id, token)) if !id.is_empty() => Ok((id.to_string(), token.to_string())),
        _ => Err(format!("expected id=value, got {raw:?}")),
    }
}

/// Applies each `(id, token)` as a complete widget interaction and reports
/// the resulting share query.
pub fn edit(
    config: &HarnessConfig,
    query: &str,
    assignments: &[(String, String)],
) -> Result<EditReport, String> {
    let (links, registry) = registry_for(query);
    register_all(&registry, config)?;

    for (id, token) in assignments {
        let spec: ParamSpec = registry
            .spec(id)
            .ok_or_else(|| format!("unknown parameter {id:?}"))?;
        if spec.domain.kind() == ParamKind::Action {
            registry.trigger(id).map_err(|e| e.to_string())?;
            continue;
        }
        let value = spec
            .domain
            .decode(token)
            .ok_or_else(|| format!("{token:?} is not a valid value for {id:?}"))?;
        registry.edit(id, value).map_err(|e| e.to_string())?;
        registry.finish_edit(id).map_err(|e| e.to_string())?;
    }

    Ok(EditReport {
        query: registry.share_query(),
        writes: links.writes(),
        values: registry.snapshot(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectReport {
    pub requested: RendererMode,
    pub state: SelectorState,
    pub active: Option<RendererMode>,
    pub generation: u64,
    pub layers: usize,
    pub events: Vec<Event>,
}

/// Registers the renderer parameter, lets the selector settle and reports
/// what ended up attached.
pub fn select(config: &HarnessConfig, query: &str, webgpu: WebGpuSim) -> Result<SelectReport, String> {
    let renderer_spec = config
        .param(&config.renderer_param)
        .cloned()
        .ok_or_else(|| format!("config has no {:?} parameter", config.renderer_param))?;

    let (_links, registry) = registry_for(query);
    let bus = EventBus::new();
    let selector = RendererSelector::new(
        MapTarget::new("map", 1024, 768),
        LayerStack::new(),
        simulated_backends(webgpu),
        registry.clone(),
        config.renderer_param.clone(),
        bus.clone(),
    );

    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let spawn: Spawner = Rc::new(move |fut: LocalBoxFuture<'static, ()>| {
        if let Err(e) = spawner.spawn_local(fut) {
            tracing::error!("spawn failed: {e}");
        }
    });
    registry
        .register(renderer_spec, selector.on_param_change(spawn))
        .map_err(|e| e.to_string())?;
    pool.run_until_stalled();

    Ok(SelectReport {
        requested: selector.requested_mode(),
        state: selector.state(),
        active: selector.active_mode(),
        generation: selector.generation(),
        layers: selector.layers().len(),
        events: bus.events(),
    })
}
