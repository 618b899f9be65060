//! Browser harness: binds the URL, the JS control panel and the map backends
//! to the parameter registry and the renderer selector.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use console_error_panic_hook::set_once;
use futures::future::LocalBoxFuture;
use link::BrowserLinkStore;
use params::{HarnessConfig, ParamControl, ParamValue, ParameterRegistry};
use renderer::{
    Instrumentation, LayerStack, MapTarget, RendererMode, RendererSelector, Spawner, ToggleAction,
};
use runtime::{EventBus, Metrics};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

mod backends;
mod scene;
mod wgpu;

use scene::{Scene, SharedScene};

const DEFAULT_CONFIG: &str = include_str!("../harness.json");

pub(crate) fn console_log(msg: &str) {
    web_sys::console::log_1(&JsValue::from_str(msg));
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

#[derive(Clone)]
struct App {
    registry: ParameterRegistry,
    selector: RendererSelector,
    instrumentation: Rc<Instrumentation>,
    frame_index: Rc<Cell<u64>>,
}

thread_local! {
    static APP: RefCell<Option<App>> = const { RefCell::new(None) };
}

/// Clones the handles out so no borrow of `APP` is held while registry
/// callbacks run.
fn app() -> Result<App, JsValue> {
    APP.with(|app| app.borrow().clone())
        .ok_or_else(|| JsValue::from_str("harness not booted"))
}

/// Panel widget implemented in JS; receives every value the registry wants
/// displayed.
struct JsControl {
    show: js_sys::Function,
}

impl ParamControl for JsControl {
    fn show(&self, value: &ParamValue) {
        let arg = match value {
            ParamValue::Bool(b) => JsValue::from_bool(*b),
            ParamValue::Number(n) => JsValue::from_f64(*n),
            ParamValue::Text(t) => JsValue::from_str(t),
            ParamValue::Trigger => JsValue::UNDEFINED,
        };
        if let Err(e) = self.show.call1(&JsValue::NULL, &arg) {
            console_log(&format!("control update failed: {e:?}"));
        }
    }
}

fn value_from_js(value: &JsValue) -> Result<ParamValue, JsValue> {
    if let Some(b) = value.as_bool() {
        Ok(ParamValue::Bool(b))
    } else if let Some(n) = value.as_f64() {
        Ok(ParamValue::Number(n))
    } else if let Some(s) = value.as_string() {
        Ok(ParamValue::Text(s))
    } else {
        Err(JsValue::from_str("expected a boolean, number or string"))
    }
}

fn reload_page() {
    // Deferred so the pending URL write lands before the page goes away.
    spawn_local(async {
        match web_sys::window().map(|w| w.location().reload()) {
            Some(Ok(())) => {}
            Some(Err(e)) => console_log(&format!("reload failed: {e:?}")),
            None => console_log("reload failed: window missing"),
        }
    });
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    set_once();
    Ok(())
}

/// Builds the harness inside the element `map_id`. `config_json` overrides
/// the embedded panel description when given.
#[wasm_bindgen]
pub fn boot(map_id: &str, width: u32, height: u32, config_json: Option<String>) -> Result<(), JsValue> {
    let config = HarnessConfig::from_json(config_json.as_deref().unwrap_or(DEFAULT_CONFIG))
        .map_err(js_err)?;
    let links = Rc::new(BrowserLinkStore::new().map_err(js_err)?);
    let registry = ParameterRegistry::new(links);

    let bus = EventBus::new();
    let debug = Rc::new(Cell::new(
        registry
            .current_value(&config.debug_param)
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    ));
    let forward = Rc::clone(&debug);
    bus.listen(move |event| {
        if forward.get() {
            console_log(&format!("[{}] {}", event.kind, event.message));
        }
    });

    let scene: SharedScene = Rc::new(RefCell::new(Scene::default()));
    let mut backends = backends::browser_backends(Rc::clone(&scene));

    // Hooks go in before the selector exists, so no backend is built unwrapped.
    let instrumentation = Rc::new(Instrumentation::new(Metrics::shared()));
    let instrument_on = registry
        .current_value(&config.instrument_param)
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if instrument_on {
        let mode = RendererMode::from_value(registry.current_value(&config.renderer_param).as_ref());
        backends = instrumentation.activate(mode, backends).map_err(js_err)?;
        bus.emit("instrument.active", format!("instrumenting {mode}"));
    }

    let selector = RendererSelector::new(
        MapTarget::new(map_id, width, height),
        LayerStack::new(),
        backends,
        registry.clone(),
        config.renderer_param.clone(),
        bus.clone(),
    );

    for spec in config.params {
        let id = spec.id.clone();
        let registered = if id == config.renderer_param {
            let spawn: Spawner = Rc::new(|fut: LocalBoxFuture<'static, ()>| spawn_local(fut));
            registry.register(spec, selector.on_param_change(spawn))
        } else if id == config.debug_param {
            let debug = Rc::clone(&debug);
            registry.register(spec, move |v, _| debug.set(v.as_bool().unwrap_or(false)))
        } else if id == config.instrument_param {
            registry.register(spec, |v, initial| {
                let enabled = v.as_bool().unwrap_or(false);
                if Instrumentation::on_toggle(enabled, initial) == ToggleAction::Reload {
                    reload_page();
                }
            })
        } else {
            let scene = Rc::clone(&scene);
            registry.register(spec, move |v, _| {
                scene.borrow_mut().apply(&id, v);
            })
        };
        registered.map_err(js_err)?;
    }

    APP.with(|app| {
        *app.borrow_mut() = Some(App {
            registry,
            selector,
            instrumentation,
            frame_index: Rc::new(Cell::new(0)),
        });
    });
    Ok(())
}

/// A widget changed; ranges stay pending until `harness_finish_edit`.
#[wasm_bindgen]
pub fn harness_edit(id: &str, value: JsValue) -> Result<(), JsValue> {
    let value = value_from_js(&value)?;
    app()?.registry.edit(id, value).map_err(js_err)
}

/// The user let go of a widget. Returns whether the URL was written.
#[wasm_bindgen]
pub fn harness_finish_edit(id: &str) -> Result<bool, JsValue> {
    app()?.registry.finish_edit(id).map_err(js_err)
}

#[wasm_bindgen]
pub fn harness_trigger(id: &str) -> Result<(), JsValue> {
    app()?.registry.trigger(id).map_err(js_err)
}

#[wasm_bindgen]
pub fn harness_bind_control(id: &str, show: js_sys::Function) -> Result<(), JsValue> {
    app()?
        .registry
        .bind_control(id, Rc::new(JsControl { show }))
        .map_err(js_err)
}

#[wasm_bindgen]
pub fn harness_value(id: &str) -> Result<JsValue, JsValue> {
    let value = app()?.registry.current_value(id);
    Ok(match value {
        Some(ParamValue::Bool(b)) => JsValue::from_bool(b),
        Some(ParamValue::Number(n)) => JsValue::from_f64(n),
        Some(ParamValue::Text(t)) => JsValue::from_str(&t),
        Some(ParamValue::Trigger) | None => JsValue::NULL,
    })
}

/// Parameter declarations as JSON, for building the panel.
#[wasm_bindgen]
pub fn harness_specs() -> Result<String, JsValue> {
    let app = app()?;
    let specs: Vec<_> = app
        .registry
        .ids()
        .iter()
        .filter_map(|id| app.registry.spec(id))
        .collect();
    serde_json::to_string(&specs).map_err(js_err)
}

#[wasm_bindgen]
pub fn harness_share_query() -> Result<String, JsValue> {
    Ok(app()?.registry.share_query())
}

#[wasm_bindgen]
pub fn renderer_state() -> Result<String, JsValue> {
    let app = app()?;
    serde_json::to_string(&app.selector.state()).map_err(js_err)
}

#[wasm_bindgen]
pub fn instrument_report() -> Result<String, JsValue> {
    serde_json::to_string(&app()?.instrumentation.report()).map_err(js_err)
}

/// Draws one frame on the active backend. Driven from `requestAnimationFrame`.
#[wasm_bindgen]
pub fn advance_frame() -> Result<u64, JsValue> {
    let app = app()?;
    let i = app.frame_index.get();
    app.selector.layers().render_frame(i);
    app.frame_index.set(i.wrapping_add(1));
    Ok(i)
}
