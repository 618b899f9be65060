use renderer::{Backends, LayerBox, MapTarget, RenderLayer, RendererMode};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, WebGl2RenderingContext};

use crate::scene::{Geometry, SharedScene};
use crate::{console_log, wgpu};

/// Each backend draws into its own canvas inside the map container; a canvas
/// can only ever hand out one kind of context.
pub(crate) fn mount_canvas(target: &MapTarget, mode: RendererMode) -> Result<HtmlCanvasElement, JsValue> {
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| JsValue::from_str("document missing"))?;
    let container = document
        .get_element_by_id(&target.element_id)
        .ok_or_else(|| JsValue::from_str("map container missing"))?;
    let canvas = document
        .create_element("canvas")?
        .dyn_into::<HtmlCanvasElement>()?;
    canvas.set_id(&format!("{}-{mode}", target.element_id));
    canvas.set_width(target.width);
    canvas.set_height(target.height);
    container.append_child(&canvas)?;
    Ok(canvas)
}

pub(crate) fn unmount(canvas: &HtmlCanvasElement) {
    canvas.remove();
}

pub struct CanvasLayer {
    canvas: Option<HtmlCanvasElement>,
    ctx: Option<CanvasRenderingContext2d>,
    scene: SharedScene,
}

impl CanvasLayer {
    fn build(target: &MapTarget, scene: SharedScene) -> Result<Self, JsValue> {
        let canvas = mount_canvas(target, RendererMode::Canvas)?;
        let ctx = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("2d context unavailable"))?
            .dyn_into::<CanvasRenderingContext2d>()?;
        Ok(Self {
            canvas: Some(canvas),
            ctx: Some(ctx),
            scene,
        })
    }
}

impl RenderLayer for CanvasLayer {
    fn mode(&self) -> RendererMode {
        RendererMode::Canvas
    }

    fn render(&mut self, frame_index: u64) {
        let (Some(canvas), Some(ctx)) = (&self.canvas, &self.ctx) else {
            return;
        };
        let (w, h) = (f64::from(canvas.width()), f64::from(canvas.height()));
        ctx.clear_rect(0.0, 0.0, w, h);
        ctx.set_fill_style_str("#2b6cb0");
        ctx.set_stroke_style_str("#2b6cb0");

        let scene = self.scene.borrow();
        for [x, y] in scene.anchors(frame_index) {
            let (px, py) = (f64::from(x) * w, f64::from(y) * h);
            match scene.geometry {
                Geometry::Points => ctx.fill_rect(px - 1.0, py - 1.0, 2.0, 2.0),
                Geometry::Lines => {
                    ctx.begin_path();
                    ctx.move_to(px, py);
                    ctx.line_to(px + 8.0, py + 4.0);
                    ctx.stroke();
                }
                Geometry::Polygons => {
                    ctx.begin_path();
                    ctx.move_to(px, py);
                    ctx.line_to(px + 6.0, py);
                    ctx.line_to(px + 3.0, py + 6.0);
                    ctx.close_path();
                    ctx.fill();
                }
            }
        }
    }

    fn dispose(&mut self) {
        self.ctx = None;
        if let Some(canvas) = self.canvas.take() {
            unmount(&canvas);
        }
    }
}

pub struct WebGlLayer {
    canvas: Option<HtmlCanvasElement>,
    gl: Option<WebGl2RenderingContext>,
    scene: SharedScene,
}

impl WebGlLayer {
    fn build(target: &MapTarget, scene: SharedScene) -> Result<Self, JsValue> {
        let canvas = mount_canvas(target, RendererMode::WebGl)?;
        let gl = canvas
            .get_context("webgl2")?
            .ok_or_else(|| JsValue::from_str("webgl2 context unavailable"))?
            .dyn_into::<WebGl2RenderingContext>()?;
        Ok(Self {
            canvas: Some(canvas),
            gl: Some(gl),
            scene,
        })
    }
}

impl RenderLayer for WebGlLayer {
    fn mode(&self) -> RendererMode {
        RendererMode::WebGl
    }

    fn render(&mut self, frame_index: u64) {
        let Some(gl) = &self.gl else {
            return;
        };
        let scene = self.scene.borrow();
        let w = gl.drawing_buffer_width();
        let h = gl.drawing_buffer_height();
        gl.enable(WebGl2RenderingContext::SCISSOR_TEST);
        gl.scissor(0, 0, w, h);
        gl.clear_color(0.02, 0.03, 0.06, 1.0);
        gl.clear(WebGl2RenderingContext::COLOR_BUFFER_BIT);

        // Scissored clears stand in for real geometry.
        gl.clear_color(0.17, 0.42, 0.69, 1.0);
        let size = match scene.geometry {
            Geometry::Points => 2,
            Geometry::Lines => 4,
            Geometry::Polygons => 6,
        };
        for [x, y] in scene.anchors(frame_index) {
            gl.scissor((x * w as f32) as i32, (y * h as f32) as i32, size, size);
            gl.clear(WebGl2RenderingContext::COLOR_BUFFER_BIT);
        }
        gl.disable(WebGl2RenderingContext::SCISSOR_TEST);
    }

    fn dispose(&mut self) {
        self.gl = None;
        if let Some(canvas) = self.canvas.take() {
            unmount(&canvas);
        }
    }
}

/// Placeholder attached when a synchronous backend cannot even get a
/// context, so the map still holds exactly one layer.
struct InertLayer(RendererMode);

impl RenderLayer for InertLayer {
    fn mode(&self) -> RendererMode {
        self.0
    }

    fn render(&mut self, _frame_index: u64) {}
}

fn or_inert<L: RenderLayer + 'static>(mode: RendererMode, built: Result<L, JsValue>) -> LayerBox {
    match built {
        Ok(layer) => Box::new(layer),
        Err(e) => {
            console_log(&format!("{mode} backend unavailable: {e:?}"));
            Box::new(InertLayer(mode))
        }
    }
}

/// Canvas, WebGL and (when the browser build carries it) WebGPU builders for
/// the map container.
pub fn browser_backends(scene: SharedScene) -> Backends {
    let canvas_scene = scene.clone();
    let webgl_scene = scene.clone();
    let backends = Backends::new(
        move |target: &MapTarget| {
            or_inert(RendererMode::Canvas, CanvasLayer::build(target, canvas_scene.clone()))
        },
        move |target: &MapTarget| {
            or_inert(RendererMode::WebGl, WebGlLayer::build(target, webgl_scene.clone()))
        },
    );
    if !wgpu::AVAILABLE {
        return backends;
    }
    backends.with_webgpu(move |target: &MapTarget| wgpu::build_layer(target.clone(), scene.clone()))
}
