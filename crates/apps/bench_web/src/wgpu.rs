#[cfg(target_arch = "wasm32")]
mod imp {
    use std::cell::OnceCell;

    use renderer::{BackendError, LayerBox, MapTarget, RenderLayer, RendererMode};

    use crate::backends::{mount_canvas, unmount};
    use crate::scene::SharedScene;

    pub const AVAILABLE: bool = true;

    thread_local! {
        static INSTANCE: OnceCell<&'static ::wgpu::Instance> = const { OnceCell::new() };
    }

    // `wgpu::Surface` must not outlive its `wgpu::Instance`, so one instance
    // is leaked for the lifetime of the page and shared by every attempt.
    fn instance() -> &'static ::wgpu::Instance {
        INSTANCE.with(|cell| {
            *cell.get_or_init(|| {
                Box::leak(Box::new(::wgpu::Instance::new(&::wgpu::InstanceDescriptor {
                    backends: ::wgpu::Backends::BROWSER_WEBGPU,
                    ..Default::default()
                })))
            })
        })
    }

    pub struct WebGpuLayer {
        surface: ::wgpu::Surface<'static>,
        device: ::wgpu::Device,
        queue: ::wgpu::Queue,
        canvas: Option<web_sys::HtmlCanvasElement>,
        scene: SharedScene,
    }

    pub async fn build_layer(target: MapTarget, scene: SharedScene) -> Result<LayerBox, BackendError> {
        let canvas = mount_canvas(&target, RendererMode::WebGpu)
            .map_err(|e| BackendError::Init(format!("canvas mount failed: {e:?}")))?;
        match init(&canvas, &target).await {
            Ok((surface, device, queue)) => Ok(Box::new(WebGpuLayer {
                surface,
                device,
                queue,
                canvas: Some(canvas),
                scene,
            })),
            Err(e) => {
                unmount(&canvas);
                Err(e)
            }
        }
    }

    async fn init(
        canvas: &web_sys::HtmlCanvasElement,
        target: &MapTarget,
    ) -> Result<(::wgpu::Surface<'static>, ::wgpu::Device, ::wgpu::Queue), BackendError> {
        let instance = instance();
        let surface = instance
            .create_surface(::wgpu::SurfaceTarget::Canvas(canvas.clone()))
            .map_err(|e| BackendError::Unsupported(format!("surface error: {e}")))?;

        let adapter = instance
            .request_adapter(&::wgpu::RequestAdapterOptions {
                power_preference: ::wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| BackendError::Unsupported(format!("adapter error: {e}")))?;

        let (device, queue) = adapter
            .request_device(&::wgpu::DeviceDescriptor {
                label: Some("bench-webgpu-device"),
                required_features: ::wgpu::Features::empty(),
                required_limits: ::wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .map_err(|e| BackendError::Init(format!("device error: {e}")))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| BackendError::Unsupported("surface reports no formats".to_string()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(::wgpu::CompositeAlphaMode::Auto);

        surface.configure(
            &device,
            &::wgpu::SurfaceConfiguration {
                usage: ::wgpu::TextureUsages::RENDER_ATTACHMENT,
                format,
                width: target.width.max(1),
                height: target.height.max(1),
                desired_maximum_frame_latency: 2,
                present_mode: ::wgpu::PresentMode::Fifo,
                alpha_mode,
                view_formats: vec![],
            },
        );
        Ok((surface, device, queue))
    }

    impl RenderLayer for WebGpuLayer {
        fn mode(&self) -> RendererMode {
            RendererMode::WebGpu
        }

        fn render(&mut self, frame_index: u64) {
            let frame = match self.surface.get_current_texture() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("surface acquire failed: {e}");
                    return;
                }
            };
            let view = frame
                .texture
                .create_view(&::wgpu::TextureViewDescriptor::default());

            // Shade follows feature density until real pipelines land here.
            let scene = self.scene.borrow();
            let density = f64::from(scene.count.min(20_000)) / 20_000.0;
            let pulse = if scene.animate {
                ((frame_index % 120) as f64 / 120.0) * 0.05
            } else {
                0.0
            };

            let mut encoder = self
                .device
                .create_command_encoder(&::wgpu::CommandEncoderDescriptor {
                    label: Some("bench-webgpu-encoder"),
                });
            {
                let _rpass = encoder.begin_render_pass(&::wgpu::RenderPassDescriptor {
                    label: Some("bench-webgpu-clear"),
                    color_attachments: &[Some(::wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        depth_slice: None,
                        ops: ::wgpu::Operations {
                            load: ::wgpu::LoadOp::Clear(::wgpu::Color {
                                r: 0.02 + pulse,
                                g: 0.03 + 0.4 * density,
                                b: 0.06 + 0.6 * density,
                                a: 1.0,
                            }),
                            store: ::wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                    multiview_mask: None,
                });
            }
            self.queue.submit(std::iter::once(encoder.finish()));
            frame.present();
        }

        fn dispose(&mut self) {
            if let Some(canvas) = self.canvas.take() {
                unmount(&canvas);
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod imp {
    use renderer::{BackendError, LayerBox, MapTarget};

    use crate::scene::SharedScene;

    pub const AVAILABLE: bool = false;

    pub async fn build_layer(_target: MapTarget, _scene: SharedScene) -> Result<LayerBox, BackendError> {
        Err(BackendError::Unsupported(
            "webgpu is only available on wasm32 targets".to_string(),
        ))
    }
}

pub use imp::{AVAILABLE, build_layer};
