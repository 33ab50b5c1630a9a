//! State shared by every object of one device.
//!
//! The native scene, the render session and output driver, the commit
//! queue and the change stamps all live here. Objects never reach this
//! through globals; the store hands a [`FinalizeContext`] to each finalize.

use std::sync::Arc;

use anari_cycles_core::math::Vec3;
use anari_cycles_core::timestamp::{Clock, TimeStamp};
use parking_lot::RwLock;

use crate::commit_buffer::CommitBuffer;
use crate::config::DeviceConfig;
use crate::error::{DeviceError, NativeError};
use crate::native::DeviceInfo;
use crate::native::scene::{NativeScene, PassType};
use crate::native::session::{BufferParams, Session, SessionParams};
use crate::native::shader_graph::{NodeKind, ShaderGraph, SocketValue};
use crate::output_driver::FrameOutputDriver;

/// Device-wide change stamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeStamps {
    /// Last change to what the world instantiates (topology or transforms).
    pub last_scene_change: TimeStamp,
    /// Last time a frame restarted sample accumulation.
    pub last_accumulation_reset: TimeStamp,
}

pub struct DeviceState {
    pub scene: Arc<RwLock<NativeScene>>,
    pub clock: Clock,
    pub stamps: ChangeStamps,
    pub commit_buffer: CommitBuffer,
    pub session: Session,
    pub output_driver: Arc<FrameOutputDriver>,
    pub buffer_params: BufferParams,
    /// Samples requested from the session since the last reset.
    pub session_samples: u32,
    pub device_info: DeviceInfo,
}

impl DeviceState {
    /// Selects a compute device and prepares the native scene.
    pub fn new(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let devices = config
            .native_devices
            .clone()
            .unwrap_or_else(crate::native::available_devices);
        for device in &devices {
            log::info!(
                "Found Cycles Device: {:<7}| {}",
                device.device_type.as_str(),
                device.description
            );
        }
        let device_info = config.select_device().ok_or(DeviceError::NoComputeDevice)?;
        log::info!("Using Cycles Device '{}'", device_info.device_type.as_str());

        let scene = Arc::new(RwLock::new(NativeScene::new()));
        install_defaults(&mut scene.write())?;

        let params = SessionParams {
            device: device_info.clone(),
            tile_size: config.tile_size,
            use_auto_tile: config.use_auto_tile,
            samples: config.default_samples,
        };
        let mut session = Session::new(params, Arc::clone(&scene));
        let output_driver = Arc::new(FrameOutputDriver::new());
        session.set_output_driver(output_driver.clone());

        Ok(Self {
            scene,
            clock: Clock::new(),
            stamps: ChangeStamps::default(),
            commit_buffer: CommitBuffer::new(),
            session,
            output_driver,
            buffer_params: BufferParams::default(),
            session_samples: 0,
            device_info,
        })
    }

    /// Blocks until the in-flight render, if any, has delivered its result.
    pub fn wait_on_current_frame(&self) {
        self.output_driver.wait();
    }
}

/// Passes, integrator settings and the two default shaders.
fn install_defaults(scene: &mut NativeScene) -> Result<(), NativeError> {
    // Adaptive sampling could stop before the requested sample and the
    // frame would never be signalled complete.
    scene.integrator.use_adaptive_sampling = false;
    scene.add_pass("combined", PassType::Combined);
    scene.add_pass("depth", PassType::Depth);

    let mut background = ShaderGraph::new();
    let mix = background.add(NodeKind::MixClosure);
    let light_path = background.add(NodeKind::LightPath);
    let bg = background.add(NodeKind::Background);
    let ambient = background.add(NodeKind::Background);
    background.connect(ambient.output("Background"), mix.input("Closure1"))?;
    background.connect(bg.output("Background"), mix.input("Closure2"))?;
    background.connect(light_path.output("Is Camera Ray"), mix.input("Fac"))?;
    background.connect(mix.output("Closure"), background.output().input("Surface"))?;
    let id = scene.default_background();
    scene.set_shader_graph(id, background)?;
    scene.set_background_shader(None);

    let mut light = ShaderGraph::new();
    let emission = light.add(NodeKind::Emission);
    light.set(emission.input("Color"), SocketValue::Color(Vec3::repeat(1.0)))?;
    light.set(emission.input("Strength"), SocketValue::Float(4.0))?;
    light.connect(emission.output("Emission"), light.output().input("Surface"))?;
    let id = scene.default_light();
    scene.set_shader_graph(id, light)?;
    Ok(())
}

/// What an object may touch while it finalizes.
pub struct FinalizeContext<'a> {
    pub scene: &'a mut NativeScene,
    pub clock: &'a mut Clock,
    pub stamps: &'a mut ChangeStamps,
}

impl FinalizeContext<'_> {
    /// Records a change the next frame must resynchronize the world for.
    pub fn mark_scene_changed(&mut self) {
        self.stamps.last_scene_change = self.clock.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::DeviceType;

    #[test]
    fn test_defaults_installed() {
        let state = DeviceState::new(&DeviceConfig::new()).unwrap();
        let scene = state.scene.read();
        assert_eq!(scene.passes().len(), 2);
        assert!(!scene.integrator.use_adaptive_sampling);
        let bg = scene.shader(scene.default_background()).unwrap();
        assert_eq!(bg.graph().node_count(), 5);
        let light = scene.shader(scene.default_light()).unwrap();
        assert_eq!(light.graph().link_count(), 1);
        assert!(state.output_driver.ready());
    }

    #[test]
    fn test_no_device() {
        let config = DeviceConfig::new().with_native_devices(Vec::new());
        assert!(matches!(
            DeviceState::new(&config),
            Err(DeviceError::NoComputeDevice)
        ));
    }

    #[test]
    fn test_selected_device_recorded() {
        let config = DeviceConfig::new().with_native_devices(vec![DeviceInfo {
            device_type: DeviceType::Cpu,
            description: "test cpu".to_string(),
        }]);
        let state = DeviceState::new(&config).unwrap();
        assert_eq!(state.device_info.device_type, DeviceType::Cpu);
    }

    #[test]
    fn test_scene_change_stamp() {
        let mut scene = NativeScene::new();
        let mut clock = Clock::new();
        let mut stamps = ChangeStamps::default();
        let mut ctx = FinalizeContext {
            scene: &mut scene,
            clock: &mut clock,
            stamps: &mut stamps,
        };
        ctx.mark_scene_changed();
        ctx.mark_scene_changed();
        assert_eq!(stamps.last_scene_change, 2);
    }
}
