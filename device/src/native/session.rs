//! Render session: owns the accumulation film and the render thread.
//!
//! `start` renders up to the configured sample count on a background
//! thread and hands the result to the output driver. Only one render runs
//! at a time; every control call waits for the previous one first.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};

use super::DeviceInfo;
use super::kernel::{self, Film, PreparedScene};
use super::scene::{NativeScene, UpdateFlags};
use super::tile::OutputDriver;

/// Session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParams {
    pub device: DeviceInfo,
    pub tile_size: u32,
    pub use_auto_tile: bool,
    pub samples: u32,
}

/// Render buffer dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferParams {
    pub width: u32,
    pub height: u32,
    pub full_width: u32,
    pub full_height: u32,
}

impl BufferParams {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            full_width: width,
            full_height: height,
        }
    }
}

pub struct Session {
    params: SessionParams,
    scene: Arc<RwLock<NativeScene>>,
    driver: Option<Arc<dyn OutputDriver>>,
    buffer_params: BufferParams,
    film: Arc<Mutex<Film>>,
    prepared: Arc<PreparedScene>,
    samples: u32,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(params: SessionParams, scene: Arc<RwLock<NativeScene>>) -> Self {
        log::info!(
            "creating render session on {} ({}), tile size {}",
            params.device.device_type.as_str(),
            params.device.description,
            params.tile_size
        );
        let samples = params.samples;
        Self {
            params,
            scene,
            driver: None,
            buffer_params: BufferParams::default(),
            film: Arc::new(Mutex::new(Film::new(0, 0))),
            prepared: Arc::new(PreparedScene::default()),
            samples,
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn scene(&self) -> &Arc<RwLock<NativeScene>> {
        &self.scene
    }

    pub fn set_output_driver(&mut self, driver: Arc<dyn OutputDriver>) {
        self.wait();
        self.driver = Some(driver);
    }

    pub fn buffer_params(&self) -> BufferParams {
        self.buffer_params
    }

    /// Discards accumulated samples and resizes the film.
    pub fn reset(&mut self, buffer_params: BufferParams, samples: u32) {
        self.wait();
        self.buffer_params = buffer_params;
        self.samples = samples;
        *self.film.lock() = Film::new(buffer_params.width, buffer_params.height);
    }

    /// Sets the sample count the next `start` accumulates up to.
    pub fn set_samples(&mut self, samples: u32) {
        self.samples = samples;
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Samples currently held by the film.
    pub fn accumulated_samples(&self) -> u32 {
        self.film.lock().samples()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Launches the render thread.
    pub fn start(&mut self) {
        self.wait();
        let Some(driver) = self.driver.clone() else {
            log::warn!("render session started without an output driver");
            return;
        };

        {
            let mut scene = self.scene.write();
            let updates = scene.device_update();
            if updates.intersects(UpdateFlags::UPDATE_ALL) {
                self.prepared = Arc::new(PreparedScene::build(&scene));
            }
        }

        self.cancel.store(false, Ordering::Release);
        let scene = Arc::clone(&self.scene);
        let film = Arc::clone(&self.film);
        let prepared = Arc::clone(&self.prepared);
        let cancel = Arc::clone(&self.cancel);
        let target = self.samples;
        let worker_driver = Arc::clone(&driver);

        let spawned = std::thread::Builder::new()
            .name("cycles-session".to_string())
            .spawn(move || {
                let tile = {
                    let scene = scene.read();
                    let mut film = film.lock();
                    kernel::render(&scene, &prepared, &mut film, target, &cancel)
                        .then(|| film.to_tile())
                };
                match tile {
                    Some(tile) => worker_driver.write_render_tile(&tile),
                    None => worker_driver.render_cancelled(),
                }
            });

        match spawned {
            Ok(handle) => self.worker = Some(handle),
            Err(err) => {
                log::error!("failed to spawn render thread: {}", err);
                driver.render_cancelled();
            }
        }
    }

    /// Blocks until the current render thread exits.
    pub fn wait(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("render thread panicked");
                if let Some(driver) = &self.driver {
                    driver.render_cancelled();
                }
            }
        }
    }

    /// Stops the current render early and waits for it.
    pub fn cancel(&mut self) {
        self.cancel.store(true, Ordering::Release);
        self.wait();
        self.cancel.store(false, Ordering::Release);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::tile::Tile;
    use crate::native::{DeviceType, available_devices};
    use std::sync::mpsc;

    struct ChannelDriver(Mutex<mpsc::Sender<Option<Tile>>>);

    impl OutputDriver for ChannelDriver {
        fn write_render_tile(&self, tile: &Tile) {
            let _ = self.0.lock().send(Some(tile.clone()));
        }

        fn render_cancelled(&self) {
            let _ = self.0.lock().send(None);
        }
    }

    fn session() -> (Session, mpsc::Receiver<Option<Tile>>) {
        let device = available_devices()
            .into_iter()
            .find(|d| d.device_type == DeviceType::Cpu)
            .unwrap();
        let params = SessionParams {
            device,
            tile_size: 2048,
            use_auto_tile: false,
            samples: 1,
        };
        let mut session = Session::new(params, Arc::new(RwLock::new(NativeScene::new())));
        let (tx, rx) = mpsc::channel();
        session.set_output_driver(Arc::new(ChannelDriver(Mutex::new(tx))));
        (session, rx)
    }

    #[test]
    fn test_accumulates_until_reset() {
        let (mut session, rx) = session();
        session.reset(BufferParams::new(3, 2), 0);

        session.set_samples(1);
        session.start();
        let tile = rx.recv().unwrap().unwrap();
        assert_eq!(tile.size, anari_cycles_core::math::UVec2::new(3, 2));

        session.set_samples(2);
        session.start();
        rx.recv().unwrap().unwrap();
        session.wait();
        assert_eq!(session.accumulated_samples(), 2);

        session.reset(BufferParams::new(3, 2), 0);
        assert_eq!(session.accumulated_samples(), 0);
    }
}
