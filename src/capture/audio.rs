//! Pull-model audio producer
//!
//! Runs on its own thread, doing one blocking `read_block` per loop
//! iteration until the session clears the running flag. The device is
//! stopped and released on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::{AudioBlock, AudioDevice, AudioReadiness, ProducerStats};
use crate::buffer::UnitStore;
use crate::errors::ReplayError;
use crate::timing::ClockSource;

/// Pause after a failed read so a dead device does not spin the thread
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(5);

pub const AUDIO_THREAD_NAME: &str = "replaycam-audio";

pub struct AudioProducer {
    device: Box<dyn AudioDevice>,
    store: Arc<dyn UnitStore<AudioBlock>>,
    clock: Arc<dyn ClockSource>,
    running: Arc<AtomicBool>,
    readiness: Arc<AudioReadiness>,
    stats: Arc<ProducerStats>,
}

impl AudioProducer {
    pub fn new(
        device: Box<dyn AudioDevice>,
        store: Arc<dyn UnitStore<AudioBlock>>,
        clock: Arc<dyn ClockSource>,
        running: Arc<AtomicBool>,
        readiness: Arc<AudioReadiness>,
    ) -> Self {
        Self {
            device,
            store,
            clock,
            running,
            readiness,
            stats: Arc::new(ProducerStats::new()),
        }
    }

    pub fn with_stats(mut self, stats: Arc<ProducerStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> Arc<ProducerStats> {
        self.stats.clone()
    }

    /// Start the capture loop on a dedicated named thread
    ///
    /// If the thread cannot be spawned the device is released here.
    pub fn spawn(self) -> Result<JoinHandle<()>, ReplayError> {
        let slot = Arc::new(Mutex::new(Some(self)));
        let thread_slot = slot.clone();

        let spawned = thread::Builder::new().name(AUDIO_THREAD_NAME.to_string()).spawn(move || {
            let producer = thread_slot.lock().take();
            if let Some(producer) = producer {
                producer.run();
            }
        });

        spawned.map_err(|e| {
            if let Some(producer) = slot.lock().take() {
                if let Err(close_err) = producer.device.close() {
                    log::error!("Failed to release microphone: {}", close_err);
                }
            }
            ReplayError::ThreadSpawn(format!("{}: {}", AUDIO_THREAD_NAME, e))
        })
    }

    /// Capture until the running flag clears, then tear the device down
    pub fn run(self) {
        let AudioProducer {
            mut device,
            store,
            clock,
            running,
            readiness,
            stats,
        } = self;

        match device.start() {
            Ok(()) => {
                readiness.mark_started();
                log::debug!(
                    "Microphone started ({} Hz, {} ch, {} samples/block)",
                    device.spec().sample_rate,
                    device.spec().channels,
                    device.block_len()
                );
                capture_loop(device.as_mut(), store.as_ref(), clock.as_ref(), &running, &readiness, &stats);
            }
            Err(e) => log::error!("Microphone failed to start: {}", e),
        }

        readiness.mark_stopped();

        if let Err(e) = device.stop() {
            log::warn!("Failed to stop microphone: {}", e);
        }
        if let Err(e) = device.close() {
            log::error!("Failed to release microphone: {}", e);
        }
    }
}

fn capture_loop(
    device: &mut dyn AudioDevice,
    store: &dyn UnitStore<AudioBlock>,
    clock: &dyn ClockSource,
    running: &AtomicBool,
    readiness: &AudioReadiness,
    stats: &ProducerStats,
) {
    let spec = device.spec();
    let block_len = device.block_len().max(1);

    while running.load(Ordering::Acquire) {
        let mut samples = vec![0i16; block_len];
        match device.read_block(&mut samples) {
            Ok(read) => {
                if read < block_len {
                    stats.record_short_read();
                    samples.truncate(read);
                }
                let block = AudioBlock {
                    samples,
                    sample_rate: spec.sample_rate,
                    channels: spec.channels,
                };
                let non_empty = !block.is_empty();
                store.insert(block, clock.now_us());
                stats.record_captured();
                if non_empty {
                    readiness.mark_first_block();
                }
            }
            Err(e) => {
                let failures = stats.record_failed_read();
                if failures == 1 || failures % 100 == 0 {
                    log::warn!("Microphone read failed ({} so far): {}", failures, e);
                }
                store.insert(AudioBlock::empty(spec), clock.now_us());
                thread::sleep(READ_ERROR_BACKOFF);
            }
        }
    }
}
