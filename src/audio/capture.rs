//! Microphone backend built on cpal
//!
//! cpal delivers samples from its own callback thread, while the audio
//! producer expects blocking fixed-size reads. The stream is owned by a
//! dedicated control thread (cpal streams cannot move between threads on
//! every host); callback chunks cross to the reader over a bounded channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::device::resolve_input_device;
use crate::capture::{AudioDevice, AudioSource, AudioSpec};
use crate::errors::DeviceError;

/// Callback chunks buffered between cpal and the reader
const MAX_BUFFERED_CHUNKS: usize = 256;

/// A read with no data for this long fails instead of blocking forever
const READ_STALL_TIMEOUT: Duration = Duration::from_millis(500);

/// Block duration handed to the producer
const BLOCK_MILLIS: u32 = 20;

const STREAM_THREAD_NAME: &str = "replaycam-mic-stream";

/// Opens the named (or default) input device
#[derive(Debug, Clone, Default)]
pub struct MicrophoneSource {
    device_id: Option<String>,
}

impl MicrophoneSource {
    pub fn new(device_id: Option<String>) -> Self {
        Self { device_id }
    }
}

impl AudioSource for MicrophoneSource {
    fn open(&mut self, spec: AudioSpec) -> Result<Box<dyn AudioDevice>, DeviceError> {
        Ok(Box::new(Microphone::open(self.device_id.clone(), spec)?))
    }
}

enum StreamCommand {
    Play(Sender<Result<(), DeviceError>>),
    Pause(Sender<Result<(), DeviceError>>),
    Shutdown,
}

/// An open cpal input stream read in fixed-size i16 blocks
pub struct Microphone {
    name: String,
    spec: AudioSpec,
    block_len: usize,
    samples: Receiver<Vec<i16>>,
    pending: VecDeque<i16>,
    commands: Sender<StreamCommand>,
    worker: Option<JoinHandle<()>>,
    overflowed: Arc<AtomicU64>,
    started: bool,
}

impl Microphone {
    /// Open the device and build a paused input stream
    ///
    /// 44.1 and 48 kHz are requested as given, mono and stereo likewise;
    /// anything else falls back to the device default.
    pub fn open(device_id: Option<String>, requested: AudioSpec) -> Result<Self, DeviceError> {
        let (sample_tx, samples) = crossbeam_channel::bounded(MAX_BUFFERED_CHUNKS);
        let (commands, command_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let overflowed = Arc::new(AtomicU64::new(0));
        let stream_overflowed = overflowed.clone();

        let worker = thread::Builder::new()
            .name(STREAM_THREAD_NAME.to_string())
            .spawn(move || {
                let built = build_stream(device_id.as_deref(), requested, sample_tx, stream_overflowed);
                let stream = match built {
                    Ok((stream, name, spec)) => {
                        let _ = ready_tx.send(Ok((name, spec)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_stream_commands(&stream, &command_rx);
            })
            .map_err(|e| DeviceError::Unavailable(format!("Failed to spawn {}: {}", STREAM_THREAD_NAME, e)))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| DeviceError::Unavailable("Microphone stream thread exited".to_string()));
        let (name, spec) = match ready.and_then(|r| r) {
            Ok(opened) => opened,
            Err(e) => {
                let _ = worker.join();
                return Err(e);
            }
        };

        let block_len = (spec.sample_rate * BLOCK_MILLIS / 1000) as usize * spec.channels as usize;
        log::info!(
            "Opened microphone '{}' ({} Hz, {} ch, {} samples/block)",
            name,
            spec.sample_rate,
            spec.channels,
            block_len
        );

        Ok(Self {
            name,
            spec,
            block_len,
            samples,
            pending: VecDeque::new(),
            commands,
            worker: Some(worker),
            overflowed,
            started: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Callback chunks dropped because the reader fell behind
    pub fn overflowed_chunks(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    fn request(&self, make: fn(Sender<Result<(), DeviceError>>) -> StreamCommand) -> Result<(), DeviceError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(make(reply_tx))
            .map_err(|_| DeviceError::Unavailable(format!("microphone '{}' stream is gone", self.name)))?;
        reply_rx
            .recv()
            .map_err(|_| DeviceError::Unavailable(format!("microphone '{}' stream is gone", self.name)))?
    }

    fn shutdown(&mut self) -> Result<(), DeviceError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let _ = self.commands.send(StreamCommand::Shutdown);
        worker
            .join()
            .map_err(|_| DeviceError::Close(format!("microphone '{}' stream thread panicked", self.name)))
    }
}

impl AudioDevice for Microphone {
    fn spec(&self) -> AudioSpec {
        self.spec
    }

    fn block_len(&self) -> usize {
        self.block_len
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        if self.started {
            return Ok(());
        }
        self.request(StreamCommand::Play)?;
        self.started = true;
        Ok(())
    }

    fn read_block(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError> {
        if !self.started {
            return Err(DeviceError::Read(format!("microphone '{}' is not started", self.name)));
        }

        let mut filled = 0;
        while filled < buf.len() {
            if self.pending.is_empty() {
                match self.samples.recv_timeout(READ_STALL_TIMEOUT) {
                    Ok(chunk) => self.pending.extend(chunk),
                    Err(RecvTimeoutError::Timeout) if filled > 0 => break,
                    Err(RecvTimeoutError::Timeout) => {
                        return Err(DeviceError::Read(format!(
                            "no audio from '{}' for {} ms",
                            self.name,
                            READ_STALL_TIMEOUT.as_millis()
                        )))
                    }
                    Err(RecvTimeoutError::Disconnected) if filled > 0 => break,
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(DeviceError::Read(format!("microphone '{}' stream closed", self.name)))
                    }
                }
            }

            let take = self.pending.len().min(buf.len() - filled);
            for (slot, sample) in buf[filled..filled + take].iter_mut().zip(self.pending.drain(..take)) {
                *slot = sample;
            }
            filled += take;
        }

        Ok(filled)
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        self.request(StreamCommand::Pause)?;

        let overflowed = self.overflowed_chunks();
        if overflowed > 0 {
            log::warn!("Microphone '{}' dropped {} callback chunks", self.name, overflowed);
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), DeviceError> {
        self.shutdown()?;
        log::debug!("Closed microphone '{}'", self.name);
        Ok(())
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("{}", e);
        }
    }
}

fn build_stream(
    device_id: Option<&str>,
    requested: AudioSpec,
    sender: Sender<Vec<i16>>,
    overflowed: Arc<AtomicU64>,
) -> Result<(cpal::Stream, String, AudioSpec), DeviceError> {
    let device = resolve_input_device(device_id)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported = device
        .default_input_config()
        .map_err(|e| DeviceError::Unsupported(format!("'{}' has no input config: {}", name, e)))?;

    let sample_rate = match requested.sample_rate {
        44100 | 48000 => requested.sample_rate,
        _ => supported.sample_rate().0,
    };
    let channels = match requested.channels {
        1 | 2 => requested.channels,
        _ => supported.channels(),
    };

    let config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let chunk: Vec<i16> = data.iter().map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).collect();
                if sender.try_send(chunk).is_err() {
                    overflowed.fetch_add(1, Ordering::Relaxed);
                }
            },
            |err| log::error!("Audio capture error: {}", err),
            None,
        )
        .map_err(|e| DeviceError::Unsupported(format!("'{}' at {} Hz/{} ch: {}", name, sample_rate, channels, e)))?;

    stream
        .pause()
        .map_err(|e| DeviceError::Busy(format!("'{}': {}", name, e)))?;

    Ok((stream, name, AudioSpec::pcm16(sample_rate, channels)))
}

fn run_stream_commands(stream: &cpal::Stream, commands: &Receiver<StreamCommand>) {
    // A dropped handle counts as shutdown
    while let Ok(command) = commands.recv() {
        match command {
            StreamCommand::Play(reply) => {
                let _ = reply.send(stream.play().map_err(|e| DeviceError::Busy(e.to_string())));
            }
            StreamCommand::Pause(reply) => {
                let _ = reply.send(stream.pause().map_err(|e| DeviceError::Close(e.to_string())));
            }
            StreamCommand::Shutdown => break,
        }
    }
}
