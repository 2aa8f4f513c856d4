// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use crate::audio::mixer::AudioMixer;
use crate::config;

/// Frames mixed per producer pass.
const BLOCK_FRAMES: usize = 256;

/// Single-producer/single-consumer ring of interleaved samples between the mixing
/// thread and the cpal callback. Samples are stored as f32 bits in atomics.
struct CircularBuffer {
    /// Backing buffer
    buffer: Box<[AtomicU32]>,
    /// Capacity (must be power of 2)
    capacity: usize,
    /// Read position (consumer)
    read_pos: AtomicUsize,
    /// Write position (producer)
    write_pos: AtomicUsize,
}

impl CircularBuffer {
    fn new(capacity: usize) -> Self {
        // Round up to next power of 2 for efficient modulo
        let cap = capacity.next_power_of_two();
        Self {
            buffer: (0..cap).map(|_| AtomicU32::new(0)).collect(),
            capacity: cap,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
        }
    }

    /// Get number of samples available to read
    #[inline]
    fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read) & (self.capacity - 1)
    }

    /// Get space available to write
    #[inline]
    fn space(&self) -> usize {
        self.capacity - self.available() - 1
    }

    /// Writes as many samples as fit. Returns the number written.
    fn write(&self, samples: &[f32]) -> usize {
        let to_write = self.space().min(samples.len());
        let write = self.write_pos.load(Ordering::Relaxed);
        let mask = self.capacity - 1;
        for (i, sample) in samples[..to_write].iter().enumerate() {
            self.buffer[(write + i) & mask].store(sample.to_bits(), Ordering::Relaxed);
        }
        // Publishes the samples above to the consumer.
        self.write_pos
            .store((write + to_write) & mask, Ordering::Release);
        to_write
    }

    /// Reads up to `output.len()` samples. Returns the number read.
    fn read(&self, output: &mut [f32]) -> usize {
        let to_read = self.available().min(output.len());
        let read = self.read_pos.load(Ordering::Relaxed);
        let mask = self.capacity - 1;
        for (i, sample) in output[..to_read].iter_mut().enumerate() {
            *sample = f32::from_bits(self.buffer[(read + i) & mask].load(Ordering::Relaxed));
        }
        self.read_pos
            .store((read + to_read) & mask, Ordering::Release);
        to_read
    }
}

/// A small wrapper around a cpal::Device.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

impl Device {
    /// Lists cpal output devices.
    pub fn list() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the device with the given name. `default` picks the host's default output.
    pub fn get(name: &str) -> Result<Device, Box<dyn Error>> {
        if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or("no default output device")?;
            let max_channels = device
                .supported_output_configs()?
                .map(|output_config| output_config.channels())
                .max()
                .unwrap_or(0);
            return Ok(Device {
                name: device.name()?,
                max_channels,
                host_id: host.id(),
                device,
            });
        }

        Device::list()?
            .into_iter()
            .find(|device| device.name.trim() == name)
            .ok_or_else(|| format!("no device found with name {}", name).into())
    }

    /// Returns the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the maximum number of output channels.
    pub fn max_channels(&self) -> u16 {
        self.max_channels
    }
}

/// Continuous output stream fed by an [`AudioMixer`].
///
/// A producer thread mixes small blocks into a ring buffer and the cpal callback
/// drains it. The mixer clock therefore advances with the hardware, running ahead
/// of it by at most the ring size.
pub struct Output {
    name: String,
    mixer: AudioMixer,
    running: Arc<AtomicBool>,
    /// Handle to the output thread (keeps the stream alive).
    output_thread: Option<thread::JoinHandle<()>>,
    /// Handle to the producer thread (fills ring buffer).
    producer_thread: Option<thread::JoinHandle<()>>,
}

/// f32 callback: read directly into the cpal buffer.
fn create_f32_callback(
    ring: Arc<CircularBuffer>,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let read = ring.read(data);
        // Zero-fill any shortfall
        data[read..].fill(0.0);
    }
}

/// Integer callback: read from ring and convert.
fn create_converting_callback<T: cpal::Sample + cpal::FromSample<f32>>(
    ring: Arc<CircularBuffer>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut temp: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        temp.resize(data.len(), 0.0);
        let read = ring.read(&mut temp);
        temp[read..].fill(0.0);

        for (dst, &src) in data.iter_mut().zip(temp.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

impl Output {
    /// Opens the configured device and starts streaming the mixer to it.
    pub fn start(config: &config::Audio) -> Result<Output, Box<dyn Error>> {
        let device = Device::get(config.device())?;
        let num_channels = config.channels();
        if num_channels == 0 || num_channels > device.max_channels {
            return Err(format!(
                "{} channels requested, audio device {} only has {}",
                num_channels, device.name, device.max_channels
            )
            .into());
        }

        let sample_format = device.device.default_output_config()?.sample_format();
        check_sample_format(sample_format)?;
        let mixer = AudioMixer::new(num_channels, config.sample_rate());
        let running = Arc::new(AtomicBool::new(true));

        // About 20ms of audio: the mixer clock never runs further ahead than this.
        let capacity_samples = (config.sample_rate() as usize * num_channels as usize) / 50;
        let ring = Arc::new(CircularBuffer::new(
            capacity_samples.max(BLOCK_FRAMES * num_channels as usize * 2),
        ));

        let producer_thread = {
            let mixer = mixer.clone();
            let ring = ring.clone();
            let running = running.clone();
            thread::spawn(move || {
                let block_samples = BLOCK_FRAMES * num_channels as usize;
                let mut scratch = vec![0.0f32; block_samples];

                while running.load(Ordering::Relaxed) {
                    if ring.space() >= block_samples {
                        mixer.process_into_output(&mut scratch, BLOCK_FRAMES);
                        ring.write(&scratch);
                    } else {
                        // Ring full, yield briefly
                        thread::sleep(Duration::from_micros(500));
                    }
                }
            })
        };

        let stream_config = cpal::StreamConfig {
            channels: num_channels,
            sample_rate: config.sample_rate(),
            buffer_size: match config.buffer_size() {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        };

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let output_thread = {
            let running = running.clone();
            let cpal_device = device.device.clone();
            let device_name = device.name.clone();
            thread::spawn(move || {
                let err_fn = |err| error!("CPAL output stream error: {}", err);
                let stream_result = match sample_format {
                    cpal::SampleFormat::F32 => cpal_device.build_output_stream(
                        &stream_config,
                        create_f32_callback(ring),
                        err_fn,
                        None,
                    ),
                    cpal::SampleFormat::I32 => cpal_device.build_output_stream(
                        &stream_config,
                        create_converting_callback::<i32>(ring),
                        err_fn,
                        None,
                    ),
                    // I16; anything else was rejected by check_sample_format.
                    _ => cpal_device.build_output_stream(
                        &stream_config,
                        create_converting_callback::<i16>(ring),
                        err_fn,
                        None,
                    ),
                };

                let stream = match stream_result {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("failed to create CPAL stream: {}", e)));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(format!("failed to start CPAL stream: {}", e)));
                    return;
                }
                info!(device = %device_name, "CPAL output stream started");
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive until shutdown.
                while running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
        };

        let output = Output {
            name: device.name,
            mixer,
            running,
            output_thread: Some(output_thread),
            producer_thread: Some(producer_thread),
        };

        // Dropping `output` on failure stops and joins both threads.
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(output),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err("CPAL output thread exited before the stream started".into()),
        }
    }
}

/// Formats the output callbacks can convert to.
fn check_sample_format(format: cpal::SampleFormat) -> Result<(), String> {
    match format {
        cpal::SampleFormat::F32 | cpal::SampleFormat::I32 | cpal::SampleFormat::I16 => Ok(()),
        other => Err(format!("unsupported output sample format {}", other)),
    }
}

impl super::Output for Output {
    fn mixer(&self) -> &AudioMixer {
        &self.mixer
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        self.mixer.stop_all();
        self.running.store(false, Ordering::Relaxed);

        // Wait for threads to finish
        if let Some(thread) = self.producer_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}
