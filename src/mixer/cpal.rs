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
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, span, Level};

use super::software::{SoftwareMixer, OUTPUT_CHANNELS};
use super::thread_priority::{
    callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};
use super::MixerError;

/// An output device as reported by the host.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

fn device_error(e: impl fmt::Display) -> MixerError {
    MixerError::Device(e.to_string())
}

/// Lists output devices across all available hosts.
pub fn list_devices() -> Result<Vec<DeviceInfo>, MixerError> {
    Ok(output_devices()?
        .into_iter()
        .map(|(info, _)| info)
        .collect())
}

fn output_devices() -> Result<Vec<(DeviceInfo, cpal::Device)>, MixerError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout().map_err(device_error)?;
    let _shh_stderr = shh::stderr().map_err(device_error)?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host_devices = match cpal::host_from_id(host_id)
            .map_err(device_error)?
            .devices()
        {
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
                .map(|config| config.channels())
                .max()
                .unwrap_or(0);
            if max_channels == 0 {
                continue;
            }
            let Ok(name) = device.name() else {
                continue;
            };
            devices.push((
                DeviceInfo {
                    name,
                    host: host_id.name().to_string(),
                    max_channels,
                },
                device,
            ));
        }
    }

    devices.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name));
    Ok(devices)
}

fn find_device(name: &str) -> Result<cpal::Device, MixerError> {
    if name == "default" {
        return cpal::default_host()
            .default_output_device()
            .ok_or_else(|| MixerError::Device("no default output device".to_string()));
    }
    output_devices()?
        .into_iter()
        .find(|(info, _)| info.name.trim() == name)
        .map(|(_, device)| device)
        .ok_or_else(|| MixerError::Device(format!("no device found with name {}", name)))
}

/// Renders the software mixer straight into the device buffer, converting to the device's
/// sample type.
fn render_callback<T>(
    mixer: Arc<SoftwareMixer>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let priority = callback_thread_priority();
    let rt_audio = rt_audio_enabled();
    let mut priority_set = false;
    let mut scratch: Vec<f32> = Vec::new();

    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        configure_audio_thread_priority(priority, rt_audio, &mut priority_set);
        scratch.resize(data.len(), 0.0);
        mixer.render(&mut scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<SoftwareMixer>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device.build_output_stream(
        config,
        render_callback::<T>(mixer),
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

/// A running output stream that pulls audio from a software mixer.
pub struct OutputStream {
    device: String,
    mixer: Arc<SoftwareMixer>,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl OutputStream {
    /// Opens the named device and starts pulling from the mixer. The stream lives on its own
    /// thread and stops when this value is dropped.
    pub fn start(device_name: &str, mixer: Arc<SoftwareMixer>) -> Result<OutputStream, MixerError> {
        let device = find_device(device_name)?;
        let sample_format = device
            .default_output_config()
            .map_err(device_error)?
            .sample_format();
        let config = cpal::StreamConfig {
            channels: OUTPUT_CHANNELS,
            sample_rate: mixer.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let stop = Arc::new(AtomicBool::new(false));
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let thread = {
            let stop = stop.clone();
            let mixer = mixer.clone();
            let device_name = device_name.to_string();
            thread::spawn(move || {
                let span = span!(Level::INFO, "output stream", device = device_name);
                let _enter = span.enter();

                let stream = match sample_format {
                    cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer),
                    cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer),
                    cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, mixer),
                    other => {
                        let _ = started_tx.send(Err(MixerError::Device(format!(
                            "unsupported sample format {:?}",
                            other
                        ))));
                        return;
                    }
                };
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = started_tx.send(Err(device_error(e)));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = started_tx.send(Err(device_error(e)));
                    return;
                }
                info!("Output stream started");
                let _ = started_tx.send(Ok(()));

                while !stop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(100));
                }
                info!("Output stream stopped");
            })
        };

        let started = started_rx
            .recv()
            .unwrap_or_else(|_| Err(MixerError::Device("output thread exited".to_string())));
        let mut output = OutputStream {
            device: device_name.to_string(),
            mixer,
            stop,
            thread: Some(thread),
        };
        match started {
            Ok(()) => Ok(output),
            Err(e) => {
                output.shutdown();
                Err(e)
            }
        }
    }

    /// The mixer feeding this stream.
    pub fn mixer(&self) -> &Arc<SoftwareMixer> {
        &self.mixer
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStream")
            .field("device", &self.device)
            .field("mixer", &self.mixer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_display() {
        let info = DeviceInfo {
            name: "speakers".to_string(),
            host: "ALSA".to_string(),
            max_channels: 2,
        };
        assert_eq!(info.to_string(), "speakers (Channels=2) (ALSA)");
    }
}
