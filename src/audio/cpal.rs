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
use std::{fmt, sync::Arc, thread, time::Duration};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use crate::audio::mixer::{Mixer, Voice};
use crate::audio::Device as AudioDevice;
use crate::error::AudioError;

/// A small wrapper around a cpal output device. The stream itself lives on
/// a dedicated thread (cpal streams are not Send); voices reach it through
/// the mixer's channel.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The shared voice mixer feeding the output stream.
    mixer: Arc<Mixer>,
}

impl Device {
    /// Opens the named output device, or the platform default when no name
    /// is given, and starts its output stream.
    pub fn open(name: Option<&str>) -> Result<Device, AudioError> {
        let host = cpal::default_host();
        let device = match name {
            Some(name) => host
                .output_devices()
                .map_err(|e| AudioError::Device(e.to_string()))?
                .find(|device| {
                    device
                        .name()
                        .map(|device_name| device_name == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    AudioError::Device(format!("no output device named {:?}", name))
                })?,
            None => host
                .default_output_device()
                .ok_or_else(|| AudioError::Device("no default output device".to_string()))?,
        };

        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::Device(e.to_string()))?;
        let sample_rate = supported.sample_rate();
        let channels = supported.channels();
        let sample_format = supported.sample_format();
        if !matches!(
            sample_format,
            cpal::SampleFormat::F32 | cpal::SampleFormat::I16 | cpal::SampleFormat::U16
        ) {
            return Err(AudioError::UnsupportedPlatform(format!(
                "output sample format {:?}",
                sample_format
            )));
        }
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let mixer = Arc::new(Mixer::new(sample_rate));
        {
            let mixer = mixer.clone();
            let device_name = device_name.clone();
            thread::spawn(move || {
                run_output(device, device_name, sample_format, channels, sample_rate, mixer)
            });
        }

        Ok(Device {
            name: device_name,
            mixer,
        })
    }
}

/// Builds and drives the output stream. Runs until the process exits.
fn run_output(
    device: cpal::Device,
    device_name: String,
    sample_format: cpal::SampleFormat,
    channels: u16,
    sample_rate: u32,
    mixer: Arc<Mixer>,
) {
    let config = cpal::StreamConfig {
        channels,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let stream_result = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            create_callback::<f32>(mixer, channels),
            |err| error!(error = %err, "CPAL output stream error"),
            None,
        ),
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            create_callback::<i16>(mixer, channels),
            |err| error!(error = %err, "CPAL output stream error"),
            None,
        ),
        cpal::SampleFormat::U16 => device.build_output_stream(
            &config,
            create_callback::<u16>(mixer, channels),
            |err| error!(error = %err, "CPAL output stream error"),
            None,
        ),
        other => {
            error!(format = ?other, "Unsupported output sample format");
            return;
        }
    };

    match stream_result {
        Ok(stream) => {
            if let Err(e) = stream.play() {
                error!(error = %e, "Failed to start CPAL stream");
                return;
            }
            info!(
                device = device_name,
                sample_rate, channels, "CPAL output stream started"
            );

            // Keep the stream alive for the lifetime of the process.
            loop {
                thread::sleep(Duration::from_millis(500));
            }
        }
        Err(e) => error!(error = %e, "Failed to create CPAL stream"),
    }
}

/// Mixes a mono block and fans it out across the device's channels,
/// converting to the stream's sample type.
fn create_callback<T: cpal::SizedSample + cpal::FromSample<f32>>(
    mixer: Arc<Mixer>,
    channels: u16,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut mono: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        let channels = channels as usize;
        let frames = data.len() / channels.max(1);
        mono.resize(frames, 0.0);
        mixer.process_into(&mut mono);

        for (frame, sample) in data.chunks_mut(channels.max(1)).zip(mono.iter()) {
            let converted = T::from_sample(*sample);
            frame.fill(converted);
        }
    }
}

impl AudioDevice for Device {
    fn trigger(&self, voice: Voice) -> Result<(), AudioError> {
        self.mixer.trigger(voice)
    }

    fn silence(&self) {
        self.mixer.silence();
    }

    fn sample_rate(&self) -> u32 {
        self.mixer.sample_rate()
    }

    fn supports_sample_playback(&self) -> bool {
        true
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Device>, AudioError> {
        Err(AudioError::Device(
            "CPAL devices cannot be mocked".to_string(),
        ))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (CPAL)", self.name)
    }
}
