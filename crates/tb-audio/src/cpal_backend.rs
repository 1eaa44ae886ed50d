//! CPAL-based audio output backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use tracing::{debug, error, info};

use crate::traits::{AudioError, AudioOutput, Result};

/// CPAL-based audio output.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
    max_block: usize,
}

impl CpalOutput {
    /// Open the default output device. The render function will be asked
    /// for at most `max_block` frames at a time.
    pub fn new(max_block: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = config.into();
        // the callback interleaves a stereo pair; extra channels get silence
        config.channels = config.channels.max(2);

        let output = Self {
            device,
            config,
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
            max_block: max_block.max(1),
        };
        info!(
            device = %output.device_name(),
            rate = output.config.sample_rate.0,
            channels = output.config.channels,
            "opened audio output"
        );
        Ok(output)
    }

    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "unknown".into())
    }

    /// Build the stream around a render function. `render` fills split
    /// left/right buffers and runs on the device thread, so it must not
    /// block or allocate.
    pub fn build_stream<F>(&mut self, mut render: F) -> Result<()>
    where
        F: FnMut(&mut [f32], &mut [f32]) + Send + 'static,
    {
        let running = self.running.clone();
        let channels = self.config.channels as usize;
        let max_block = self.max_block;
        let mut left = vec![0.0f32; max_block];
        let mut right = vec![0.0f32; max_block];

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    for chunk in data.chunks_mut(channels * max_block) {
                        let frames = chunk.len() / channels;
                        let (l, r) = (&mut left[..frames], &mut right[..frames]);
                        render(l, r);
                        interleave(l, r, chunk, channels);
                    }
                },
                |err| error!(%err, "audio stream error"),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        self.stream = Some(stream);
        debug!(max_block, "built audio stream");
        Ok(())
    }
}

/// Write split stereo buffers into an interleaved device buffer of
/// `channels` channels. Channels past the second are zeroed.
pub fn interleave(left: &[f32], right: &[f32], out: &mut [f32], channels: usize) {
    if channels == 0 {
        return;
    }
    for ((frame, &l), &r) in out.chunks_mut(channels).zip(left).zip(right) {
        for (c, sample) in frame.iter_mut().enumerate() {
            *sample = match c {
                0 => l,
                1 => r,
                _ => 0.0,
            };
        }
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn start(&mut self) -> Result<()> {
        let stream = self.stream.as_ref().ok_or(AudioError::NoStream)?;
        self.running.store(true, Ordering::Relaxed);
        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        info!("audio stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
            info!("audio stream stopped");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}
