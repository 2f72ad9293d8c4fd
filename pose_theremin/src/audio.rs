//! Audio sinks for the synthesized backends.
//!
//! A voice implements [`AudioSource`] and lives behind a mutex shared with
//! the sink.  The backend mutates the voice from the main loop; the sink's
//! callback pulls mono samples from it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::Result;

/// Sample rate reported when no device is attached.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Anything that renders mono samples.
pub trait AudioSource: Send {
    fn next_sample(&mut self) -> f32;
}

pub type SharedSource = Arc<Mutex<dyn AudioSource>>;

/// Lock a shared voice, recovering from a poisoned lock; a panicking audio
/// callback must not take the main loop down with it.
pub fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub trait AudioSink {
    fn sample_rate(&self) -> u32;
    /// Start pulling from `source`, replacing any previous source.
    fn attach(&mut self, source: SharedSource) -> Result<()>;
    /// Stop pulling.  Idempotent.
    fn detach(&mut self);
    fn is_attached(&self) -> bool;
}

// ════════════════════════════════════════════════════════════════════════════
// NullSink
// ════════════════════════════════════════════════════════════════════════════

/// Sink with no device.  Clones share state, so a test can keep a handle
/// after giving the sink away, and pull samples by hand with [`render`].
///
/// [`render`]: NullSink::render
#[derive(Clone, Default)]
pub struct NullSink {
    source: Arc<Mutex<Option<SharedSource>>>,
}

impl NullSink {
    pub fn new() -> Self { Self::default() }

    /// Pull `frames` samples from the attached source; silence if none.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let source = lock(&self.source).clone();
        match source {
            Some(s) => {
                let mut voice = lock(&s);
                (0..frames).map(|_| voice.next_sample()).collect()
            }
            None => vec![0.0; frames],
        }
    }
}

impl AudioSink for NullSink {
    fn sample_rate(&self) -> u32 { DEFAULT_SAMPLE_RATE }

    fn attach(&mut self, source: SharedSource) -> Result<()> {
        *lock(&self.source) = Some(source);
        Ok(())
    }

    fn detach(&mut self) {
        *lock(&self.source) = None;
    }

    fn is_attached(&self) -> bool { lock(&self.source).is_some() }
}

// ════════════════════════════════════════════════════════════════════════════
// CpalSink
// ════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "audio")]
pub use self::device::CpalSink;

#[cfg(feature = "audio")]
mod device {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig};
    use tracing::{info, warn};

    use super::{lock, AudioSink, SharedSource};
    use crate::{Result, ThereminError};

    /// The default output device of the default host.  The stream is built
    /// on `attach` and dropped on `detach`.
    pub struct CpalSink {
        device: cpal::Device,
        config: StreamConfig,
        format: SampleFormat,
        stream: Option<cpal::Stream>,
    }

    impl CpalSink {
        pub fn open_default() -> Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| ThereminError::Audio("no default output device".into()))?;
            let supported = device
                .default_output_config()
                .map_err(|e| ThereminError::Audio(e.to_string()))?;
            let format = supported.sample_format();
            let config: StreamConfig = supported.into();

            info!(
                device = %device.name().unwrap_or_else(|_| "unknown".into()),
                rate = config.sample_rate.0,
                channels = config.channels,
                ?format,
                "audio output ready"
            );
            Ok(CpalSink { device, config, format, stream: None })
        }

        fn build<T>(&self, source: SharedSource) -> Result<cpal::Stream>
        where
            T: SizedSample + FromSample<f32>,
        {
            let channels = usize::from(self.config.channels.max(1));
            self.device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                        let mut voice = lock(&source);
                        for frame in data.chunks_mut(channels) {
                            let sample = T::from_sample(voice.next_sample());
                            frame.iter_mut().for_each(|s| *s = sample);
                        }
                    },
                    |err| warn!(error = %err, "audio stream error"),
                    None,
                )
                .map_err(|e| ThereminError::Audio(e.to_string()))
        }
    }

    impl AudioSink for CpalSink {
        fn sample_rate(&self) -> u32 { self.config.sample_rate.0 }

        fn attach(&mut self, source: SharedSource) -> Result<()> {
            self.detach();
            let stream = match self.format {
                SampleFormat::F32 => self.build::<f32>(source)?,
                SampleFormat::I16 => self.build::<i16>(source)?,
                SampleFormat::U16 => self.build::<u16>(source)?,
                other => {
                    return Err(ThereminError::Audio(format!("unsupported sample format {:?}", other)))
                }
            };
            stream.play().map_err(|e| ThereminError::Audio(e.to_string()))?;
            self.stream = Some(stream);
            Ok(())
        }

        fn detach(&mut self) {
            if let Some(stream) = self.stream.take() {
                if let Err(e) = stream.pause() {
                    warn!(error = %e, "could not pause audio stream");
                }
            }
        }

        fn is_attached(&self) -> bool { self.stream.is_some() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ramp(f32);
    impl AudioSource for Ramp {
        fn next_sample(&mut self) -> f32 {
            self.0 += 1.0;
            self.0
        }
    }

    #[test]
    fn null_sink_pulls_from_source() {
        let mut sink = NullSink::new();
        let handle = sink.clone();
        assert_eq!(handle.render(2), vec![0.0, 0.0]);

        let source: SharedSource = Arc::new(Mutex::new(Ramp(0.0)));
        sink.attach(source).unwrap();
        assert!(handle.is_attached());
        assert_eq!(handle.render(3), vec![1.0, 2.0, 3.0]);

        sink.detach();
        assert!(!handle.is_attached());
        assert_eq!(handle.render(1), vec![0.0]);
    }
}
