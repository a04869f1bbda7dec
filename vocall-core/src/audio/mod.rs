//! Audio devices via the cpal backend.
//!
//! # Design constraints
//!
//! cpal callbacks run on OS audio threads at elevated priority. They **must not**
//! block on a mutex or perform I/O:
//! - capture writes into an SPSC ring buffer producer (`push_slice` is lock-free),
//! - playback pulls scheduled buffers from a crossbeam channel with `try_recv`.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on macOS).
//! Each stream is therefore built, kept alive and dropped on its own dedicated
//! thread; the handles returned to the engine only hold the channel ends and are
//! `Send`.

pub mod device;
pub mod pcm;
pub mod resample;

pub use device::{
    list_input_devices, AudioBackend, CaptureRequest, DeviceInfo, MicrophoneStream, OutputDevice,
};

#[cfg(feature = "audio-cpal")]
pub use cpal_backend::{CpalBackend, CpalMicrophone, CpalOutput};

#[cfg(feature = "audio-cpal")]
mod cpal_backend {
    use std::sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    };
    use std::thread::JoinHandle;

    use cpal::{
        traits::{DeviceTrait, HostTrait, StreamTrait},
        FromSample, SampleFormat, SizedSample, Stream, StreamConfig,
    };
    use crossbeam_channel::{Receiver, Sender, TrySendError};
    use tracing::{debug, error, info, warn};

    use super::device::{
        match_device_index, AudioBackend, CaptureRequest, MicrophoneStream, OutputDevice,
    };
    use super::resample::{PlaybackTimeline, RateConverter, TimelineBuffer};
    use crate::buffering::{
        create_audio_ring, AudioConsumer, AudioFrame, AudioProducer, Consumer, Producer,
    };
    use crate::error::{Result, VocallError};

    /// Samples drained from the capture ring per pop.
    const CAPTURE_DRAIN: usize = 4_096;
    /// Resampler input stride for capture (20 ms at 48 kHz).
    const CAPTURE_RESAMPLE_CHUNK: usize = 960;
    /// Scheduled buffers waiting for the output callback.
    const OUTPUT_QUEUE_CAP: usize = 256;

    /// Production backend on the system default cpal host.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct CpalBackend;

    impl AudioBackend for CpalBackend {
        fn open_microphone(&self, request: &CaptureRequest) -> Result<Box<dyn MicrophoneStream>> {
            Ok(Box::new(CpalMicrophone::open(request)?))
        }

        fn open_output(&self, sample_rate: u32) -> Result<Box<dyn OutputDevice>> {
            Ok(Box::new(CpalOutput::open(sample_rate)?))
        }
    }

    // ── Stream thread ────────────────────────────────────────────────────────

    /// Owns the thread a `!Send` cpal stream lives on.
    struct StreamThread {
        shutdown: Option<Sender<()>>,
        handle: Option<JoinHandle<()>>,
    }

    impl StreamThread {
        /// Build a stream on a fresh thread and block until it is playing.
        /// Returns the device's native sample rate.
        fn spawn<F>(name: &str, build: F) -> Result<(Self, u32)>
        where
            F: FnOnce() -> Result<(Stream, u32)> + Send + 'static,
        {
            let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();
            let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

            let handle = std::thread::Builder::new()
                .name(name.to_string())
                .spawn(move || {
                    let (stream, rate) = match build() {
                        Ok(v) => v,
                        Err(e) => {
                            let _ = open_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = open_tx.send(Ok(rate));
                    // Parked until release; a dropped sender also wakes us.
                    let _ = shutdown_rx.recv();
                    drop(stream);
                })?;

            match open_rx.recv() {
                Ok(Ok(rate)) => Ok((
                    Self {
                        shutdown: Some(shutdown_tx),
                        handle: Some(handle),
                    },
                    rate,
                )),
                Ok(Err(e)) => {
                    let _ = handle.join();
                    Err(e)
                }
                Err(_) => Err(VocallError::DeviceUnavailable(
                    "audio thread exited during open".into(),
                )),
            }
        }

        fn stop(&mut self) -> Result<()> {
            let Some(shutdown) = self.shutdown.take() else {
                return Ok(());
            };
            let _ = shutdown.send(());
            if let Some(handle) = self.handle.take() {
                handle
                    .join()
                    .map_err(|_| VocallError::AudioStream("audio thread panicked".into()))?;
            }
            Ok(())
        }
    }

    impl Drop for StreamThread {
        fn drop(&mut self) {
            let _ = self.stop();
        }
    }

    // ── Microphone ───────────────────────────────────────────────────────────

    /// Microphone handle: ring consumer plus resampler to the capture rate.
    pub struct CpalMicrophone {
        consumer: AudioConsumer,
        converter: RateConverter,
        scratch: Vec<f32>,
        running: Arc<AtomicBool>,
        thread: StreamThread,
    }

    impl CpalMicrophone {
        /// # Errors
        /// `NoDefaultInputDevice` when no microphone exists, `DeviceUnavailable`
        /// or `AudioStream` if cpal refuses the device or the stream.
        pub fn open(request: &CaptureRequest) -> Result<Self> {
            let (producer, consumer) = create_audio_ring();
            let running = Arc::new(AtomicBool::new(true));
            let flag = Arc::clone(&running);
            let preferred = request.preferred_device.clone();

            let (thread, device_rate) = StreamThread::spawn("vocall-capture", move || {
                open_input_stream(producer, flag, preferred.as_deref())
            })?;

            let converter =
                RateConverter::new(device_rate, request.sample_rate, CAPTURE_RESAMPLE_CHUNK)?;
            if !converter.is_passthrough() {
                info!(
                    from = device_rate,
                    to = request.sample_rate,
                    "capture resampling enabled"
                );
            }

            Ok(Self {
                consumer,
                converter,
                scratch: vec![0f32; CAPTURE_DRAIN],
                running,
                thread,
            })
        }
    }

    impl MicrophoneStream for CpalMicrophone {
        fn read(&mut self, out: &mut Vec<f32>) -> Result<usize> {
            if !self.running.load(Ordering::Acquire) {
                return Ok(0);
            }
            let mut appended = 0;
            loop {
                let n = self.consumer.pop_slice(&mut self.scratch);
                if n == 0 {
                    break;
                }
                let converted = self.converter.process(&self.scratch[..n]);
                appended += converted.len();
                out.extend_from_slice(&converted);
            }
            Ok(appended)
        }

        fn release(&mut self) -> Result<()> {
            self.running.store(false, Ordering::Release);
            self.thread.stop()
        }
    }

    fn open_input_stream(
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<(Stream, u32)> {
        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.input_devices() {
                Ok(devices) => {
                    let mut devices: Vec<cpal::Device> = devices.collect();
                    let names: Vec<String> = devices
                        .iter()
                        .map(|device| device.name().unwrap_or_default())
                        .collect();
                    selected_device =
                        match_device_index(&names, preferred_name).map(|i| devices.swap_remove(i));
                    if selected_device.is_none() {
                        warn!(
                            "preferred input device '{}' not found, falling back",
                            preferred_name
                        );
                    }
                }
                Err(e) => warn!("failed to list input devices while resolving preference: {e}"),
            }
        }

        let device = match selected_device.or_else(|| host.default_input_device()) {
            Some(device) => device,
            None => {
                let mut devices = host
                    .input_devices()
                    .map_err(|e| VocallError::DeviceUnavailable(e.to_string()))?;
                let fallback = devices.next().ok_or(VocallError::NoDefaultInputDevice)?;
                warn!("no default input device, falling back to first available input");
                fallback
            }
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| VocallError::DeviceUnavailable(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let config: StreamConfig = supported.config();

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_mono_input::<f32>(&device, &config, producer, running),
            SampleFormat::I16 => build_mono_input::<i16>(&device, &config, producer, running),
            SampleFormat::U8 => build_mono_input::<u8>(&device, &config, producer, running),
            fmt => {
                return Err(VocallError::AudioStream(format!(
                    "unsupported input sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| VocallError::DeviceUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| VocallError::AudioStream(e.to_string()))?;

        info!(sample_rate, channels = config.channels, "input stream playing");
        Ok((stream, sample_rate))
    }

    /// Input callback: down-mix to mono and push into the ring. No allocation
    /// once `mix_buf` has grown to the device's callback size.
    fn build_mono_input<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        mut producer: AudioProducer,
        running: Arc<AtomicBool>,
    ) -> std::result::Result<Stream, cpal::BuildStreamError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let channels = config.channels.max(1) as usize;
        let mut mix_buf: Vec<f32> = Vec::new();
        device.build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let frames = data.len() / channels;
                mix_buf.resize(frames, 0.0);
                for (f, slot) in mix_buf.iter_mut().enumerate() {
                    let base = f * channels;
                    let sum: f32 = data[base..base + channels]
                        .iter()
                        .map(|&s| s.to_sample::<f32>())
                        .sum();
                    *slot = sum / channels as f32;
                }
                let written = producer.push_slice(&mix_buf);
                if written < mix_buf.len() {
                    warn!("capture ring full: dropped {} frames", mix_buf.len() - written);
                }
            },
            |err| error!("input stream error: {err}"),
            None,
        )
    }

    // ── Output ───────────────────────────────────────────────────────────────

    struct PlayingBuffer {
        start_frame: u64,
        samples: Vec<f32>,
        offset: usize,
    }

    /// Output handle. The device clock is the count of frames the callback has
    /// rendered, so `current_time` advances exactly with what the speaker played.
    pub struct CpalOutput {
        frames_rendered: Arc<AtomicU64>,
        timeline: PlaybackTimeline,
        queue: Sender<TimelineBuffer>,
        closed: bool,
        thread: StreamThread,
    }

    impl CpalOutput {
        pub fn open(source_rate: u32) -> Result<Self> {
            let frames_rendered = Arc::new(AtomicU64::new(0));
            let clock = Arc::clone(&frames_rendered);
            let (queue, pending) = crossbeam_channel::bounded(OUTPUT_QUEUE_CAP);

            let (thread, device_rate) =
                StreamThread::spawn("vocall-playback", move || open_output_stream(pending, clock))?;

            if device_rate != source_rate {
                info!(from = source_rate, to = device_rate, "playback resampling enabled");
            }

            Ok(Self {
                frames_rendered,
                timeline: PlaybackTimeline::new(device_rate),
                queue,
                closed: false,
                thread,
            })
        }
    }

    impl OutputDevice for CpalOutput {
        fn current_time(&self) -> f64 {
            self.frames_rendered.load(Ordering::Relaxed) as f64
                / f64::from(self.timeline.device_rate())
        }

        fn schedule(&mut self, frame: AudioFrame, start_at: f64) -> Result<()> {
            if self.closed {
                return Err(VocallError::AudioStream("output device is closed".into()));
            }
            let rendered = self.frames_rendered.load(Ordering::Relaxed);
            for buffer in self.timeline.place(&frame, start_at)? {
                if buffer.end_frame() <= rendered {
                    debug!(
                        start = buffer.start_frame,
                        "dropping playback tail that is already past"
                    );
                    continue;
                }
                self.queue.try_send(buffer).map_err(|e| match e {
                    TrySendError::Full(_) => {
                        VocallError::AudioStream("playback queue is full".into())
                    }
                    TrySendError::Disconnected(_) => {
                        VocallError::AudioStream("playback stream has stopped".into())
                    }
                })?;
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            self.thread.stop()
        }
    }

    fn open_output_stream(
        pending: Receiver<TimelineBuffer>,
        clock: Arc<AtomicU64>,
    ) -> Result<(Stream, u32)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(VocallError::NoDefaultOutputDevice)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening output device"
        );

        let supported = device
            .default_output_config()
            .map_err(|e| VocallError::DeviceUnavailable(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let config: StreamConfig = supported.config();

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_timeline_output::<f32>(&device, &config, pending, clock),
            SampleFormat::I16 => build_timeline_output::<i16>(&device, &config, pending, clock),
            SampleFormat::U16 => build_timeline_output::<u16>(&device, &config, pending, clock),
            fmt => {
                return Err(VocallError::AudioStream(format!(
                    "unsupported output sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| VocallError::DeviceUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| VocallError::AudioStream(e.to_string()))?;

        info!(sample_rate, channels = config.channels, "output stream playing");
        Ok((stream, sample_rate))
    }

    /// Output callback: renders scheduled buffers at their start frame, silence
    /// in between. Buffers arrive in start order and never overlap.
    fn build_timeline_output<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        pending: Receiver<TimelineBuffer>,
        clock: Arc<AtomicU64>,
    ) -> std::result::Result<Stream, cpal::BuildStreamError>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels.max(1) as usize;
        let mut playing: Option<PlayingBuffer> = None;
        device.build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
                let mut now = clock.load(Ordering::Relaxed);
                for frame in data.chunks_mut(channels) {
                    while playing.is_none() {
                        match pending.try_recv() {
                            Ok(buf) if buf.samples.is_empty() => continue,
                            Ok(buf) => {
                                // A buffer that arrives late starts now, from its first sample.
                                playing = Some(PlayingBuffer {
                                    start_frame: buf.start_frame.max(now),
                                    samples: buf.samples,
                                    offset: 0,
                                });
                            }
                            Err(_) => break,
                        }
                    }

                    let mut value = 0.0f32;
                    let mut finished = false;
                    if let Some(p) = playing.as_mut() {
                        if now >= p.start_frame {
                            value = p.samples[p.offset];
                            p.offset += 1;
                            finished = p.offset >= p.samples.len();
                        }
                    }
                    if finished {
                        playing = None;
                    }

                    let out = T::from_sample(value);
                    for slot in frame.iter_mut() {
                        *slot = out;
                    }
                    now += 1;
                }
                clock.store(now, Ordering::Relaxed);
            },
            |err| error!("output stream error: {err}"),
            None,
        )
    }
}
