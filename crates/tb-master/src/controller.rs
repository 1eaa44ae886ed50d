//! The edit context: owns the project and talks to the render context.

use std::sync::Arc;

use arc_swap::ArcSwap;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tb_audio::{AudioOutput, CpalOutput};
use tb_engine::analysis::nearest_zero_crossing;
use tb_engine::state::{self, InstrumentState};
use tb_engine::{Engine, EngineCommand, InstrumentProcessor, PlayMode, Playhead, Processor, Retired, SampleBuffer};
use tb_formats::SampleFormat;
use tb_ir::{Edit, EngineParams, FmParams, InstrumentKind, Project, Step, MAX_INSTRUMENTS};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::offline;
use crate::render::{RenderContext, SharedPlayhead};
use crate::{ControllerError, Result};

/// Zero-crossing search radius for manual slice points, in frames.
pub const SLICE_SNAP_RADIUS: usize = 256;

/// Headless sequencer controller: owns the authoritative project, publishes
/// snapshots and queues commands for the render context.
pub struct Controller {
    config: EngineConfig,
    project: Project,
    snapshot: Arc<ArcSwap<Project>>,
    /// Published snapshots the render side may still reference
    retired_snapshots: Vec<Arc<Project>>,
    commands: HeapProd<EngineCommand>,
    retired: HeapCons<Retired>,
    playhead: Arc<SharedPlayhead>,
    render: Option<RenderContext>,
    /// Loaded sample per instrument slot, kept for reinstalls and state
    samples: Vec<Option<Arc<SampleBuffer>>>,
    output: Option<CpalOutput>,
}

impl Controller {
    pub fn new(project: Project, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let initial = Arc::new(project.clone());
        let snapshot = Arc::new(ArcSwap::new(Arc::clone(&initial)));
        let (commands, commands_rx) = HeapRb::<EngineCommand>::new(config.command_capacity).split();
        let (retired_tx, retired) = HeapRb::<Retired>::new(config.command_capacity).split();
        let playhead = Arc::new(SharedPlayhead::default());

        let mut controller = Self {
            config,
            project,
            snapshot: Arc::clone(&snapshot),
            retired_snapshots: Vec::new(),
            commands,
            retired,
            playhead: Arc::clone(&playhead),
            render: None,
            samples: vec![None; MAX_INSTRUMENTS],
            output: None,
        };
        let engine = controller.build_engine(initial);
        controller.render = Some(RenderContext::new(engine, snapshot, commands_rx, retired_tx, playhead));
        info!(
            title = %controller.project.title,
            rate = controller.config.sample_rate,
            max_block = controller.config.max_block_size,
            "controller ready"
        );
        Ok(controller)
    }

    /// An engine with every instrument's processor and sample installed.
    fn build_engine(&self, project: Arc<Project>) -> Engine {
        let mut engine = Engine::new(Arc::clone(&project), self.config.sample_rate, self.config.max_block_size);
        for index in 0..project.instruments.len() {
            if let Some(p) = self.processor_for(index) {
                engine.install_processor(index, p);
            }
        }
        engine
    }

    /// A fresh processor for instrument `index` at the configured rate.
    fn processor_for(&self, index: usize) -> Option<InstrumentProcessor> {
        let inst = self.project.instrument(index)?;
        let mut p = InstrumentProcessor::for_instrument(inst, self.config.sample_rate as f32);
        if let Some(sample) = self.samples.get(index).cloned().flatten() {
            p.set_sample(Some(sample));
        }
        Some(p)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    // --- Document ---

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Apply an edit and publish the result. Returns whether anything
    /// changed.
    pub fn apply(&mut self, edit: Edit) -> bool {
        let reinstall = match &edit {
            Edit::SetInstrumentKind { instrument, .. } => Some(*instrument),
            Edit::AddInstrument(_) => Some(self.project.instruments.len()),
            _ => None,
        };
        if !self.project.apply(edit) {
            return false;
        }
        self.publish();
        if let Some(index) = reinstall {
            if let Err(err) = self.reinstall(index) {
                warn!(index, %err, "processor not installed");
            }
        }
        true
    }

    /// Replace the whole project. Every processor is rebuilt and loaded
    /// samples are dropped.
    pub fn load_project(&mut self, project: Project) -> Result<()> {
        self.send(EngineCommand::Stop)?;
        let previous = self.project.instruments.len();
        self.project = project;
        self.samples.iter_mut().for_each(|s| *s = None);
        self.publish();
        for index in 0..self.project.instruments.len().max(previous).min(MAX_INSTRUMENTS) {
            if index < self.project.instruments.len() {
                self.reinstall(index)?;
            } else {
                self.send(EngineCommand::RemoveProcessor { index })?;
            }
        }
        info!(title = %self.project.title, instruments = self.project.instruments.len(), "loaded project");
        Ok(())
    }

    /// Publish the current document to the render side.
    pub fn publish(&mut self) {
        let next = Arc::new(self.project.clone());
        let previous = self.snapshot.swap(next);
        self.retired_snapshots.push(previous);
        self.collect();
        debug!(held = self.retired_snapshots.len(), "published snapshot");
    }

    /// Drop snapshots and processors the render side has let go of.
    pub fn collect(&mut self) {
        self.retired_snapshots.retain(|s| Arc::strong_count(s) > 1);
        while let Some(retired) = self.retired.try_pop() {
            debug!(index = retired.index, kind = retired.kind.name(), "dropped retired processor");
        }
    }

    fn reinstall(&mut self, index: usize) -> Result<()> {
        let processor = self.processor_for(index).ok_or(ControllerError::NoInstrument(index))?;
        debug!(index, kind = processor.kind().name(), "installing processor");
        self.send(EngineCommand::InstallProcessor { index, processor })
    }

    fn send(&mut self, command: EngineCommand) -> Result<()> {
        self.collect();
        let name = command.name();
        self.commands.try_push(command).map_err(|_| ControllerError::QueueFull(name))
    }

    // --- Transport and preview ---

    pub fn play(&mut self) -> Result<()> {
        self.send(EngineCommand::Play)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.send(EngineCommand::Stop)
    }

    pub fn panic(&mut self) -> Result<()> {
        self.send(EngineCommand::Panic)
    }

    pub fn set_play_mode(&mut self, mode: PlayMode) -> Result<()> {
        self.send(EngineCommand::SetPlayMode(mode))
    }

    pub fn set_pattern(&mut self, pattern: usize) -> Result<()> {
        self.send(EngineCommand::SetPattern(pattern))
    }

    pub fn trigger_note(&mut self, track: usize, note: u8, instrument: usize, velocity: f32) -> Result<()> {
        self.send(EngineCommand::TriggerNote { track, note, instrument, velocity })
    }

    pub fn trigger_step(&mut self, track: usize, step: Step) -> Result<()> {
        self.send(EngineCommand::TriggerStep { track, step })
    }

    pub fn release_note(&mut self, track: usize) -> Result<()> {
        self.send(EngineCommand::ReleaseNote { track })
    }

    pub fn start_preview(&mut self, instrument: usize, velocity: f32) -> Result<()> {
        self.send(EngineCommand::StartPreview { instrument, velocity })
    }

    pub fn stop_preview(&mut self, instrument: usize) -> Result<()> {
        self.send(EngineCommand::StopPreview { instrument })
    }

    // --- Playhead ---

    pub fn position(&self) -> Playhead {
        self.playhead.position()
    }

    pub fn active_voices(&self, instrument: usize) -> usize {
        self.playhead.active_voices(instrument)
    }

    pub fn playhead(&self) -> &Arc<SharedPlayhead> {
        &self.playhead
    }

    // --- Samples, patches and state ---

    /// Load interleaved sample data into a sampler or slicer. Returns false,
    /// keeping the previous sample, when the data is unusable or the
    /// instrument plays no samples.
    pub fn load_sample(&mut self, instrument: usize, data: &[f32], sample_rate: u32, channels: usize) -> bool {
        let Some(mut processor) = self.processor_for(instrument) else {
            warn!(instrument, "sample load for a missing instrument");
            return false;
        };
        if !processor.load_sample(data, sample_rate, channels) {
            warn!(instrument, kind = processor.kind().name(), frames = data.len() / channels.max(1), "sample rejected");
            return false;
        }
        let sample = processor.sample().cloned();
        if let Err(err) = self.send(EngineCommand::InstallProcessor { index: instrument, processor }) {
            warn!(instrument, %err, "sample not installed");
            return false;
        }
        info!(instrument, rate = sample_rate, channels, "loaded sample");
        self.samples[instrument] = sample;
        true
    }

    /// Decode a WAV file and load it as the instrument's sample.
    pub fn load_wav(&mut self, instrument: usize, bytes: &[u8]) -> Result<bool> {
        let wav = tb_formats::read_wav(bytes)?;
        Ok(self.load_sample(instrument, &wav.samples, wav.sample_rate, wav.channels as usize))
    }

    pub fn sample(&self, instrument: usize) -> Option<&Arc<SampleBuffer>> {
        self.samples.get(instrument)?.as_ref()
    }

    /// Import voice `voice` of a patch file (sysex dump or bare patch) into
    /// an FM instrument. Returns how many voices the file holds.
    pub fn import_patch(&mut self, instrument: usize, bytes: &[u8], voice: usize) -> Result<usize> {
        let kind = self.project.instrument(instrument).ok_or(ControllerError::NoInstrument(instrument))?.kind();
        if kind != InstrumentKind::Fm {
            return Err(ControllerError::WrongKind { instrument, expected: InstrumentKind::Fm, found: kind });
        }
        let patches = tb_formats::load_patches(bytes)?;
        let patch = patches
            .get(voice)
            .ok_or(ControllerError::VoiceOutOfRange { voice, count: patches.len() })?;
        if let Some(inst) = self.project.instrument_mut(instrument) {
            inst.engine = EngineParams::Fm { params: FmParams::from_patch(patch) };
        }
        let mut name = [0u8; 10];
        let len = patch.name_str(&mut name);
        info!(instrument, voice, name = %String::from_utf8_lossy(&name[..len]), "imported patch");
        self.publish();
        Ok(patches.len())
    }

    /// Snapshot an instrument's parameters and sample.
    pub fn instrument_state(&self, instrument: usize) -> Option<Vec<u8>> {
        let inst = self.project.instrument(instrument)?;
        let sample = self.samples.get(instrument).and_then(|s| s.as_deref());
        Some(state::encode(&inst.engine, sample))
    }

    /// Restore a snapshot from [`Controller::instrument_state`]. The
    /// instrument takes the snapshot's engine kind. On error nothing changes.
    pub fn restore_instrument_state(&mut self, instrument: usize, bytes: &[u8]) -> Result<()> {
        if self.project.instrument(instrument).is_none() {
            return Err(ControllerError::NoInstrument(instrument));
        }
        let InstrumentState { params, sample } = state::decode(bytes).map_err(|err| {
            warn!(instrument, %err, "instrument state rejected");
            ControllerError::State(err)
        })?;
        if let Some(inst) = self.project.instrument_mut(instrument) {
            inst.engine = params;
        }
        self.samples[instrument] = sample.map(Arc::new);
        self.publish();
        self.reinstall(instrument)
    }

    /// Add a manual slice point near `frame`, snapped to the nearest zero
    /// crossing. Returns the stored frame, or `None` when the point already
    /// exists or the slice list is full.
    pub fn insert_slice(&mut self, instrument: usize, frame: usize) -> Result<Option<u32>> {
        let kind = self.project.instrument(instrument).ok_or(ControllerError::NoInstrument(instrument))?.kind();
        if kind != InstrumentKind::Slicer {
            return Err(ControllerError::WrongKind { instrument, expected: InstrumentKind::Slicer, found: kind });
        }
        let sample = self.sample(instrument).ok_or(ControllerError::NoSample(instrument))?;
        let mono = sample.to_mono();
        let snapped = nearest_zero_crossing(&mono, frame.min(mono.len().saturating_sub(1)), SLICE_SNAP_RADIUS) as u32;
        if self.apply(Edit::InsertSlice { instrument, frame: snapped }) {
            debug!(instrument, frame, snapped, "inserted slice");
            Ok(Some(snapped))
        } else {
            Ok(None)
        }
    }

    /// Add a manual slice point where the slicer preview is playing.
    pub fn insert_slice_at_preview(&mut self, instrument: usize) -> Result<Option<u32>> {
        let frame = self.playhead.preview_position(instrument).ok_or(ControllerError::NoPreview(instrument))?;
        self.insert_slice(instrument, frame)
    }

    // --- Rendering ---

    /// Hand the render context to a custom host. Afterwards the controller
    /// can no longer open an audio device.
    pub fn take_render_context(&mut self) -> Option<RenderContext> {
        self.render.take()
    }

    /// Open the default audio device and start rendering into it.
    pub fn start_audio(&mut self) -> Result<()> {
        if let Some(output) = self.output.as_mut() {
            output.start()?;
            return Ok(());
        }
        let mut ctx = self.render.take().ok_or(ControllerError::RenderDetached)?;
        let mut output = CpalOutput::new(self.config.max_block_size)?;
        let device_rate = output.sample_rate();
        if device_rate != ctx.sample_rate() {
            info!(configured = ctx.sample_rate(), device = device_rate, "following the device sample rate");
            self.config.sample_rate = device_rate;
            ctx = self.rebuild_render_context(ctx);
        }
        output.build_stream(move |l, r| ctx.render(l, r))?;
        output.start()?;
        self.output = Some(output);
        Ok(())
    }

    /// Pause the audio device, if one is open.
    pub fn stop_audio(&mut self) -> Result<()> {
        if let Some(output) = self.output.as_mut() {
            output.stop()?;
        }
        Ok(())
    }

    /// A render context at the current config, reusing the queues.
    fn rebuild_render_context(&self, ctx: RenderContext) -> RenderContext {
        let (commands, retired, playhead) = ctx.into_parts();
        let engine = self.build_engine(self.snapshot.load_full());
        RenderContext::new(engine, Arc::clone(&self.snapshot), commands, retired, playhead)
    }

    /// Render `frames` frames of the current document in `mode`, from the
    /// top, on a private engine.
    pub fn render_offline(&self, mode: PlayMode, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut engine = self.build_engine(Arc::new(self.project.clone()));
        offline::render(&mut engine, mode, frames)
    }

    /// [`Controller::render_offline`] encoded as a stereo WAV file.
    pub fn render_to_wav(&self, mode: PlayMode, frames: usize, format: SampleFormat) -> Result<Vec<u8>> {
        let (left, right) = self.render_offline(mode, frames);
        Ok(tb_formats::wav_bytes(&left, &right, self.config.sample_rate, format)?)
    }

    /// Frames one full pass of the arrangement lasts: the current pattern
    /// in pattern mode, every song row in song mode.
    pub fn arrangement_frames(&self, mode: PlayMode, pattern: usize) -> usize {
        offline::arrangement_frames(&self.project, mode, pattern, self.config.sample_rate)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(mut output) = self.output.take() {
            let _ = output.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_engine::TransportState;
    use tb_formats::write_voice_syx;
    use tb_ir::FmPatch;

    fn controller(kinds: &[InstrumentKind]) -> Controller {
        let mut project = Project::new("test");
        for &kind in kinds {
            project.add_instrument_kind(kind.name(), kind);
        }
        Controller::new(project, EngineConfig::default()).unwrap()
    }

    fn render(ctx: &mut RenderContext, frames: usize) {
        let mut l = vec![0.0f32; 256];
        let mut r = vec![0.0f32; 256];
        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(256);
            ctx.render(&mut l[..n], &mut r[..n]);
            done += n;
        }
    }

    /// +0.5 / -0.5 halves of 100 frames each: zero crossings every 100.
    fn square_sample(frames: usize) -> Vec<f32> {
        (0..frames).map(|i| if (i / 100) % 2 == 0 { 0.5 } else { -0.5 }).collect()
    }

    // === Snapshots ===

    #[test]
    fn snapshots_are_reclaimed_after_the_render_side_moves_on() {
        let mut c = controller(&[InstrumentKind::Analog]);
        let mut ctx = c.take_render_context().unwrap();
        assert!(c.apply(Edit::SetTempo(90.0)));
        // the engine still reads the initial snapshot
        assert_eq!(c.retired_snapshots.len(), 1);
        render(&mut ctx, 256);
        c.collect();
        assert!(c.retired_snapshots.is_empty());
        assert_eq!(ctx.engine().project().tempo(), 90.0);
    }

    #[test]
    fn rejected_edit_publishes_nothing() {
        let mut c = controller(&[]);
        assert!(!c.apply(Edit::SetStep { pattern: 7, row: 0, track: 0, step: Step::note(60, 0) }));
        assert!(c.retired_snapshots.is_empty());
    }

    #[test]
    fn kind_change_installs_a_new_processor() {
        let mut c = controller(&[InstrumentKind::Analog]);
        let mut ctx = c.take_render_context().unwrap();
        assert!(c.apply(Edit::SetInstrumentKind { instrument: 0, kind: InstrumentKind::Fm }));
        render(&mut ctx, 64);
        assert_eq!(ctx.engine().processor(0).map(|p| p.kind()), Some(InstrumentKind::Fm));

        assert!(c.apply(Edit::AddInstrument(tb_ir::Instrument::new("pad", InstrumentKind::MacroOsc))));
        render(&mut ctx, 64);
        assert_eq!(ctx.engine().processor(1).map(|p| p.kind()), Some(InstrumentKind::MacroOsc));
    }

    // === Commands and playhead ===

    #[test]
    fn playhead_follows_transport() {
        let mut c = controller(&[InstrumentKind::Analog]);
        let mut ctx = c.take_render_context().unwrap();
        c.play().unwrap();
        // 120 BPM at 48 kHz: 6000 samples per row
        render(&mut ctx, 24_000);
        let pos = c.position();
        assert_eq!(pos.state, TransportState::Playing);
        assert_eq!(pos.row, 4);
        c.stop().unwrap();
        render(&mut ctx, 256);
        assert_eq!(c.position().state, TransportState::Stopped);
        assert_eq!(c.playhead().blocks(), 24_000usize.div_ceil(256) + 1);
    }

    #[test]
    fn preview_notes_sound_while_stopped() {
        let mut c = controller(&[InstrumentKind::Analog]);
        let mut ctx = c.take_render_context().unwrap();
        c.trigger_note(0, 60, 0, 1.0).unwrap();
        render(&mut ctx, 512);
        assert_eq!(c.active_voices(0), 1);
        let (l, r) = c.playhead().peak();
        assert!(l > 0.0 && r > 0.0);
    }

    #[test]
    fn full_queue_reports_the_dropped_command() {
        let config = EngineConfig { command_capacity: 2, ..EngineConfig::default() };
        let mut c = Controller::new(Project::new("q"), config).unwrap();
        c.play().unwrap();
        c.stop().unwrap();
        assert!(matches!(c.play(), Err(ControllerError::QueueFull("play"))));
    }

    // === Samples, patches and state ===

    #[test]
    fn sample_load_is_refused_by_synths() {
        let mut c = controller(&[InstrumentKind::Analog, InstrumentKind::Sampler]);
        let data = square_sample(4800);
        assert!(!c.load_sample(0, &data, 48_000, 1));
        assert!(!c.load_sample(5, &data, 48_000, 1));
        assert!(!c.load_sample(1, &[], 48_000, 1));
        assert!(c.load_sample(1, &data, 48_000, 1));
        assert_eq!(c.sample(1).map(|s| s.frames()), Some(4800));
    }

    #[test]
    fn patch_import_updates_the_document() {
        let mut c = controller(&[InstrumentKind::Fm, InstrumentKind::Analog]);
        let patch = FmPatch { algorithm: 5, ..FmPatch::init_voice() };
        let syx = write_voice_syx(&patch, 0).unwrap();
        assert_eq!(c.import_patch(0, &syx, 0).unwrap(), 1);
        assert_eq!(c.project().instrument(0).and_then(|i| i.engine.get_parameter(134)), Some(5.0));
        assert!(matches!(c.import_patch(0, &syx, 1), Err(ControllerError::VoiceOutOfRange { voice: 1, count: 1 })));
        assert!(matches!(c.import_patch(1, &syx, 0), Err(ControllerError::WrongKind { .. })));
        assert!(matches!(c.import_patch(0, &[0u8; 3], 0), Err(ControllerError::Format(_))));
    }

    #[test]
    fn state_round_trip_restores_params_and_sample() {
        let mut c = controller(&[InstrumentKind::Sampler]);
        assert!(c.load_sample(0, &square_sample(1000), 44_100, 1));
        let state = c.instrument_state(0).unwrap();

        assert!(c.apply(Edit::SetInstrumentParam { instrument: 0, index: 0, value: 0.3 }));
        assert!(c.load_sample(0, &square_sample(10), 44_100, 1));
        c.restore_instrument_state(0, &state).unwrap();
        assert_eq!(c.project().instrument(0).and_then(|i| i.engine.get_parameter(0)), Some(0.0));
        assert_eq!(c.sample(0).map(|s| s.frames()), Some(1000));

        assert!(matches!(c.restore_instrument_state(0, b"junk"), Err(ControllerError::State(_))));
        assert_eq!(c.sample(0).map(|s| s.frames()), Some(1000));
    }

    // === Manual slices ===

    #[test]
    fn slices_snap_to_zero_crossings() {
        let mut c = controller(&[InstrumentKind::Slicer]);
        assert!(matches!(c.insert_slice(0, 130), Err(ControllerError::NoSample(0))));
        assert!(c.load_sample(0, &square_sample(2000), 48_000, 1));
        assert_eq!(c.insert_slice(0, 130).unwrap(), Some(100));
        // snaps onto the same crossing
        assert_eq!(c.insert_slice(0, 90).unwrap(), None);
        assert_eq!(c.insert_slice(0, 1_000_000).unwrap(), Some(1900));
    }

    #[test]
    fn slice_at_preview_position() {
        let mut c = controller(&[InstrumentKind::Slicer]);
        let mut ctx = c.take_render_context().unwrap();
        assert!(c.load_sample(0, &square_sample(48_000), 48_000, 1));
        assert!(matches!(c.insert_slice_at_preview(0), Err(ControllerError::NoPreview(0))));
        c.start_preview(0, 1.0).unwrap();
        render(&mut ctx, 4800);
        let frame = c.insert_slice_at_preview(0).unwrap().expect("new slice");
        assert_eq!(frame % 100, 0);
        assert!(frame.abs_diff(4800) <= 300);
    }

    // === Offline ===

    #[test]
    fn offline_render_has_requested_length() {
        let c = Controller::new(crate::demo_project(), EngineConfig::default()).unwrap();
        let frames = c.arrangement_frames(PlayMode::Pattern, 0);
        let (l, r) = c.render_offline(PlayMode::Pattern, frames);
        assert_eq!(l.len(), frames);
        assert_eq!(r.len(), frames);
        assert!(l.iter().any(|s| s.abs() > 0.01));
        let wav = c.render_to_wav(PlayMode::Pattern, 4800, SampleFormat::Int16).unwrap();
        assert_eq!(wav.len(), 44 + 4800 * 4);
    }
}
