//! The sequencer engine: transport, row firing and the instrument mix.
//!
//! The engine reads an immutable project snapshot. Rows fire at exact
//! fractional sample positions from the [`RowClock`]; between boundaries
//! every installed processor renders a segment which then passes through
//! its insert chain, instrument gain and the FX-bus sends.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use tb_ir::{
    EffectCommand, Note, Pattern, Project, Step, DEFAULT_ROWS, MAX_EFFECTS, MAX_INSTRUMENTS, MAX_TRACKS,
};

use crate::command::{EngineCommand, PlayMode, Retired, TransportState};
use crate::dsp::{FxBuses, InsertChain};
use crate::modulation::ModOutputs;
use crate::processors::{InstrumentProcessor, Processor, NO_EFFECTS};
use crate::timing::RowClock;
use crate::voice_pool::VoiceHandle;

/// Default block length the scratch buffers are sized for.
pub const DEFAULT_MAX_BLOCK: usize = 1024;

/// Where playback is, for display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Playhead {
    pub state: TransportState,
    pub mode: PlayMode,
    /// Pattern row, or rows into the current song row in song mode
    pub row: u16,
    pub pattern: usize,
    pub song_row: usize,
    /// Chain entry each song column is on; `None` when the column is idle
    pub chain_entries: [Option<u8>; MAX_TRACKS],
}

#[derive(Clone, Copy, Debug, Default)]
struct TrackState {
    voice: Option<(usize, VoiceHandle)>,
    /// Pitch of the last note, the portamento origin
    last_pitch: Option<f32>,
}

#[derive(Clone, Copy, Debug, Default)]
struct ColumnState {
    entry: usize,
    row: u16,
}

#[derive(Debug)]
struct InstrumentSlot {
    processor: Option<InstrumentProcessor>,
    insert: InsertChain,
}

/// Left/right gains for instrument balance; centre is unity.
#[inline]
fn balance(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    ((1.0 - pan).min(1.0), (1.0 + pan).min(1.0))
}

fn pattern_rows(pattern: Option<&Pattern>) -> u16 {
    pattern.map_or(DEFAULT_ROWS, Pattern::rows).max(1)
}

#[derive(Debug)]
pub struct Engine {
    project: Arc<Project>,
    slots: Vec<InstrumentSlot>,
    buses: FxBuses,
    scratch_l: Vec<f32>,
    scratch_r: Vec<f32>,
    clock: RowClock,
    sample_rate: u32,
    max_block: usize,

    state: TransportState,
    mode: PlayMode,
    pattern: usize,
    /// Pattern row, or rows elapsed in the current song row
    row: u16,
    song_row: usize,
    columns: [ColumnState; MAX_TRACKS],
    tracks: [TrackState; MAX_TRACKS],
    /// The current row has not fired yet
    row_pending: bool,
}

impl Engine {
    /// Build an engine for `project`. Allocates every buffer the render
    /// path needs; processors are installed separately.
    pub fn new(project: Arc<Project>, sample_rate: u32, max_block: usize) -> Self {
        let max_block = max_block.max(1);
        let sr = sample_rate as f32;
        let clock = RowClock::new(sample_rate, project.tempo());
        let mut buses = FxBuses::new(sr, max_block);
        buses.configure(&project.mixer, clock.timing().samples_per_beat);
        let slots = (0..MAX_INSTRUMENTS)
            .map(|_| InstrumentSlot { processor: None, insert: InsertChain::new(sr) })
            .collect();
        let mut engine = Self {
            project,
            slots,
            buses,
            scratch_l: vec![0.0; max_block],
            scratch_r: vec![0.0; max_block],
            clock,
            sample_rate,
            max_block,
            state: TransportState::Stopped,
            mode: PlayMode::Pattern,
            pattern: 0,
            row: 0,
            song_row: 0,
            columns: [ColumnState::default(); MAX_TRACKS],
            tracks: [TrackState::default(); MAX_TRACKS],
            row_pending: false,
        };
        engine.sync_inserts();
        engine
    }

    /// An engine with a processor installed for every instrument of the
    /// project. For offline use; allocates.
    pub fn with_processors(project: Arc<Project>, sample_rate: u32, max_block: usize) -> Self {
        let mut engine = Self::new(Arc::clone(&project), sample_rate, max_block);
        for (i, inst) in project.instruments.iter().enumerate() {
            engine.install_processor(i, InstrumentProcessor::for_instrument(inst, sample_rate as f32));
        }
        engine
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    pub fn project(&self) -> &Arc<Project> {
        &self.project
    }

    pub fn samples_per_row(&self) -> f64 {
        self.clock.samples_per_row()
    }

    // --- Transport ---

    /// Start from the top. The first row fires at the next rendered sample.
    pub fn play(&mut self) {
        self.row = 0;
        self.song_row = 0;
        self.columns = [ColumnState::default(); MAX_TRACKS];
        self.clock.reset();
        for p in self.slots.iter_mut().filter_map(|s| s.processor.as_mut()) {
            p.reset_modulation();
        }
        self.row_pending = true;
        self.state = TransportState::Playing;
    }

    /// Release every voice and stop the row clock. Tails keep ringing.
    pub fn stop(&mut self) {
        for p in self.slots.iter_mut().filter_map(|s| s.processor.as_mut()) {
            p.all_notes_off();
        }
        for t in &mut self.tracks {
            t.voice = None;
        }
        self.row_pending = false;
        self.state = TransportState::Stopped;
    }

    /// Silence everything at once.
    pub fn panic(&mut self) {
        self.stop();
        for slot in &mut self.slots {
            if let Some(p) = slot.processor.as_mut() {
                p.kill_all();
            }
            slot.insert.reset();
        }
        self.buses.reset();
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn set_play_mode(&mut self, mode: PlayMode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        self.row = 0;
        self.song_row = 0;
        self.columns = [ColumnState::default(); MAX_TRACKS];
    }

    /// Select the pattern played in pattern mode. The row wraps into the
    /// new pattern's length.
    pub fn set_current_pattern(&mut self, pattern: usize) {
        self.pattern = pattern;
        if self.mode == PlayMode::Pattern {
            self.row %= pattern_rows(self.project.pattern(pattern));
        }
    }

    // --- Preview ---

    /// Play a note on a track, in either transport state.
    pub fn trigger_note(&mut self, track: usize, note: u8, instrument: usize, velocity: f32) {
        self.start_note(track, note, instrument, velocity, &NO_EFFECTS);
    }

    /// Play a step as the sequencer would, effects included.
    pub fn trigger_step(&mut self, track: usize, step: Step) {
        self.play_step(track, step);
    }

    pub fn release_note(&mut self, track: usize) {
        if let Some(t) = self.tracks.get_mut(track) {
            if let Some((inst, handle)) = t.voice.take() {
                if let Some(p) = self.slots.get_mut(inst).and_then(|s| s.processor.as_mut()) {
                    p.note_off(handle);
                }
            }
        }
    }

    pub fn start_preview(&mut self, instrument: usize, velocity: f32) {
        if let Some(p) = self.processor_mut(instrument) {
            p.start_preview(velocity);
        }
    }

    pub fn stop_preview(&mut self, instrument: usize) {
        if let Some(p) = self.processor_mut(instrument) {
            p.stop_preview();
        }
    }

    // --- Snapshot and processor intake ---

    /// Take a new document snapshot. Returns the previous one; the caller
    /// decides where it is dropped.
    pub fn set_project(&mut self, project: Arc<Project>) -> Arc<Project> {
        let old = core::mem::replace(&mut self.project, project);
        let tempo_changed = self.clock.set_tempo(self.sample_rate, self.project.tempo());
        if tempo_changed {
            let spt = self.clock.samples_per_tick();
            for p in self.slots.iter_mut().filter_map(|s| s.processor.as_mut()) {
                p.set_samples_per_tick(spt);
            }
        }
        if tempo_changed || old.mixer != self.project.mixer {
            self.buses.configure(&self.project.mixer, self.clock.timing().samples_per_beat);
        }
        for (slot, inst) in self.slots.iter_mut().zip(self.project.instruments.iter()) {
            if let Some(p) = slot.processor.as_mut() {
                p.sync(inst);
            }
        }
        self.sync_inserts();
        if self.mode == PlayMode::Pattern {
            self.row %= pattern_rows(self.project.pattern(self.pattern));
        }
        old
    }

    fn sync_inserts(&mut self) {
        for (slot, inst) in self.slots.iter_mut().zip(self.project.instruments.iter()) {
            if *slot.insert.params() != inst.insert {
                slot.insert.configure(&inst.insert);
            }
        }
    }

    /// Put a processor in slot `index`, returning the one it replaces. An
    /// out-of-range index hands the new processor straight back.
    pub fn install_processor(&mut self, index: usize, mut processor: InstrumentProcessor) -> Option<InstrumentProcessor> {
        if index >= self.slots.len() {
            return Some(processor);
        }
        processor.set_samples_per_tick(self.clock.samples_per_tick());
        if let Some(inst) = self.project.instrument(index) {
            processor.sync(inst);
        }
        self.forget_voices(index);
        let slot = &mut self.slots[index];
        slot.insert.reset();
        slot.processor.replace(processor)
    }

    pub fn remove_processor(&mut self, index: usize) -> Option<InstrumentProcessor> {
        self.forget_voices(index);
        self.slots.get_mut(index)?.processor.take()
    }

    fn forget_voices(&mut self, instrument: usize) {
        for t in &mut self.tracks {
            if matches!(t.voice, Some((i, _)) if i == instrument) {
                t.voice = None;
            }
        }
    }

    /// Apply a queued command. Returns a processor the edit context must drop.
    pub fn apply_command(&mut self, command: EngineCommand) -> Option<Retired> {
        match command {
            EngineCommand::Play => self.play(),
            EngineCommand::Stop => self.stop(),
            EngineCommand::Panic => self.panic(),
            EngineCommand::SetPlayMode(mode) => self.set_play_mode(mode),
            EngineCommand::SetPattern(p) => self.set_current_pattern(p),
            EngineCommand::TriggerNote { track, note, instrument, velocity } => {
                self.trigger_note(track, note, instrument, velocity)
            }
            EngineCommand::TriggerStep { track, step } => self.trigger_step(track, step),
            EngineCommand::ReleaseNote { track } => self.release_note(track),
            EngineCommand::InstallProcessor { index, processor } => {
                return self
                    .install_processor(index, processor)
                    .map(|processor| Retired { index, kind: processor.kind(), processor });
            }
            EngineCommand::RemoveProcessor { index } => {
                return self
                    .remove_processor(index)
                    .map(|processor| Retired { index, kind: processor.kind(), processor });
            }
            EngineCommand::StartPreview { instrument, velocity } => self.start_preview(instrument, velocity),
            EngineCommand::StopPreview { instrument } => self.stop_preview(instrument),
        }
        None
    }

    // --- Queries ---

    pub fn position(&self) -> Playhead {
        let mut chain_entries = [None; MAX_TRACKS];
        if self.mode == PlayMode::Song {
            for (c, entry) in chain_entries.iter_mut().enumerate() {
                if !self.column_done(c) {
                    *entry = Some(self.columns[c].entry as u8);
                }
            }
        }
        Playhead {
            state: self.state,
            mode: self.mode,
            row: self.row,
            pattern: self.pattern,
            song_row: self.song_row,
            chain_entries,
        }
    }

    pub fn processor(&self, instrument: usize) -> Option<&InstrumentProcessor> {
        self.slots.get(instrument)?.processor.as_ref()
    }

    pub fn processor_mut(&mut self, instrument: usize) -> Option<&mut InstrumentProcessor> {
        self.slots.get_mut(instrument)?.processor.as_mut()
    }

    pub fn active_voices(&self, instrument: usize) -> usize {
        self.processor(instrument).map_or(0, |p| p.active_voices())
    }

    pub fn modulation(&self, instrument: usize) -> Option<&ModOutputs> {
        self.processor(instrument)?.modulation()
    }

    pub fn preview_position(&self, instrument: usize) -> Option<u32> {
        self.processor(instrument)?.preview_position()
    }

    // --- Row firing ---

    fn column_chain(&self, column: usize) -> Option<&tb_ir::Chain> {
        let chain = self.project.song().cell(column, self.song_row)?;
        self.project.chain(chain as usize)
    }

    fn column_done(&self, column: usize) -> bool {
        self.column_chain(column).map_or(true, |c| self.columns[column].entry >= c.len())
    }

    /// The step a track plays on the current row, transposed by its chain
    /// entry in song mode.
    fn current_step(&self, track: usize) -> Option<Step> {
        match self.mode {
            PlayMode::Pattern => self.project.pattern(self.pattern)?.step(self.row, track).copied(),
            PlayMode::Song => {
                let col = self.columns[track];
                let chain = self.column_chain(track)?;
                let entry = chain.entry(col.entry)?;
                let mut step = *self.project.pattern(entry.pattern as usize)?.step(col.row, track)?;
                if let Note::On(n) = step.note {
                    step.note = Note::On(chain.transpose(col.entry, n));
                }
                Some(step)
            }
        }
    }

    fn fire_row(&mut self) {
        for track in 0..MAX_TRACKS {
            if let Some(step) = self.current_step(track) {
                self.play_step(track, step);
            }
        }
    }

    fn play_step(&mut self, track: usize, step: Step) {
        if !self.project.mixer().track_audible(track) {
            return;
        }
        match step.note {
            Note::On(note) => {
                let Some(inst) = step.instrument else {
                    return;
                };
                let velocity = step.velocity() * self.project.mixer().track_volume[track];
                self.start_note(track, note, inst as usize, velocity, &step.effects);
            }
            Note::Off => self.release_note(track),
            Note::None => {}
        }
    }

    fn start_note(
        &mut self,
        track: usize,
        note: u8,
        instrument: usize,
        velocity: f32,
        effects: &[EffectCommand; MAX_EFFECTS],
    ) {
        if track >= MAX_TRACKS || self.project.instrument(instrument).is_none() {
            return;
        }
        let previous = self.tracks[track].last_pitch;
        let Some(p) = self.slots.get_mut(instrument).and_then(|s| s.processor.as_mut()) else {
            return;
        };
        let voice = p.note_on_with_fx(note, velocity.clamp(0.0, 1.0), effects, previous).map(|h| (instrument, h));
        let t = &mut self.tracks[track];
        let old = core::mem::replace(&mut t.voice, voice);
        t.last_pitch = Some(note as f32);
        // mono legato hands back the same voice
        if let Some((inst, handle)) = old.filter(|o| Some(*o) != voice) {
            if let Some(p) = self.slots.get_mut(inst).and_then(|s| s.processor.as_mut()) {
                p.note_off(handle);
            }
        }
    }

    /// Step the position past a row boundary.
    fn advance_position(&mut self) {
        match self.mode {
            PlayMode::Pattern => {
                self.row += 1;
                if self.row >= pattern_rows(self.project.pattern(self.pattern)) {
                    self.row = 0;
                }
            }
            PlayMode::Song => {
                self.row = self.row.saturating_add(1);
                for c in 0..MAX_TRACKS {
                    let Some(chain) = self.column_chain(c) else {
                        continue;
                    };
                    let col = self.columns[c];
                    let Some(entry) = chain.entry(col.entry) else {
                        continue;
                    };
                    let rows = pattern_rows(self.project.pattern(entry.pattern as usize));
                    let col = &mut self.columns[c];
                    col.row += 1;
                    if col.row >= rows {
                        col.row = 0;
                        col.entry += 1;
                    }
                }
                if (0..MAX_TRACKS).all(|c| self.column_done(c)) {
                    let len = self.project.song().len();
                    self.song_row = if self.song_row + 1 >= len { 0 } else { self.song_row + 1 };
                    self.row = 0;
                    self.columns = [ColumnState::default(); MAX_TRACKS];
                }
            }
        }
    }

    /// Fire the pending first row and every boundary that has been reached.
    fn fire_due_rows(&mut self) {
        if self.row_pending {
            self.row_pending = false;
            self.fire_row();
        }
        while self.clock.row_due() {
            self.clock.advance_row();
            self.advance_position();
            self.fire_row();
        }
    }

    // --- Rendering ---

    /// Render `min(out_l.len(), out_r.len())` frames, overwriting the outputs.
    pub fn render_block(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        #[cfg(all(feature = "alloc_check", debug_assertions))]
        {
            assert_no_alloc::assert_no_alloc(|| self.render_block_inner(out_l, out_r));
        }
        #[cfg(not(all(feature = "alloc_check", debug_assertions)))]
        self.render_block_inner(out_l, out_r);
    }

    fn render_block_inner(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let n = out_l.len().min(out_r.len());
        out_l[..n].fill(0.0);
        out_r[..n].fill(0.0);
        let mut start = 0;
        while start < n {
            let len = (n - start).min(self.max_block);
            self.render_piece(&mut out_l[start..start + len], &mut out_r[start..start + len]);
            start += len;
        }
    }

    /// At most `max_block` frames.
    fn render_piece(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let n = out_l.len();
        self.buses.clear_sends(n);
        if self.state == TransportState::Playing {
            let mut pos = 0;
            while pos < n {
                self.fire_due_rows();
                let todo = self.clock.chunk(n - pos).max(1);
                self.render_instruments(out_l, out_r, pos, todo);
                self.clock.consume(todo);
                pos += todo;
            }
            self.fire_due_rows();
        } else {
            self.render_instruments(out_l, out_r, 0, n);
        }
        self.buses.process_into(out_l, out_r);
        let master = self.project.mixer().master_volume;
        for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
            *l *= master;
            *r *= master;
        }
    }

    /// Mix every instrument into `out[offset..offset + len]`.
    fn render_instruments(&mut self, out_l: &mut [f32], out_r: &mut [f32], offset: usize, len: usize) {
        let Self { project, slots, buses, scratch_l, scratch_r, .. } = self;
        let any_solo = project.any_instrument_solo();
        for (slot, inst) in slots.iter_mut().zip(project.instruments.iter()) {
            let Some(p) = slot.processor.as_mut() else {
                continue;
            };
            let (sl, sr) = (&mut scratch_l[..len], &mut scratch_r[..len]);
            sl.fill(0.0);
            sr.fill(0.0);
            p.render(sl, sr);
            slot.insert.process(sl, sr);
            if inst.mute || (any_solo && !inst.solo) {
                continue;
            }
            let (bl, br) = balance(inst.pan);
            let (gl, gr) = (bl * inst.volume, br * inst.volume);
            let range = offset..offset + len;
            let [delay_l, delay_r] = &mut buses.delay_send;
            let [reverb_l, reverb_r] = &mut buses.reverb_send;
            for (k, i) in range.enumerate() {
                let l = sl[k] * gl;
                let r = sr[k] * gr;
                out_l[i] += l;
                out_r[i] += r;
                delay_l[i] += l * inst.sends.delay;
                delay_r[i] += r * inst.sends.delay;
                reverb_l[i] += l * inst.sends.reverb;
                reverb_r[i] += r * inst.sends.reverb;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_ir::{Chain, ChainEntry, EffectKind, Instrument, InstrumentKind, Scale, ScaleLock};

    const SR: u32 = 48_000;

    fn project_with(kind: InstrumentKind) -> Project {
        let mut p = Project::new("test");
        p.add_instrument(Instrument::new("a", kind));
        p
    }

    fn engine(project: Project) -> Engine {
        Engine::with_processors(Arc::new(project), SR, 512)
    }

    fn render(e: &mut Engine, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut l = vec![0.0; frames];
        let mut r = vec![0.0; frames];
        e.render_block(&mut l, &mut r);
        (l, r)
    }

    fn peak(x: &[f32]) -> f32 {
        x.iter().fold(0.0f32, |m, v| m.max(v.abs()))
    }

    // === Transport ===

    #[test]
    fn rows_advance_on_the_grid() {
        let mut e = engine(project_with(InstrumentKind::Analog));
        assert_eq!(e.samples_per_row(), 6000.0);
        e.play();
        render(&mut e, 24_000);
        assert_eq!(e.position().row, 4);
    }

    #[test]
    fn block_split_does_not_change_row_count() {
        let mut a = engine(project_with(InstrumentKind::Analog));
        let mut b = engine(project_with(InstrumentKind::Analog));
        a.play();
        b.play();
        render(&mut a, 30_000);
        for n in [7, 1000, 333, 28_660] {
            render(&mut b, n);
        }
        assert_eq!(a.position(), b.position());
        assert_eq!(a.position().row, 5);
    }

    #[test]
    fn first_row_fires_at_first_sample() {
        let mut p = project_with(InstrumentKind::Analog);
        p.pattern_mut(0).unwrap().set_step(0, 0, Step::note(60, 0));
        let mut e = engine(p);
        e.play();
        render(&mut e, 1);
        assert_eq!(e.active_voices(0), 1);
    }

    #[test]
    fn pattern_wraps() {
        let mut p = project_with(InstrumentKind::Analog);
        p.pattern_mut(0).unwrap().resize(4);
        let mut e = engine(p);
        e.play();
        render(&mut e, 6000 * 5);
        assert_eq!(e.position().row, 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut p = project_with(InstrumentKind::Analog);
        p.pattern_mut(0).unwrap().set_step(0, 0, Step::note(60, 0));
        let mut e = engine(p);
        e.play();
        render(&mut e, 3000);
        e.stop();
        let once = (e.position(), e.active_voices(0));
        e.stop();
        assert_eq!((e.position(), e.active_voices(0)), once);
        assert!(!e.is_playing());
        // the tail still renders while stopped
        let (l, _) = render(&mut e, 256);
        assert!(peak(&l) > 0.0);
        render(&mut e, 48_000);
        assert_eq!(e.active_voices(0), 0);
    }

    #[test]
    fn stopped_engine_does_not_advance() {
        let mut e = engine(project_with(InstrumentKind::Analog));
        render(&mut e, 24_000);
        assert_eq!(e.position().row, 0);
        assert_eq!(e.position().state, TransportState::Stopped);
    }

    // === Tracks ===

    #[test]
    fn note_off_step_releases_track_voice() {
        let mut p = project_with(InstrumentKind::Analog);
        let pat = p.pattern_mut(0).unwrap();
        pat.set_step(0, 0, Step::note(60, 0));
        pat.set_step(1, 0, Step::off());
        let mut e = engine(p);
        e.play();
        render(&mut e, 6001);
        assert!(e.tracks[0].voice.is_none());
        render(&mut e, 48_000);
        assert_eq!(e.active_voices(0), 0);
    }

    #[test]
    fn new_note_releases_previous_voice_on_track() {
        let mut p = project_with(InstrumentKind::Analog);
        let pat = p.pattern_mut(0).unwrap();
        pat.set_step(0, 0, Step::note(60, 0));
        pat.set_step(1, 0, Step::note(64, 0));
        let mut e = engine(p);
        e.play();
        render(&mut e, 6001);
        assert_eq!(e.tracks[0].last_pitch, Some(64.0));
        render(&mut e, 48_000);
        assert_eq!(e.active_voices(0), 1);
    }

    #[test]
    fn muted_track_does_not_trigger() {
        let mut p = project_with(InstrumentKind::Analog);
        p.pattern_mut(0).unwrap().set_step(0, 3, Step::note(60, 0));
        p.mixer.track_mute[3] = true;
        let mut e = engine(p);
        e.play();
        render(&mut e, 512);
        assert_eq!(e.active_voices(0), 0);
    }

    #[test]
    fn missing_instrument_is_ignored() {
        let mut p = project_with(InstrumentKind::Analog);
        p.pattern_mut(0).unwrap().set_step(0, 0, Step::note(60, 9));
        let mut e = engine(p);
        e.play();
        let (l, _) = render(&mut e, 512);
        assert_eq!(peak(&l), 0.0);
    }

    #[test]
    fn pool_steals_oldest_voice() {
        let mut p = project_with(InstrumentKind::Analog);
        p.instruments[0].engine.set_parameter(27, 2.0);
        let mut e = engine(p.clone());
        e.trigger_note(0, 60, 0, 1.0);
        e.trigger_note(1, 64, 0, 1.0);
        e.trigger_note(2, 67, 0, 1.0);
        let (stolen_l, stolen_r) = render(&mut e, 4800);
        assert_eq!(e.active_voices(0), 2);
        // the stolen voice's handle is stale; releasing it is harmless
        e.release_note(0);
        assert_eq!(e.active_voices(0), 2);

        // the first note no longer sounds: output equals the two survivors
        let mut reference = engine(p);
        reference.trigger_note(1, 64, 0, 1.0);
        reference.trigger_note(2, 67, 0, 1.0);
        let (l, r) = render(&mut reference, 4800);
        assert!(peak(&l) > 0.01);
        let diff = |a: &[f32], b: &[f32]| a.iter().zip(b).fold(0.0f32, |m, (x, y)| m.max((x - y).abs()));
        assert!(diff(&stolen_l, &l) < 1e-5 && diff(&stolen_r, &r) < 1e-5);
    }

    #[test]
    fn preview_sounds_while_stopped() {
        let mut e = engine(project_with(InstrumentKind::MacroOsc));
        e.trigger_note(0, 60, 0, 1.0);
        let (l, r) = render(&mut e, 4800);
        assert!(peak(&l) > 0.01 && peak(&r) > 0.01);
        e.release_note(0);
        render(&mut e, 96_000);
        assert_eq!(e.active_voices(0), 0);
    }

    #[test]
    fn portamento_glides_from_track_pitch() {
        let mut p = project_with(InstrumentKind::Analog);
        let pat = p.pattern_mut(0).unwrap();
        pat.set_step(0, 0, Step::note(48, 0));
        pat.set_step(1, 0, Step::note(60, 0).with_effect(0, EffectKind::Portamento, 4));
        let mut e = engine(p);
        e.play();
        render(&mut e, 6001);
        assert_eq!(e.tracks[0].last_pitch, Some(60.0));
    }

    // === Mix ===

    #[test]
    fn instrument_mute_and_master_volume() {
        let mut p = project_with(InstrumentKind::MacroOsc);
        p.instruments[0].mute = true;
        let mut e = engine(p.clone());
        e.trigger_note(0, 60, 0, 1.0);
        let (l, _) = render(&mut e, 2400);
        assert_eq!(peak(&l), 0.0);

        p.instruments[0].mute = false;
        p.mixer.master_volume = 0.0;
        e.set_project(Arc::new(p));
        let (l, _) = render(&mut e, 2400);
        assert_eq!(peak(&l), 0.0);
    }

    #[test]
    fn hard_pan_silences_other_side() {
        let mut p = project_with(InstrumentKind::MacroOsc);
        p.instruments[0].pan = -1.0;
        p.mixer.delay_return = 0.0;
        p.mixer.reverb_return = 0.0;
        let mut e = engine(p);
        e.trigger_note(0, 60, 0, 1.0);
        let (l, r) = render(&mut e, 4800);
        assert!(peak(&l) > 0.01);
        assert_eq!(peak(&r), 0.0);
    }

    // === Snapshots ===

    #[test]
    fn tempo_change_retimes_rows() {
        let mut p = project_with(InstrumentKind::Analog);
        let mut e = engine(p.clone());
        e.play();
        render(&mut e, 6000);
        p.set_tempo(240.0);
        let old = e.set_project(Arc::new(p));
        assert_eq!(old.tempo(), 120.0);
        assert_eq!(e.samples_per_row(), 3000.0);
        render(&mut e, 3000);
        assert_eq!(e.position().row, 2);
    }

    #[test]
    fn parameter_edits_reach_processor() {
        let mut p = project_with(InstrumentKind::Analog);
        let mut e = engine(p.clone());
        p.instruments[0].engine.set_parameter(13, 0.2);
        e.set_project(Arc::new(p));
        assert_eq!(e.processor(0).and_then(|x| x.get_parameter(13)), Some(0.2));
    }

    #[test]
    fn install_returns_replaced_processor() {
        let p = Arc::new(project_with(InstrumentKind::Analog));
        let mut e = Engine::new(Arc::clone(&p), SR, 256);
        let fresh = InstrumentProcessor::new(InstrumentKind::Analog, SR as f32);
        assert!(e.install_processor(0, fresh).is_none());
        let other = InstrumentProcessor::new(InstrumentKind::Fm, SR as f32);
        let retired = e.apply_command(EngineCommand::InstallProcessor { index: 0, processor: other });
        assert_eq!(retired.map(|r| r.kind), Some(InstrumentKind::Analog));
        let bad = InstrumentProcessor::new(InstrumentKind::Fm, SR as f32);
        assert!(e.install_processor(MAX_INSTRUMENTS, bad).is_some());
    }

    // === Song mode ===

    fn song_project() -> Project {
        let mut p = project_with(InstrumentKind::Analog);
        p.pattern_mut(0).unwrap().resize(2);
        p.add_pattern(2);
        p.pattern_mut(0).unwrap().set_step(0, 0, Step::note(60, 0));
        p.pattern_mut(1).unwrap().set_step(0, 0, Step::note(62, 0));
        p.pattern_mut(0).unwrap().set_step(0, 1, Step::note(60, 0));
        let mut long = Chain::from_patterns(&[0, 1]);
        long.set_entry(1, ChainEntry::new(1, 12));
        p.add_chain(long);
        p.add_chain(Chain::from_patterns(&[0]));
        p.song.set_cell(0, 0, Some(0));
        p.song.set_cell(1, 0, Some(1));
        p.song.set_cell(0, 1, Some(1));
        p
    }

    #[test]
    fn song_columns_follow_their_chains() {
        let mut e = engine(song_project());
        e.set_play_mode(PlayMode::Song);
        e.play();
        render(&mut e, 1);
        let pos = e.position();
        assert_eq!(pos.chain_entries[0], Some(0));
        assert_eq!(pos.chain_entries[1], Some(0));
        assert_eq!(pos.chain_entries[2], None);

        // after two rows column 1 is exhausted, column 0 moves on
        render(&mut e, 12_000);
        let pos = e.position();
        assert_eq!(pos.song_row, 0);
        assert_eq!(pos.chain_entries[0], Some(1));
        assert_eq!(pos.chain_entries[1], None);
        // entry 1 is transposed up an octave
        assert_eq!(e.tracks[0].last_pitch, Some(74.0));
    }

    #[test]
    fn song_row_advances_after_longest_chain_and_wraps() {
        let mut e = engine(song_project());
        e.set_play_mode(PlayMode::Song);
        e.play();
        render(&mut e, 6000 * 4 + 1);
        assert_eq!(e.position().song_row, 1);
        assert_eq!(e.position().chain_entries[1], None);
        // song row 1 holds a two-row chain; then back to the top
        render(&mut e, 6000 * 2);
        assert_eq!(e.position().song_row, 0);
        assert_eq!(e.position().row, 0);
    }

    #[test]
    fn scale_locked_entry_stays_in_scale() {
        let mut p = song_project();
        let mut chain = Chain::from_patterns(&[0]);
        chain.set_scale_lock(Some(ScaleLock::new(Scale::Major, 0)));
        chain.set_entry(0, ChainEntry::new(0, 2));
        p.chains[1] = chain;
        let mut e = engine(p);
        e.set_play_mode(PlayMode::Song);
        e.play();
        render(&mut e, 1);
        // C major, two degrees up from C is E
        assert_eq!(e.tracks[1].last_pitch, Some(64.0));
    }
}
