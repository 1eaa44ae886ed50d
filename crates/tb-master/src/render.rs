//! The render side: an engine fed by the snapshot cell and command queue.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use atomic_float::AtomicF32;
use ringbuf::traits::{Consumer, Producer};
use ringbuf::{HeapCons, HeapProd};
use tb_engine::{Engine, EngineCommand, PlayMode, Playhead, Retired, TransportState};
use tb_ir::{Project, MAX_INSTRUMENTS, MAX_TRACKS};

const NO_ENTRY: u8 = u8::MAX;
const NO_PREVIEW: usize = usize::MAX;

/// Playback state published by the render context after every block and
/// read lock-free by the edit context.
#[derive(Debug)]
pub struct SharedPlayhead {
    playing: AtomicBool,
    song_mode: AtomicBool,
    row: AtomicU16,
    pattern: AtomicUsize,
    song_row: AtomicUsize,
    chain_entries: [AtomicU8; MAX_TRACKS],
    active_voices: Vec<AtomicUsize>,
    preview_instrument: AtomicUsize,
    preview_frame: AtomicUsize,
    peak_l: AtomicF32,
    peak_r: AtomicF32,
    blocks: AtomicUsize,
}

impl Default for SharedPlayhead {
    fn default() -> Self {
        Self {
            playing: AtomicBool::new(false),
            song_mode: AtomicBool::new(false),
            row: AtomicU16::new(0),
            pattern: AtomicUsize::new(0),
            song_row: AtomicUsize::new(0),
            chain_entries: std::array::from_fn(|_| AtomicU8::new(NO_ENTRY)),
            active_voices: (0..MAX_INSTRUMENTS).map(|_| AtomicUsize::new(0)).collect(),
            preview_instrument: AtomicUsize::new(NO_PREVIEW),
            preview_frame: AtomicUsize::new(0),
            peak_l: AtomicF32::new(0.0),
            peak_r: AtomicF32::new(0.0),
            blocks: AtomicUsize::new(0),
        }
    }
}

impl SharedPlayhead {
    fn publish(&self, engine: &Engine, previewing: Option<usize>, out_l: &[f32], out_r: &[f32]) {
        let pos = engine.position();
        self.playing.store(pos.state == TransportState::Playing, Ordering::Relaxed);
        self.song_mode.store(pos.mode == PlayMode::Song, Ordering::Relaxed);
        self.row.store(pos.row, Ordering::Relaxed);
        self.pattern.store(pos.pattern, Ordering::Relaxed);
        self.song_row.store(pos.song_row, Ordering::Relaxed);
        for (slot, entry) in self.chain_entries.iter().zip(pos.chain_entries) {
            slot.store(entry.unwrap_or(NO_ENTRY), Ordering::Relaxed);
        }
        for (i, count) in self.active_voices.iter().enumerate() {
            count.store(engine.active_voices(i), Ordering::Relaxed);
        }
        match previewing.and_then(|i| engine.preview_position(i).map(|f| (i, f))) {
            Some((instrument, frame)) => {
                self.preview_frame.store(frame as usize, Ordering::Relaxed);
                self.preview_instrument.store(instrument, Ordering::Relaxed);
            }
            None => self.preview_instrument.store(NO_PREVIEW, Ordering::Relaxed),
        }
        let peak = |buf: &[f32]| buf.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        self.peak_l.store(peak(out_l), Ordering::Relaxed);
        self.peak_r.store(peak(out_r), Ordering::Relaxed);
        self.blocks.fetch_add(1, Ordering::Release);
    }

    pub fn position(&self) -> Playhead {
        let mut chain_entries = [None; MAX_TRACKS];
        for (entry, slot) in chain_entries.iter_mut().zip(&self.chain_entries) {
            let v = slot.load(Ordering::Relaxed);
            *entry = (v != NO_ENTRY).then_some(v);
        }
        Playhead {
            state: if self.playing.load(Ordering::Relaxed) {
                TransportState::Playing
            } else {
                TransportState::Stopped
            },
            mode: if self.song_mode.load(Ordering::Relaxed) {
                PlayMode::Song
            } else {
                PlayMode::Pattern
            },
            row: self.row.load(Ordering::Relaxed),
            pattern: self.pattern.load(Ordering::Relaxed),
            song_row: self.song_row.load(Ordering::Relaxed),
            chain_entries,
        }
    }

    pub fn active_voices(&self, instrument: usize) -> usize {
        self.active_voices.get(instrument).map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Frame the slicer preview of `instrument` is playing.
    pub fn preview_position(&self, instrument: usize) -> Option<usize> {
        (self.preview_instrument.load(Ordering::Relaxed) == instrument)
            .then(|| self.preview_frame.load(Ordering::Relaxed))
    }

    /// Absolute peak of the last block, left and right.
    pub fn peak(&self) -> (f32, f32) {
        (self.peak_l.load(Ordering::Relaxed), self.peak_r.load(Ordering::Relaxed))
    }

    /// Blocks rendered so far.
    pub fn blocks(&self) -> usize {
        self.blocks.load(Ordering::Acquire)
    }
}

/// Everything the audio callback owns.
///
/// Built by the controller; hand it to an output backend (or call
/// [`RenderContext::render`] directly) on the thread that renders.
pub struct RenderContext {
    engine: Engine,
    snapshot: Arc<ArcSwap<Project>>,
    commands: HeapCons<EngineCommand>,
    retired: HeapProd<Retired>,
    playhead: Arc<SharedPlayhead>,
    previewing: Option<usize>,
}

impl RenderContext {
    pub(crate) fn new(
        engine: Engine,
        snapshot: Arc<ArcSwap<Project>>,
        commands: HeapCons<EngineCommand>,
        retired: HeapProd<Retired>,
        playhead: Arc<SharedPlayhead>,
    ) -> Self {
        Self { engine, snapshot, commands, retired, playhead, previewing: None }
    }

    pub fn sample_rate(&self) -> u32 {
        self.engine.sample_rate()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn into_parts(self) -> (HeapCons<EngineCommand>, HeapProd<Retired>, Arc<SharedPlayhead>) {
        (self.commands, self.retired, self.playhead)
    }

    /// Render one block: pick up the latest snapshot, apply queued
    /// commands, render, publish the playhead. Never blocks.
    pub fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        {
            let current = self.snapshot.load();
            if !Arc::ptr_eq(&current, self.engine.project()) {
                // the controller still holds the previous snapshot
                let _previous = self.engine.set_project(Arc::clone(&current));
            }
        }

        while let Some(command) = self.commands.try_pop() {
            match &command {
                EngineCommand::StartPreview { instrument, .. } => self.previewing = Some(*instrument),
                EngineCommand::StopPreview { instrument } if self.previewing == Some(*instrument) => {
                    self.previewing = None
                }
                _ => {}
            }
            if let Some(retired) = self.engine.apply_command(command) {
                // a full queue leaves the drop to this thread
                let _ = self.retired.try_push(retired);
            }
        }

        self.engine.render_block(out_l, out_r);
        let n = out_l.len().min(out_r.len());
        self.playhead.publish(&self.engine, self.previewing, &out_l[..n], &out_r[..n]);
    }
}
