//! Offline rendering.

use tb_engine::{Engine, PlayMode};
use tb_ir::{GridTiming, Project, DEFAULT_ROWS, MAX_TRACKS};

/// Play `engine` from the top in `mode` and collect `frames` frames.
pub(crate) fn render(engine: &mut Engine, mode: PlayMode, frames: usize) -> (Vec<f32>, Vec<f32>) {
    let mut left = vec![0.0f32; frames];
    let mut right = vec![0.0f32; frames];
    engine.set_play_mode(mode);
    engine.play();
    let block = engine.max_block();
    for (l, r) in left.chunks_mut(block).zip(right.chunks_mut(block)) {
        engine.render_block(l, r);
    }
    (left, right)
}

fn pattern_rows(project: &Project, pattern: usize) -> usize {
    project.pattern(pattern).map_or(DEFAULT_ROWS, |p| p.rows()).max(1) as usize
}

/// Rows one pass of the arrangement lasts. A song row lasts as long as its
/// longest chain, and at least one row.
pub fn arrangement_rows(project: &Project, mode: PlayMode, pattern: usize) -> usize {
    match mode {
        PlayMode::Pattern => pattern_rows(project, pattern),
        PlayMode::Song => (0..project.song().len().max(1))
            .map(|row| {
                (0..MAX_TRACKS)
                    .filter_map(|column| project.song().cell(column, row))
                    .filter_map(|chain| project.chain(chain as usize))
                    .map(|chain| {
                        chain.entries().iter().map(|e| pattern_rows(project, e.pattern as usize)).sum::<usize>()
                    })
                    .max()
                    .unwrap_or(0)
                    .max(1)
            })
            .sum(),
    }
}

/// [`arrangement_rows`] in frames at `sample_rate`, rounded up.
pub fn arrangement_frames(project: &Project, mode: PlayMode, pattern: usize, sample_rate: u32) -> usize {
    let rows = arrangement_rows(project, mode, pattern);
    let timing = GridTiming::new(sample_rate, project.tempo());
    (rows as f64 * timing.samples_per_row).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_ir::{Chain, ChainEntry};

    fn song_project() -> Project {
        let mut p = Project::new("song");
        p.pattern_mut(0).expect("default pattern").resize(16);
        p.add_pattern(8);
        p.add_chain(Chain::from_patterns(&[0, 1]));
        let mut long = Chain::from_patterns(&[0]);
        long.push(ChainEntry::new(0, 2));
        long.push(ChainEntry::new(0, 4));
        p.add_chain(long);
        p.song.set_cell(0, 0, Some(0));
        p.song.set_cell(1, 0, Some(1));
        p.song.set_cell(0, 2, Some(0));
        p
    }

    #[test]
    fn pattern_mode_counts_one_pattern() {
        let p = song_project();
        assert_eq!(arrangement_rows(&p, PlayMode::Pattern, 0), 16);
        assert_eq!(arrangement_rows(&p, PlayMode::Pattern, 1), 8);
        assert_eq!(arrangement_rows(&p, PlayMode::Pattern, 9), DEFAULT_ROWS as usize);
    }

    #[test]
    fn song_rows_last_as_long_as_their_longest_chain() {
        // row 0: max(16 + 8, 3 * 16), row 1: empty, row 2: 16 + 8
        assert_eq!(arrangement_rows(&song_project(), PlayMode::Song, 0), 48 + 1 + 24);
    }

    #[test]
    fn frames_follow_tempo() {
        let mut p = song_project();
        p.set_tempo(120.0);
        assert_eq!(arrangement_frames(&p, PlayMode::Pattern, 0, 48_000), 16 * 6000);
    }
}
