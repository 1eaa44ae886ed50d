//! A small built-in project exercising every synth engine.

use tb_ir::{Chain, ChainEntry, Edit, EffectKind, InstrumentKind, Project, Scale, ScaleLock, Step};

const KICK: u8 = 0;
const HAT: u8 = 1;
const BASS: u8 = 2;
const LEAD: u8 = 3;

const ROWS: u16 = 16;

/// (index, value) parameter overrides per instrument.
const KICK_PARAMS: &[(usize, f32)] = &[(0, 13.0), (5, 320.0), (10, 1.0)];
const HAT_PARAMS: &[(usize, f32)] = &[(0, 15.0), (2, 0.7), (5, 70.0), (10, 2.0)];
// mono legato with glide, darker filter
const BASS_PARAMS: &[(usize, f32)] = &[(13, 0.35), (14, 0.4), (15, 0.5), (25, 1.0), (26, 40.0)];
// OP2 output level brings in the modulator
const LEAD_PARAMS: &[(usize, f32)] = &[(100, 72.0)];

fn add_instrument(p: &mut Project, name: &str, kind: InstrumentKind, params: &[(usize, f32)]) -> usize {
    let index = p.instruments.len();
    p.add_instrument_kind(name, kind);
    for &(param, value) in params {
        p.apply(Edit::SetInstrumentParam { instrument: index, index: param, value });
    }
    index
}

fn set(p: &mut Project, pattern: usize, row: u16, track: usize, step: Step) {
    p.apply(Edit::SetStep { pattern, row, track, step });
}

/// Four on the floor, off-beat hats, a gliding bass line and an FM lead,
/// in two patterns arranged over two song rows.
pub fn demo_project() -> Project {
    let mut p = Project::new("demo");
    p.set_tempo(124.0);

    add_instrument(&mut p, "kick", InstrumentKind::MacroOsc, KICK_PARAMS);
    add_instrument(&mut p, "hat", InstrumentKind::MacroOsc, HAT_PARAMS);
    add_instrument(&mut p, "bass", InstrumentKind::Analog, BASS_PARAMS);
    let lead = add_instrument(&mut p, "lead", InstrumentKind::Fm, LEAD_PARAMS);
    p.apply(Edit::SetInstrumentSends { instrument: lead, delay: 0.25, reverb: 0.3 });
    p.apply(Edit::ResizePattern { pattern: 0, rows: ROWS });
    p.apply(Edit::AddPattern { rows: ROWS });

    for pattern in 0..2 {
        for row in (0..ROWS).step_by(4) {
            set(&mut p, pattern, row, 0, Step::note(36, KICK));
            set(&mut p, pattern, row + 2, 1, Step::note(60, HAT).with_volume(160));
        }
    }
    // fill: a retriggered hat and a late kick
    set(&mut p, 1, 14, 1, Step::note(60, HAT).with_effect(0, EffectKind::Retrigger, 2));
    set(&mut p, 1, 15, 0, Step::note(36, KICK).with_effect(0, EffectKind::Delay, 3));

    let bass_line: [(u16, u8); 6] = [(0, 33), (3, 33), (6, 45), (8, 31), (11, 43), (14, 36)];
    for (row, note) in bass_line {
        set(&mut p, 0, row, 2, Step::note(note, BASS));
        set(&mut p, 1, row, 2, Step::note(note + 3, BASS).with_effect(0, EffectKind::Portamento, 24));
    }

    set(&mut p, 0, 0, 3, Step::note(69, LEAD).with_effect(0, EffectKind::Arpeggio, 0x37));
    set(&mut p, 0, 6, 3, Step::off());
    set(&mut p, 0, 8, 3, Step::note(72, LEAD).with_effect(0, EffectKind::Vibrato, 0x42));
    set(&mut p, 0, 12, 3, Step::note(76, LEAD).with_effect(0, EffectKind::Off, 4));
    set(&mut p, 1, 0, 3, Step::note(67, LEAD).with_effect(0, EffectKind::Pan, 64));
    set(&mut p, 1, 4, 3, Step::note(69, LEAD).with_effect(0, EffectKind::Pan, 192));
    set(&mut p, 1, 8, 3, Step::note(72, LEAD).with_effect(0, EffectKind::Cut, 3));

    let drums = Chain::from_patterns(&[0, 1, 0, 1]);
    let mut melody = Chain::new();
    for (pattern, transpose) in [(0, 0), (0, 5), (1, 0), (1, -2)] {
        melody.push(ChainEntry::new(pattern, transpose));
    }
    let mut locked = Chain::new();
    locked.set_scale_lock(Some(ScaleLock::new(Scale::Minor, 9)));
    for (pattern, degrees) in [(0, 0), (0, 2), (1, 4), (1, 2)] {
        locked.push(ChainEntry::new(pattern, degrees));
    }
    for chain in [drums, melody, locked] {
        p.add_chain(chain);
    }

    for (column, first, second) in [(0, 0, 0), (1, 0, 0), (2, 1, 2), (3, 1, 2)] {
        p.apply(Edit::SetSongCell { column, row: 0, chain: Some(first) });
        p.apply(Edit::SetSongCell { column, row: 1, chain: Some(second) });
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::arrangement_rows;
    use tb_engine::PlayMode;

    #[test]
    fn one_instrument_per_engine_in_use() {
        let p = demo_project();
        let kinds: Vec<_> = p.instruments.iter().map(|i| i.kind()).collect();
        assert_eq!(
            kinds,
            [InstrumentKind::MacroOsc, InstrumentKind::MacroOsc, InstrumentKind::Analog, InstrumentKind::Fm]
        );
        assert_eq!(p.instrument(BASS as usize).and_then(|i| i.engine.get_parameter(25)), Some(1.0));
    }

    #[test]
    fn arrangement_spans_two_song_rows() {
        let p = demo_project();
        assert_eq!(arrangement_rows(&p, PlayMode::Pattern, 0), ROWS as usize);
        assert_eq!(arrangement_rows(&p, PlayMode::Song, 0), 2 * 4 * ROWS as usize);
    }

    #[test]
    fn locked_chain_transposes_in_scale() {
        let p = demo_project();
        let chain = p.chain(2).expect("locked chain");
        let lock = chain.scale_lock().expect("scale lock");
        for entry in 0..chain.len() {
            assert!(lock.contains(chain.transpose(entry, 69)));
        }
    }
}
