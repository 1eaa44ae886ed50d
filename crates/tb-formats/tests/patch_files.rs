//! Patch and sample files through the filesystem, into the document model.

use std::fs;
use std::path::PathBuf;

use tb_formats::{load_patches, read_wav, wav_bytes, write_bank_syx, SampleFormat, BANK_SYX_SIZE};
use tb_ir::{FmParams, FmPatch};

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("tb-formats-{}-{}", std::process::id(), name))
}

fn write_scratch(name: &str, bytes: &[u8]) -> Vec<u8> {
    let path = scratch_path(name);
    fs::write(&path, bytes).unwrap_or_else(|e| panic!("Failed to write {}: {}", path.display(), e));
    let data = fs::read(&path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    let _ = fs::remove_file(&path);
    data
}

#[test]
fn bank_file_voice_imports_into_fm_params() {
    let mut lead = FmPatch::init_voice();
    lead.algorithm = 4;
    lead.feedback = 6;
    lead.operators[1].output_level = 80;
    let mut patches = vec![FmPatch::init_voice(); 7];
    patches.push(lead);

    let data = write_scratch("bank.syx", &write_bank_syx(&patches, 0).unwrap());
    assert_eq!(data.len(), BANK_SYX_SIZE);

    let voices = load_patches(&data).unwrap();
    let mut params = FmParams::default();
    params.import(&voices[7].to_unpacked()).unwrap();
    let patch = params.patch();
    assert_eq!(patch.algorithm, 4);
    assert_eq!(patch.feedback, 6);
    assert_eq!(patch.operators[1].output_level, 80);
}

#[test]
fn rendered_wav_file_reads_as_stereo() {
    let left: Vec<f32> = (0..480).map(|i| (i as f32 / 480.0 * std::f32::consts::TAU).sin() * 0.5).collect();
    let right: Vec<f32> = left.iter().map(|s| -s).collect();

    let data = write_scratch("sine.wav", &wav_bytes(&left, &right, 48_000, SampleFormat::Int16).unwrap());
    let wav = read_wav(&data).unwrap();
    assert_eq!(wav.channels, 2);
    assert_eq!(wav.frames(), 480);
    for (frame, expected) in wav.samples.chunks_exact(2).zip(&left) {
        assert!((frame[0] - expected).abs() < 1e-4);
        assert!((frame[0] + frame[1]).abs() < 1e-4);
    }
}
