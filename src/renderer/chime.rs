// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 警报提示音
//!
//! 程序内合成一段双音 PCM (WAV), 无需额外的音频资源文件。

use std::f32::consts::TAU;

const SAMPLE_RATE: u32 = 22_050;
/// (频率 Hz, 时长 ms)
const TONES: [(f32, u32); 3] = [(880.0, 160), (660.0, 160), (880.0, 220)];
const AMPLITUDE: f32 = 0.6;
/// 每段首尾的淡入淡出, 避免爆音
const FADE_MS: u32 = 10;

/// 16-bit 单声道 WAV
pub fn alert_chime_wav() -> Vec<u8> {
    let samples = synthesize();
    let data_len = (samples.len() * 2) as u32;

    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        wav.extend_from_slice(&s.to_le_bytes());
    }
    wav
}

fn synthesize() -> Vec<i16> {
    let fade = (SAMPLE_RATE * FADE_MS / 1000) as usize;
    let mut out = Vec::new();
    for (freq, ms) in TONES {
        let n = (SAMPLE_RATE * ms / 1000) as usize;
        for i in 0..n {
            let t = i as f32 / SAMPLE_RATE as f32;
            let edge = i.min(n - 1 - i);
            let gain = if edge < fade {
                edge as f32 / fade as f32
            } else {
                1.0
            };
            let v = (TAU * freq * t).sin() * AMPLITUDE * gain;
            out.push((v * i16::MAX as f32) as i16);
        }
    }
    out
}
