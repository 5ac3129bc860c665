use rayon::prelude::*;

use super::decode::WaveForm;
use super::features::{EnergyCurve, EnergyWindow};
use crate::error::SignalAnalysisError;

pub const FRAME_LENGTH: usize = 2048;
pub const HOP_LENGTH: usize = 512;

/// A later window must beat the current best by this relative margin to
/// replace it, so numerically equal windows keep the earliest start.
const TIE_TOLERANCE: f64 = 1e-9;

#[derive(Clone, Copy, Debug)]
pub struct EnergyConfig {
    pub frame_length: usize,
    pub hop_length: usize,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            frame_length: FRAME_LENGTH,
            hop_length: HOP_LENGTH,
        }
    }
}

/// Centered short-time RMS energy.
///
/// Frame `i` covers `[i*hop - frame_length/2, i*hop + frame_length/2)`, zero
/// padded outside the signal, giving `1 + len/hop` frames.
pub fn energy_curve(wave: &WaveForm, config: &EnergyConfig) -> EnergyCurve {
    let samples = wave.samples();
    let hop = config.hop_length.max(1);
    let frame_length = config.frame_length.max(1);
    let half = frame_length / 2;
    let num_frames = 1 + samples.len() / hop;
    let hop_seconds = if wave.sample_rate() == 0 {
        0.0
    } else {
        hop as f64 / wave.sample_rate() as f64
    };

    let energy: Vec<f64> = (0..num_frames)
        .into_par_iter()
        .map(|i| {
            let center = i * hop;
            let start = center.saturating_sub(half);
            let end = (center + frame_length - half).min(samples.len());
            let sum_sq: f64 = samples[start..end]
                .iter()
                .map(|&s| s as f64 * s as f64)
                .sum();
            (sum_sq / frame_length as f64).sqrt()
        })
        .collect();

    let times = (0..num_frames).map(|i| i as f64 * hop_seconds).collect();

    EnergyCurve {
        times,
        energy,
        hop_seconds,
    }
}

/// Find the loudest `window_duration`-second stretch of the waveform.
pub fn score_windows(
    wave: &WaveForm,
    window_duration: f64,
    config: &EnergyConfig,
) -> Result<EnergyWindow, SignalAnalysisError> {
    if !window_duration.is_finite() || window_duration <= 0.0 {
        return Err(SignalAnalysisError::InvalidWindow(window_duration));
    }
    if wave.sample_rate() == 0 {
        return Err(SignalAnalysisError::InvalidSampleRate(0));
    }

    let curve = energy_curve(wave, config);
    log::debug!(
        "Energy curve: {} frames, hop {:.4}s, peak {:.4}",
        curve.len(),
        curve.hop_seconds,
        curve.peak()
    );

    let window = select_window(&curve, window_duration).unwrap_or_else(|| {
        let duration = wave.duration();
        let end = if duration > 0.0 {
            window_duration.min(duration)
        } else {
            window_duration
        };
        log::debug!("Audio too short to score ({:.3}s), using [0, {:.2}]", duration, end);
        EnergyWindow {
            start_time: 0.0,
            end_time: end,
            window_frames: curve.len(),
            score: curve.energy.iter().sum(),
        }
    });

    log::info!(
        "Loudest {:.0}s window: {:.2}s to {:.2}s ({} frames, score {:.3})",
        window_duration,
        window.start_time,
        window.end_time,
        window.window_frames,
        window.score
    );

    Ok(window)
}

/// Like [`score_windows`], but any analysis failure becomes `(0, window_duration)`.
pub fn score_or_default(
    wave: Result<&WaveForm, &SignalAnalysisError>,
    window_duration: f64,
    config: &EnergyConfig,
) -> (f64, f64) {
    let scored = match wave {
        Ok(wave) => score_windows(wave, window_duration, config),
        Err(e) => {
            log::warn!("Audio analysis unavailable ({}), using default window", e);
            return (0.0, window_duration);
        }
    };
    match scored {
        Ok(w) => (w.start_time, w.end_time),
        Err(e) => {
            log::warn!("Audio analysis failed ({}), using default window", e);
            (0.0, window_duration)
        }
    }
}

/// Sliding-sum argmax over the curve. `None` when the curve has no
/// measurable span (fewer than two frames).
fn select_window(curve: &EnergyCurve, window_duration: f64) -> Option<EnergyWindow> {
    let n = curve.len();
    let span = curve.span();
    if n < 2 || span <= 0.0 {
        return None;
    }

    let frames_per_second = n as f64 / span;
    let window_frames = ((window_duration * frames_per_second).round() as usize).clamp(1, n);

    // prefix[i] = sum of energy[..i]; window at s sums prefix[s+w] - prefix[s]
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0f64);
    let mut acc = 0.0f64;
    for &e in &curve.energy {
        acc += e;
        prefix.push(acc);
    }

    let mut best_idx = 0;
    let mut best_score = prefix[window_frames];
    for start in 1..=(n - window_frames) {
        let score = prefix[start + window_frames] - prefix[start];
        if score > best_score + TIE_TOLERANCE * best_score.abs() {
            best_idx = start;
            best_score = score;
        }
    }

    let start_time = curve.times[best_idx];
    Some(EnergyWindow {
        start_time,
        end_time: start_time + window_duration,
        window_frames,
        score: best_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // 512 Hz makes one hop exactly one second.
    const RATE: u32 = 512;

    fn wave_with_bursts(seconds: usize, bursts: &[(usize, usize)], level: f32) -> WaveForm {
        let rate = RATE as usize;
        let mut samples = vec![0.0f32; seconds * rate];
        for &(from, to) in bursts {
            for s in &mut samples[from * rate..to * rate] {
                *s = level;
            }
        }
        WaveForm::new(samples, RATE)
    }

    #[test]
    fn curve_shape_and_timing() {
        let wave = wave_with_bursts(10, &[(0, 10)], 0.5);
        let curve = energy_curve(&wave, &EnergyConfig::default());
        assert_eq!(curve.len(), 1 + 10 * 512 / HOP_LENGTH);
        assert!((curve.hop_seconds - 1.0).abs() < 1e-12);
        for pair in curve.times.windows(2) {
            assert!((pair[1] - pair[0] - 1.0).abs() < 1e-12);
        }
        // Interior frames sit fully inside the constant signal
        assert!((curve.energy[5] - 0.5).abs() < 1e-6);
        // Edge frames are half padding
        assert!(curve.energy[0] < curve.energy[5]);
        assert!(curve.energy.iter().all(|&e| e >= 0.0));
    }

    #[test]
    fn finds_the_loud_region() {
        let wave = wave_with_bursts(120, &[(50, 80)], 0.8);
        let window = score_windows(&wave, 20.0, &EnergyConfig::default()).unwrap();
        assert!(window.start_time < 80.0 && window.end_time > 50.0);
        assert!(window.start_time >= 49.0 && window.start_time <= 61.0);
        assert!((window.end_time - window.start_time - 20.0).abs() < 1e-9);
    }

    #[test]
    fn short_audio_clamps_window() {
        let wave = wave_with_bursts(10, &[(2, 4)], 0.3);
        let window = score_windows(&wave, 60.0, &EnergyConfig::default()).unwrap();
        let curve = energy_curve(&wave, &EnergyConfig::default());
        assert_eq!(window.window_frames, curve.len());
        assert_eq!(window.start_time, 0.0);
        assert_eq!(window.end_time, 60.0);
    }

    #[test]
    fn silent_audio_returns_first_window() {
        let wave = wave_with_bursts(30, &[], 0.0);
        let window = score_windows(&wave, 10.0, &EnergyConfig::default()).unwrap();
        assert_eq!(window.start_time, 0.0);
        assert_eq!(window.score, 0.0);
    }

    #[test]
    fn equal_windows_keep_first_occurrence() {
        let wave = wave_with_bursts(60, &[(10, 15), (40, 45)], 0.5);
        let window = score_windows(&wave, 5.0, &EnergyConfig::default()).unwrap();
        assert_eq!(window.start_time, 10.0);
    }

    #[test]
    fn degenerate_audio_falls_back_to_available_span() {
        let wave = WaveForm::new(vec![0.1; 100], 44100);
        let window = score_windows(&wave, 60.0, &EnergyConfig::default()).unwrap();
        assert_eq!(window.start_time, 0.0);
        assert!((window.end_time - 100.0 / 44100.0).abs() < 1e-12);

        let empty = WaveForm::new(Vec::new(), 44100);
        let window = score_windows(&empty, 60.0, &EnergyConfig::default()).unwrap();
        assert_eq!((window.start_time, window.end_time), (0.0, 60.0));
    }

    #[test]
    fn invalid_inputs_map_to_default_window() {
        let wave = wave_with_bursts(10, &[], 0.0);
        assert!(matches!(
            score_windows(&wave, 0.0, &EnergyConfig::default()),
            Err(SignalAnalysisError::InvalidWindow(_))
        ));

        let bad_rate = WaveForm::new(vec![0.5; 1000], 0);
        assert_eq!(
            score_or_default(Ok(&bad_rate), 45.0, &EnergyConfig::default()),
            (0.0, 45.0)
        );

        let err = SignalAnalysisError::NoAudioTrack;
        assert_eq!(
            score_or_default(Err(&err), 60.0, &EnergyConfig::default()),
            (0.0, 60.0)
        );
    }
}
