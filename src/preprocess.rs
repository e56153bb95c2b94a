//! Audio preprocessing: IIR filtering, automatic gain control, noise
//! reduction, and SNR estimation ahead of feature extraction.

use std::f32::consts::PI;

/// Preprocessing configuration. Every stage degrades to a pass-through on
/// out-of-range parameters rather than erroring (§4.1 failure model).
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub high_pass_enabled: bool,
    pub high_pass_cutoff_hz: f32,
    pub band_pass_enabled: bool,
    pub band_pass_low_hz: f32,
    pub band_pass_high_hz: f32,
    pub agc_enabled: bool,
    pub agc_target_rms: f32,
    pub noise_reduction_enabled: bool,
    pub nr_alpha: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            high_pass_enabled: true,
            high_pass_cutoff_hz: 50.0,
            band_pass_enabled: true,
            band_pass_low_hz: 100.0,
            band_pass_high_hz: 5000.0,
            agc_enabled: true,
            agc_target_rms: 0.3,
            noise_reduction_enabled: false,
            nr_alpha: 0.1,
        }
    }
}

/// Estimate signal-to-noise ratio in dB from the leading 10% of the input
/// (noise floor, minimum 512 samples) against the whole-signal power.
pub fn estimate_snr(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return -100.0;
    }
    let noise_len = (samples.len() / 10).max(512).min(samples.len());
    let noise_power = mean_square(&samples[..noise_len]);
    let signal_power = mean_square(samples);

    if noise_power == 0.0 {
        return 100.0;
    }
    let ratio = signal_power / noise_power;
    if ratio <= 0.0 {
        return -100.0;
    }
    10.0 * ratio.log10()
}

fn mean_square(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|&s| s * s).sum::<f32>() / samples.len() as f32
}

/// Run the full preprocessing chain: high-pass -> band-pass -> AGC -> (optional) noise reduction.
pub fn preprocess(samples: &[f32], sample_rate: u32, config: &PreprocessConfig) -> Vec<f32> {
    if samples.is_empty() || sample_rate == 0 {
        return samples.to_vec();
    }

    let mut out = samples.to_vec();

    if config.high_pass_enabled {
        out = high_pass(&out, sample_rate, config.high_pass_cutoff_hz);
    }

    if config.band_pass_enabled {
        out = high_pass(&out, sample_rate, config.band_pass_low_hz);
        out = low_pass(&out, sample_rate, config.band_pass_high_hz);
    }

    if config.agc_enabled {
        out = agc(&out, config.agc_target_rms);
    }

    if config.noise_reduction_enabled {
        out = noise_reduce(&out, config.nr_alpha);
    }

    out
}

/// First-order IIR high-pass: `y[n] = a*(y[n-1] + x[n] - x[n-1])`.
fn high_pass(samples: &[f32], sample_rate: u32, cutoff_hz: f32) -> Vec<f32> {
    let nyquist = sample_rate as f32 / 2.0;
    if samples.is_empty() || cutoff_hz <= 0.0 || cutoff_hz >= nyquist {
        return samples.to_vec();
    }

    let rc = 1.0 / (2.0 * PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f32;
    let alpha = rc / (rc + dt);

    let mut out = vec![0.0f32; samples.len()];
    out[0] = samples[0];
    for n in 1..samples.len() {
        out[n] = alpha * (out[n - 1] + samples[n] - samples[n - 1]);
    }
    out
}

/// First-order IIR low-pass: `y[n] = a*x[n] + (1-a)*y[n-1]`.
fn low_pass(samples: &[f32], sample_rate: u32, cutoff_hz: f32) -> Vec<f32> {
    let nyquist = sample_rate as f32 / 2.0;
    if samples.is_empty() || cutoff_hz <= 0.0 || cutoff_hz >= nyquist {
        return samples.to_vec();
    }

    let rc = 1.0 / (2.0 * PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f32;
    let alpha = dt / (rc + dt);

    let mut out = vec![0.0f32; samples.len()];
    out[0] = alpha * samples[0];
    for n in 1..samples.len() {
        out[n] = alpha * samples[n] + (1.0 - alpha) * out[n - 1];
    }
    out
}

/// Automatic gain control to a target RMS, with a soft `tanh` limiter
/// above 0.95 magnitude.
fn agc(samples: &[f32], target_rms: f32) -> Vec<f32> {
    let rms = mean_square(samples).sqrt();
    if rms <= 1e-12 {
        return samples.to_vec();
    }
    let gain = target_rms / rms;
    samples
        .iter()
        .map(|&s| {
            let amplified = s * gain;
            if amplified.abs() > 0.95 {
                amplified.tanh() * 0.95
            } else {
                amplified
            }
        })
        .collect()
}

/// Spectral-subtraction-style noise reduction against a noise floor
/// estimated from the leading 10% (min 512 samples) of the signal.
fn noise_reduce(samples: &[f32], alpha: f32) -> Vec<f32> {
    if samples.is_empty() {
        return samples.to_vec();
    }
    let noise_len = (samples.len() / 10).max(512).min(samples.len());
    let noise_floor = mean_square(&samples[..noise_len]).sqrt();
    let threshold = noise_floor * (1.0 + alpha);

    samples
        .iter()
        .map(|&s| {
            if s.abs() > threshold {
                s.signum() * (s.abs() - noise_floor * alpha)
            } else {
                s * (1.0 - 2.0 * alpha)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_wave(freq: f32, sr: u32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
        let n = (sr as f32 * duration_secs) as usize;
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn empty_input_passes_through() {
        let config = PreprocessConfig::default();
        let out = preprocess(&[], 22050, &config);
        assert!(out.is_empty());
    }

    #[test]
    fn zero_sample_rate_passes_through() {
        let samples = vec![0.1, 0.2, 0.3];
        let config = PreprocessConfig::default();
        let out = preprocess(&samples, 0, &config);
        assert_eq!(out, samples);
    }

    #[test]
    fn out_of_range_cutoff_is_pass_through() {
        let samples = sine_wave(440.0, 22050, 0.1, 0.5);
        let out = high_pass(&samples, 22050, 0.0);
        assert_eq!(out, samples);
        let out = high_pass(&samples, 22050, 20000.0);
        assert_eq!(out, samples);
    }

    #[test]
    fn agc_brings_rms_toward_target() {
        let samples = sine_wave(440.0, 22050, 0.5, 0.05);
        let out = agc(&samples, 0.3);
        let rms_before = mean_square(&samples).sqrt();
        let rms_after = mean_square(&out).sqrt();
        assert!(rms_before < 0.3);
        assert!(rms_after > rms_before);
    }

    #[test]
    fn agc_soft_limits_clipping_samples() {
        let samples = vec![1.0f32; 100];
        let out = agc(&samples, 10.0);
        for v in out {
            assert!(v.abs() <= 0.95 + 1e-6);
        }
    }

    #[test]
    fn snr_high_when_noise_floor_near_zero() {
        let mut samples = vec![0.0f32; 2000];
        for s in samples.iter_mut().skip(1500) {
            *s = 1.0;
        }
        let snr = estimate_snr(&samples);
        assert!(snr > 50.0, "expected high SNR, got {snr}");
    }

    #[test]
    fn snr_low_when_signal_below_noise() {
        // Leading 10% (the noise-floor window) is louder than the signal
        // averaged over the whole input, so the estimate goes negative.
        let mut samples = vec![0.0f32; 2000];
        for s in samples.iter_mut().take(1000) {
            *s = 1.0;
        }
        let snr = estimate_snr(&samples);
        assert!(snr < 0.0, "expected negative SNR, got {snr}");
    }

    #[test]
    fn snr_empty_input() {
        assert_eq!(estimate_snr(&[]), -100.0);
    }

    #[test]
    fn preprocess_is_deterministic() {
        let samples = sine_wave(300.0, 22050, 1.0, 0.4);
        let config = PreprocessConfig::default();
        let a = preprocess(&samples, 22050, &config);
        let b = preprocess(&samples, 22050, &config);
        assert_eq!(a, b);
    }

    #[test]
    fn noise_reduction_attenuates_below_threshold_samples() {
        let mut samples = vec![0.01f32; 2000];
        samples[1900] = 0.5;
        let out = noise_reduce(&samples, 0.1);
        // Steady-state samples well below threshold are scaled down.
        assert!(out[0].abs() < samples[0].abs());
    }
}
