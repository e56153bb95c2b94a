//! 19-dimensional acoustic feature extraction: radix-2 FFT over a
//! Hann-windowed, zero-padded buffer, plus spectral/temporal/harmonic
//! descriptors. Deterministic: no RNG, no thread pools.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use thiserror::Error;

/// Output dimensionality of the hand-crafted feature vector.
pub const FEATURE_DIM: usize = 19;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("no samples")]
    NoSamples,
    #[error("invalid sample rate")]
    InvalidSampleRate,
}

/// Extract the 19-dim feature vector from a (preprocessed) mono waveform.
pub fn extract(samples: &[f32], sample_rate: u32) -> Result<[f64; FEATURE_DIM], FeatureError> {
    if samples.is_empty() {
        return Err(FeatureError::NoSamples);
    }
    if sample_rate == 0 {
        return Err(FeatureError::InvalidSampleRate);
    }

    let n = samples.len().next_power_of_two();
    let spectrum = Spectrum::compute(samples, n, sample_rate);

    let mut v = [0.0f64; FEATURE_DIM];
    v[0] = energy_rms(samples);
    v[1] = zero_crossing_rate(samples);

    let nyquist = sample_rate as f64 / 2.0;
    let centroid_hz = spectrum.centroid_hz();
    let bandwidth_hz = spectrum.bandwidth_hz(centroid_hz);

    v[2] = clip01(centroid_hz / nyquist);
    v[3] = clip01(bandwidth_hz / nyquist);
    v[4] = clip01(spectrum.rolloff_hz(0.85) / nyquist);
    v[5] = spectrum.flatness();
    v[6] = clip01(spectrum.dominant_frequency_hz() / nyquist);
    v[7] = clip01(spectrum.crest() / 100.0);
    v[8] = spectrum.entropy();
    v[9] = variance(samples);
    v[10] = temporal_centroid(samples);
    v[11] = onset_rate(samples, sample_rate);
    v[12] = amplitude_modulation_depth(samples);
    v[13] = (spectrum.skewness_raw(centroid_hz, bandwidth_hz)).tanh();
    v[14] = kurtosis_normalized(spectrum.kurtosis_raw(centroid_hz, bandwidth_hz));
    v[15] = spectrum.peak_prominence();

    let (ratio, count, strength) = spectrum.harmonics(spectrum.dominant_frequency_hz(), sample_rate, n);
    v[16] = ratio;
    v[17] = count;
    v[18] = strength;

    Ok(v)
}

fn clip01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

// ── Time-domain features ───────────────────────────────────

fn energy_rms(samples: &[f32]) -> f64 {
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64).powi(2)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

fn zero_crossing_rate(samples: &[f32]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let nonzero: Vec<f32> = samples.iter().copied().filter(|&s| s != 0.0).collect();
    let mut crossings = 0usize;
    for w in nonzero.windows(2) {
        if (w[0] >= 0.0) != (w[1] >= 0.0) {
            crossings += 1;
        }
    }
    crossings as f64 / (samples.len() - 1) as f64
}

fn variance(samples: &[f32]) -> f64 {
    let n = samples.len() as f64;
    let mean: f64 = samples.iter().map(|&s| s as f64).sum::<f64>() / n;
    samples.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / n
}

fn temporal_centroid(samples: &[f32]) -> f64 {
    let energy_sum: f64 = samples.iter().map(|&s| (s as f64).powi(2)).sum();
    if energy_sum < 1e-12 {
        return 0.0;
    }
    let weighted: f64 = samples
        .iter()
        .enumerate()
        .map(|(i, &s)| i as f64 * (s as f64).powi(2))
        .sum();
    (weighted / energy_sum) / samples.len() as f64
}

fn onset_rate(samples: &[f32], sample_rate: u32) -> f64 {
    let duration = samples.len() as f64 / sample_rate as f64;
    if duration <= 0.0 {
        return 0.0;
    }
    let abs: Vec<f64> = samples.iter().map(|&s| (s as f64).abs()).collect();
    let mean: f64 = abs.iter().sum::<f64>() / abs.len() as f64;
    let std: f64 = (abs.iter().map(|&a| (a - mean).powi(2)).sum::<f64>() / abs.len() as f64).sqrt();
    let threshold = mean + std;

    let mut crossings = 0usize;
    for w in abs.windows(2) {
        if w[0] <= threshold && w[1] > threshold {
            crossings += 1;
        }
    }

    let max_rate = 20.0;
    let rate = (crossings as f64 / duration).min(max_rate);
    rate / max_rate
}

fn amplitude_modulation_depth(samples: &[f32]) -> f64 {
    let abs: Vec<f64> = samples.iter().map(|&s| (s as f64).abs()).collect();
    let mean: f64 = abs.iter().sum::<f64>() / abs.len() as f64;
    let std: f64 = (abs.iter().map(|&a| (a - mean).powi(2)).sum::<f64>() / abs.len() as f64).sqrt();
    (std / (mean + 1e-9)).min(1.0)
}

// ── Spectrum: FFT magnitude/frequency bins and derived features ──

struct Spectrum {
    magnitude: Vec<f64>,
    frequency: Vec<f64>,
}

impl Spectrum {
    fn compute(samples: &[f32], n: usize, sample_rate: u32) -> Self {
        let mut buf = vec![0.0f64; n];
        buf[..samples.len()].copy_from_slice(
            &samples.iter().map(|&s| s as f64).collect::<Vec<f64>>(),
        );

        let window = hann_window(n);
        for (b, w) in buf.iter_mut().zip(window.iter()) {
            *b *= w;
        }

        let mut complex_buf: Vec<Complex<f64>> = buf.iter().map(|&x| Complex::new(x, 0.0)).collect();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);
        fft.process(&mut complex_buf);

        let bin_count = n / 2;
        let magnitude: Vec<f64> = complex_buf[..bin_count].iter().map(|c| c.norm()).collect();
        let frequency: Vec<f64> = (0..bin_count)
            .map(|i| i as f64 * sample_rate as f64 / n as f64)
            .collect();

        Self { magnitude, frequency }
    }

    fn sum_mag(&self) -> f64 {
        self.magnitude.iter().sum()
    }

    fn centroid_hz(&self) -> f64 {
        let total = self.sum_mag();
        if total < 1e-12 {
            return 0.0;
        }
        let weighted: f64 = self
            .magnitude
            .iter()
            .zip(self.frequency.iter())
            .map(|(&m, &f)| m * f)
            .sum();
        weighted / total
    }

    fn bandwidth_hz(&self, centroid_hz: f64) -> f64 {
        let total = self.sum_mag();
        if total < 1e-12 {
            return 0.0;
        }
        let var: f64 = self
            .magnitude
            .iter()
            .zip(self.frequency.iter())
            .map(|(&m, &f)| m * (f - centroid_hz).powi(2))
            .sum::<f64>()
            / total;
        var.sqrt()
    }

    fn rolloff_hz(&self, fraction: f64) -> f64 {
        let total = self.sum_mag();
        let threshold = total * fraction;
        let mut cumsum = 0.0;
        for (&m, &f) in self.magnitude.iter().zip(self.frequency.iter()) {
            cumsum += m;
            if cumsum >= threshold {
                return f;
            }
        }
        self.frequency.last().copied().unwrap_or(0.0)
    }

    fn flatness(&self) -> f64 {
        const EPS: f64 = 1e-12;
        let n = self.magnitude.len() as f64;
        if n == 0.0 {
            return 0.0;
        }
        let log_mean: f64 = self.magnitude.iter().map(|&m| (m + EPS).ln()).sum::<f64>() / n;
        let geo_mean = log_mean.exp();
        let arith_mean: f64 = self.magnitude.iter().map(|&m| m + EPS).sum::<f64>() / n;
        if arith_mean < 1e-300 {
            return 0.0;
        }
        geo_mean / arith_mean
    }

    fn dominant_frequency_hz(&self) -> f64 {
        let (idx, _) = self
            .magnitude
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) });
        self.frequency.get(idx).copied().unwrap_or(0.0)
    }

    fn crest(&self) -> f64 {
        let mean: f64 = self.magnitude.iter().sum::<f64>() / self.magnitude.len().max(1) as f64;
        if mean < 1e-12 {
            return 0.0;
        }
        let max = self.magnitude.iter().cloned().fold(f64::MIN, f64::max);
        max / mean
    }

    fn entropy(&self) -> f64 {
        let bin_count = self.magnitude.len();
        if bin_count <= 1 {
            return 0.0;
        }
        let sum_sq: f64 = self.magnitude.iter().map(|&m| m * m).sum();
        if sum_sq < 1e-12 {
            return 0.0;
        }
        let h: f64 = self
            .magnitude
            .iter()
            .map(|&m| {
                let p = m * m / sum_sq;
                if p > 0.0 {
                    -p * p.log2()
                } else {
                    0.0
                }
            })
            .sum();
        h / (bin_count as f64).log2()
    }

    fn skewness_raw(&self, centroid_hz: f64, bandwidth_hz: f64) -> f64 {
        let total = self.sum_mag();
        if total < 1e-12 {
            return 0.0;
        }
        let moment3: f64 = self
            .magnitude
            .iter()
            .zip(self.frequency.iter())
            .map(|(&m, &f)| m * (f - centroid_hz).powi(3))
            .sum::<f64>()
            / total;
        moment3 / (bandwidth_hz.powi(3) + 1e-9)
    }

    fn kurtosis_raw(&self, centroid_hz: f64, bandwidth_hz: f64) -> f64 {
        let total = self.sum_mag();
        if total < 1e-12 {
            return 0.0;
        }
        let moment4: f64 = self
            .magnitude
            .iter()
            .zip(self.frequency.iter())
            .map(|(&m, &f)| m * (f - centroid_hz).powi(4))
            .sum::<f64>()
            / total;
        moment4 / (bandwidth_hz.powi(4) + 1e-9) / 3.0
    }

    fn peak_prominence(&self) -> f64 {
        if self.magnitude.is_empty() {
            return 0.0;
        }
        let mut sorted = self.magnitude.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let top3: Vec<f64> = sorted.iter().take(3).copied().collect();
        let top3_mean = top3.iter().sum::<f64>() / top3.len() as f64;
        let mean = self.magnitude.iter().sum::<f64>() / self.magnitude.len() as f64;
        let prom = (top3_mean - mean) / (top3_mean + mean + 1e-9);
        clip01(prom)
    }

    /// Returns (harmonic_ratio, harmonic_count_normalized, harmonic_strength).
    fn harmonics(&self, dominant_hz: f64, sample_rate: u32, n: usize) -> (f64, f64, f64) {
        if dominant_hz <= 0.0 || self.magnitude.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        let nyquist = sample_rate as f64 / 2.0;
        let delta_f = sample_rate as f64 / n as f64;
        let mean_mag = self.magnitude.iter().sum::<f64>() / self.magnitude.len() as f64;
        let sum_sq: f64 = self.magnitude.iter().map(|&m| m * m).sum();

        let mut sum_counted_sq = 0.0;
        let mut counted = Vec::new();

        for h in 1..=10u32 {
            let target_hz = dominant_hz * h as f64;
            if target_hz > nyquist {
                break;
            }
            let target_bin = (target_hz / delta_f).round() as isize;
            let window = ((0.1 * dominant_hz / delta_f).ceil() as isize).clamp(1, 10);

            let lo = (target_bin - window).max(0) as usize;
            let hi = ((target_bin + window) as usize).min(self.magnitude.len().saturating_sub(1));
            if lo > hi {
                continue;
            }
            let local_max = self.magnitude[lo..=hi].iter().cloned().fold(f64::MIN, f64::max);

            if local_max > 1.5 * mean_mag {
                sum_counted_sq += local_max * local_max;
                counted.push(local_max);
            }
        }

        let harmonic_ratio = if sum_sq > 1e-12 { sum_counted_sq / sum_sq } else { 0.0 };
        let harmonic_count = (counted.len() as f64 / 10.0).min(1.0);
        let max_mag = self.magnitude.iter().cloned().fold(f64::MIN, f64::max);
        let harmonic_strength = if counted.is_empty() || max_mag < 1e-12 {
            0.0
        } else {
            (counted.iter().sum::<f64>() / counted.len() as f64) / max_mag
        };

        (harmonic_ratio, harmonic_count, harmonic_strength)
    }
}

fn kurtosis_normalized(raw: f64) -> f64 {
    let k = raw.max(0.0);
    clip01((k + 3.0) / 13.0)
}

fn hann_window(n: usize) -> Vec<f64> {
    use std::f64::consts::PI;
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (n - 1) as f64).cos()))
        .collect()
}
