//! Deterministic noise source for organic handwriting effects.
//!
//! Every visual perturbation in the engine (rotation, offset, opacity, ink
//! variance, baseline drift, speckle placement) draws from this single
//! source, so two renders with identical text, settings, and regenerate
//! counter produce byte-identical pixels. The transform is a stable
//! hash-to-sine-to-fractional mapping, not a cryptographic PRNG; it is
//! chosen for reproducibility and cheap per-glyph evaluation.

use std::f64::consts::TAU;

/// FNV-1a, 64-bit. Stable across platforms and releases.
fn fnv1a(seed: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in seed.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Map a seed string to a float in `[0, 1)`.
///
/// The hash is folded into `[0, tau)` before the sine so the argument stays
/// in a range where `sin` is numerically exact on every platform.
pub fn seeded_unit(seed: &str) -> f32 {
    let hash = fnv1a(seed);
    let angle = (hash % 1_000_000) as f64 / 1_000_000.0 * TAU;
    let value = (angle.sin() * 10_000.0).fract().abs();
    value as f32
}

/// Per-pass noise source carrying the regenerate counter.
///
/// Incrementing the counter reshuffles all jitter without changing layout:
/// the counter participates in every seed string but never in line breaking
/// or pagination.
#[derive(Debug, Clone, Copy)]
pub struct NoiseSource {
    regenerate: u64,
}

impl NoiseSource {
    /// Create a noise source for a given regenerate counter.
    pub fn new(regenerate: u64) -> Self {
        Self { regenerate }
    }

    /// The regenerate counter this source was built with.
    pub fn regenerate(&self) -> u64 {
        self.regenerate
    }

    /// Uniform float in `[0, 1)` for a structured per-unit seed.
    ///
    /// The seed uniquely encodes (page, line, word, unit content, channel)
    /// so identical inputs always yield identical jitter.
    pub fn unit(&self, page: usize, line: usize, word: usize, content: &str, channel: &str) -> f32 {
        let seed = format!(
            "p{}:l{}:w{}:{}:{}:r{}",
            page, line, word, content, channel, self.regenerate
        );
        seeded_unit(&seed)
    }

    /// Uniform float in `[lo, hi)`.
    pub fn range(
        &self,
        page: usize,
        line: usize,
        word: usize,
        content: &str,
        channel: &str,
        lo: f32,
        hi: f32,
    ) -> f32 {
        lo + self.unit(page, line, word, content, channel) * (hi - lo)
    }

    /// Symmetric jitter in `[-half_range, +half_range)`.
    pub fn jitter(
        &self,
        page: usize,
        line: usize,
        word: usize,
        content: &str,
        channel: &str,
        half_range: f32,
    ) -> f32 {
        (self.unit(page, line, word, content, channel) - 0.5) * 2.0 * half_range
    }

    /// Page-level float in `[0, 1)`, seeded by page index alone so every
    /// glyph on one page shares a consistent handwriting personality.
    pub fn page_unit(&self, page: usize, channel: &str) -> f32 {
        seeded_unit(&format!("page{}:{}:r{}", page, channel, self.regenerate))
    }
}

/// Per-page handwriting personality: constants shared by every glyph on one
/// page, derived once from the page index and the regenerate counter.
#[derive(Debug, Clone, Copy)]
pub struct PagePersonality {
    /// Global slant applied to every glyph, degrees.
    pub slant_degrees: f32,
    /// Amplitude of the sinusoidal baseline drift, px.
    pub drift_amplitude: f32,
    /// Wavelength of the baseline drift, px.
    pub drift_wavelength: f32,
    /// Bias toward swapping ink into a family variant, `[0, 1)`.
    pub ink_family_bias: f32,
}

impl PagePersonality {
    /// Derive the personality for one page.
    ///
    /// `base_slant` comes from the user's settings; the page adds a small
    /// deterministic delta so consecutive sheets read as the same hand
    /// without being mechanical copies.
    pub fn for_page(noise: &NoiseSource, page: usize, base_slant: f32) -> Self {
        Self {
            slant_degrees: base_slant + (noise.page_unit(page, "slant") - 0.5) * 1.5,
            drift_amplitude: 0.8 + noise.page_unit(page, "drift-amp") * 1.8,
            drift_wavelength: 120.0 + noise.page_unit(page, "drift-wave") * 160.0,
            ink_family_bias: noise.page_unit(page, "ink-bias"),
        }
    }

    /// Baseline drift at horizontal position `x`.
    pub fn drift_at(&self, x: f32) -> f32 {
        self.drift_amplitude * (x / self.drift_wavelength).sin()
    }
}
