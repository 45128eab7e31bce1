// Brown-noise source: cascaded leaky integration of white noise.
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::filter::FilterChain;

/// Seconds of audio in the precomputed loop buffer.
const LOOP_SECONDS: u32 = 6;
/// The tail of the loop is crossfaded into the head over this fraction.
const CROSSFADE_FRACTION: usize = 50; // last 2% of samples

/// Per-sample brown-noise cascade. Three leaky integrators with decreasing
/// coupling, mixed with increasing weight on the deeper (more integrated)
/// stages, then boosted to compensate for the energy lost to integration.
///
/// This is the real-time variant: `next_sample` is bounded-time arithmetic
/// and safe to run inside an audio callback. The shipped synthesizer instead
/// renders it offline into a loop buffer (see [`build_loop_buffer`]), which
/// trades per-sample computation for a perfectly periodic, glitch-free loop.
pub struct BrownNoise {
    rng: SmallRng,
    b0: f32,
    b1: f32,
    b2: f32,
}

impl BrownNoise {
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_entropy())
    }

    #[cfg(test)]
    pub fn from_seed(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(rng: SmallRng) -> Self {
        Self {
            rng,
            b0: 0.0,
            b1: 0.0,
            b2: 0.0,
        }
    }

    pub fn next_sample(&mut self) -> f32 {
        let white = self.rng.gen::<f32>() * 2.0 - 1.0;

        self.b0 = (self.b0 + 0.01 * white) / 1.01;
        self.b1 = (self.b1 + 0.005 * self.b0) / 1.005;
        self.b2 = (self.b2 + 0.003 * self.b1) / 1.003;

        let mix = self.b0 * 0.2 + self.b1 * 0.4 + self.b2 * 0.6;
        mix * 8.0
    }
}

impl Default for BrownNoise {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a few seconds of shaped brown noise into a seamless loop.
///
/// The cascade output runs through the full filter chain at the sink's native
/// rate, then the generation continues for one crossfade window past the loop
/// length and that continuation is blended into the head. The last sample of
/// the buffer therefore flows directly into the first with no audible seam.
pub fn build_loop_buffer(sample_rate: u32) -> Vec<f32> {
    let len = (sample_rate * LOOP_SECONDS) as usize;
    let fade = len / CROSSFADE_FRACTION;

    let mut source = BrownNoise::new();
    let mut chain = FilterChain::new(sample_rate as f32);

    let mut raw = Vec::with_capacity(len + fade);
    for _ in 0..len + fade {
        raw.push(chain.process(source.next_sample()));
    }

    let mut buffer = raw[..len].to_vec();
    for i in 0..fade {
        let t = i as f32 / fade as f32;
        buffer[i] = raw[len + i] * (1.0 - t) + raw[i] * t;
    }
    buffer
}
