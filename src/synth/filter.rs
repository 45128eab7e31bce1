// Biquad filter stages for the noise shaping chain.
use std::f32::consts::{PI, SQRT_2};

const LOWPASS_CUTOFF_HZ: f32 = 80.0;
const LOWPASS_Q: f32 = 0.5;
const SHELF_LOW_HZ: f32 = 50.0;
const SHELF_LOW_GAIN_DB: f32 = 12.0;
const SHELF_SUB_HZ: f32 = 25.0;
const SHELF_SUB_GAIN_DB: f32 = 10.0;

/// Direct-form biquad with coefficients normalized by a0.
#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    pub fn lowpass(frequency: f32, q: f32, sample_rate: f32) -> Self {
        let w = 2.0 * PI * frequency / sample_rate;
        let cos_w = w.cos();
        let sin_w = w.sin();
        let alpha = sin_w / (2.0 * q);

        let b0 = (1.0 - cos_w) / 2.0;
        let b1 = 1.0 - cos_w;
        let b2 = (1.0 - cos_w) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w;
        let a2 = 1.0 - alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Low-shelf boost/cut with shelf slope fixed at 1.0.
    pub fn low_shelf(frequency: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0f32.powf(gain_db / 40.0);
        let w = 2.0 * PI * frequency / sample_rate;
        let cos_w = w.cos();
        let sin_w = w.sin();
        let alpha = sin_w / 2.0 * SQRT_2;
        let two_root_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) - (a - 1.0) * cos_w + two_root_a_alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cos_w - two_root_a_alpha);
        let a0 = (a + 1.0) + (a - 1.0) * cos_w + two_root_a_alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_w);
        let a2 = (a + 1.0) + (a - 1.0) * cos_w - two_root_a_alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

/// The fixed shaping pipeline from the noise source to the gain stage: two
/// cascaded low-passes to kill everything above the rumble band, then two
/// shelving boosts to bring the deepest content forward.
pub struct FilterChain {
    stages: [Biquad; 4],
}

impl FilterChain {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            stages: [
                Biquad::lowpass(LOWPASS_CUTOFF_HZ, LOWPASS_Q, sample_rate),
                Biquad::lowpass(LOWPASS_CUTOFF_HZ, LOWPASS_Q, sample_rate),
                Biquad::low_shelf(SHELF_LOW_HZ, SHELF_LOW_GAIN_DB, sample_rate),
                Biquad::low_shelf(SHELF_SUB_HZ, SHELF_SUB_GAIN_DB, sample_rate),
            ],
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        self.stages
            .iter_mut()
            .fold(input, |sample, stage| stage.process(sample))
    }
}
