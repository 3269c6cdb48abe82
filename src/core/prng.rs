// Minimal seeded PRNG for the tuner's sampling.
//
// This is NOT cryptographically secure. It exists so that a search is a pure
// function of its seed: the generator is created per search call and passed
// down explicitly.

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform in [0, 1) with 24 bits of resolution, so every value is
    /// exactly representable as `f32`.
    #[inline]
    pub fn next_f32_01(&mut self) -> f32 {
        let x = (self.next_u64() >> 40) as u32;
        (x as f32) / ((1u32 << 24) as f32)
    }

    /// Uniform in [-1, 1).
    #[inline]
    pub fn next_signed(&mut self) -> f32 {
        self.next_f32_01() * 2.0 - 1.0
    }

    #[inline]
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32_01()
    }
}
