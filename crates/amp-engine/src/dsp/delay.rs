//! Feedback echo: a delay line whose output is fed back into its input.

/// Echo spacing used by the signal graph.
pub const DELAY_SECONDS: f32 = 0.3;
/// Loop gain of the echo path.
pub const DELAY_FEEDBACK: f32 = 0.4;
/// Capacity of the delay line.
pub const MAX_DELAY_SECONDS: f32 = 2.0;

/// Mono delay line with a feedback loop. Outputs only the delayed (wet)
/// signal; the dry path is mixed elsewhere.
pub struct FeedbackDelay {
    buffer: Vec<f32>,
    write_pos: usize,
    delay_samples: usize,
    feedback: f32,
}

impl FeedbackDelay {
    /// `delay_seconds` is clamped to `max_seconds`, and to at least one
    /// sample.
    pub fn new(sample_rate: f32, max_seconds: f32, delay_seconds: f32, feedback: f32) -> Self {
        let buffer_size = (sample_rate * max_seconds) as usize + 1;
        let delay_samples = ((delay_seconds.min(max_seconds) * sample_rate).round() as usize).clamp(1, buffer_size - 1);
        Self {
            buffer: vec![0.0; buffer_size],
            write_pos: 0,
            delay_samples,
            feedback: feedback.clamp(0.0, 0.99),
        }
    }

    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let len = self.buffer.len();
        let read_pos = if self.write_pos >= self.delay_samples {
            self.write_pos - self.delay_samples
        } else {
            len - (self.delay_samples - self.write_pos)
        };
        let delayed = self.buffer[read_pos];
        self.buffer[self.write_pos] = input + delayed * self.feedback;
        self.write_pos += 1;
        if self.write_pos == len {
            self.write_pos = 0;
        }
        delayed
    }

    /// Replace each input sample by the delay output.
    pub fn process_block(&mut self, block: &mut [f32]) {
        for s in block.iter_mut() {
            *s = self.process_sample(*s);
        }
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}
