/// Real-time safe mono stage.
/// - `process()` must not allocate or lock on the hot path.
/// - `block` is mono f32 samples, processed in place.
/// - parameter setters only move targets; stages glide towards them.
pub trait Stage: Send {
    fn reset(&mut self) {}
    fn process(&mut self, block: &mut [f32]);
}
