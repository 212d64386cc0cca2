//! Signal-graph building blocks.

pub mod convolver;
pub mod curve;
pub mod delay;
pub mod filter;
pub mod gain;
pub mod impulse;
pub mod shaper;
pub mod smooth;
pub mod stage;

pub use convolver::Convolver;
pub use curve::DistortionCurve;
pub use delay::FeedbackDelay;
pub use filter::ToneFilter;
pub use gain::Gain;
pub use impulse::ImpulseResponse;
pub use shaper::Shaper;
pub use stage::Stage;
