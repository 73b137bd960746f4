pub mod dead_reckoning;

pub use dead_reckoning::{FrameIntegrator, NavigationState};
