pub mod anomaly;
pub mod classifier;
pub mod error;
pub mod estimator;
pub mod filters;
pub mod gate;
pub mod health_monitor;
pub mod report;
pub mod sensors;
pub mod session;
pub mod types;

pub use error::{ClassifyError, SessionError, StreamError};
pub use estimator::{DeadReckoner, EstimatorConfig, FusedSnapshot, NavEvent, Profile};
pub use filters::{FrameIntegrator, NavigationState};
pub use report::Report;
pub use session::{CancelHandle, Session, SessionState, SessionSummary, StopReason};
