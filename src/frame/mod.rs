// Frame loop - pacing, recreation and the per-frame session on top of the
// backend's image chain.

pub mod recreate;
pub mod session;
pub mod synchronizer;

pub use recreate::RecreationController;
pub use session::{FrameSession, SessionSettings};
pub use synchronizer::FrameSynchronizer;
