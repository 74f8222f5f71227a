//! Domain layer: windows, rotation schedule and errors. No I/O.

pub mod errors;
pub mod schedule;
pub mod window;

pub use errors::{KeyManagerError, RecogniserError, StoreError};
pub use schedule::{classify, Lifecycle, RotationSchedule, SecretTimeline};
pub use window::{ConnectionWindow, WindowUpdate, WINDOW_SIZE};
