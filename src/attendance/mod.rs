pub mod clock;
pub mod engine;
pub mod error;
pub mod period;
pub mod retry;
pub mod service;
pub mod stats;
pub mod store;
pub mod sweep;

pub use error::AttendanceError;
pub use service::AttendanceService;
