pub mod events;
pub mod models;
pub mod repository;
pub mod seats;
pub mod storage;

pub use events::{NoopSeatEvents, SeatEventSink};
pub use models::{Booking, BookingFilter, BookingStatus, BundleOrder, PaymentProof, UnknownStatus};
pub use repository::{BookingRepository, BundleOrderRepository, RepositoryError};
pub use storage::{ProofArtifact, ProofStorage, StorageError};
