pub mod bundle;
pub mod codes;
pub mod error;
pub mod expiry;
pub mod lifecycle;
pub mod memory;
pub mod resolver;
pub mod ticket;
pub mod validation;

pub use bundle::BundleService;
pub use error::BookingError;
pub use expiry::{ExpirySweeper, SweepReport};
pub use lifecycle::{BookingLookup, BookingPolicy, BookingService, ProofReceipt};
pub use resolver::SeatConflictResolver;
pub use ticket::{ScanOutcome, TicketInfo, TicketPayload};
pub use validation::{BookingDraft, BundleDraft};
