//! facemetry-queue — Offline-first sample registration.
//!
//! Samples are uploaded to a remote store through an [`UploadTransport`].
//! Failed uploads are kept as unsynced records in a pending queue whose
//! snapshot lives in a [`Persistence`] store, so they survive restarts and
//! can be retried later.

pub mod clock;
pub mod queue;
pub mod record;
pub mod store;
pub mod transport;

pub use clock::{ClockSource, FixedClock, SystemClock};
pub use queue::{
    ClassNameError, ClassSummary, QueueConfig, RegisterError, RegistrationOutcome,
    RegistrationQueue, RegistrationStatus, RetrySummary, SampleSource,
};
pub use record::{CaptureMethod, SampleRecord};
pub use store::{MemoryStore, Persistence, PersistenceError, SqliteStore, PENDING_KEY};
pub use transport::{UploadError, UploadRequest, UploadTransport};
