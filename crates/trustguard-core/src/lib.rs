//! TrustGuard core types.
//!
//! Everything the pipeline crates agree on lives here: the typed `Capture`,
//! signal readings and stage results, decisions and audit records, the
//! `SignalProvider` / `FrameClassifier` / `AuditRecorder` seams, the
//! cancellation token handed to providers, and the `VerifyError` taxonomy.

pub mod audit;
pub mod cancel;
pub mod capture;
pub mod decision;
pub mod error;
pub mod signal;
pub mod signals;
pub mod traits;

pub use audit::*;
pub use cancel::*;
pub use capture::*;
pub use decision::*;
pub use error::*;
pub use signal::*;
pub use traits::*;
