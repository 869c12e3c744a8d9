//! Authenticated concept-expansion client
//!
//! Turns one hierarchical concept code into its full descendant set via the
//! remote terminology server's `ValueSet/$expand` operation. Covers the
//! error taxonomy and classifier, the expansion data model (options,
//! results, cache keys), and the paginated HTTP client with 401-driven
//! token invalidation.
//!
//! A failed expansion never escapes as a fault: `expand()` always returns
//! an `ExpansionResult`, failed ones carrying a `ClassifiedError` with
//! enough structure for the caller to render actionable feedback.

pub mod classify;
pub mod client;
pub mod model;

pub use classify::{ClassifiedError, ErrorKind, classify_status, classify_transport};
pub use client::ExpansionClient;
pub use model::{DescendantEntry, ExpansionOptions, ExpansionResult, cache_key};
