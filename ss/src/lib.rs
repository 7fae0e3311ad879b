//! SessionStore - keyed session state with inactivity expiry
//!
//! A small, generic store for per-session payloads. Values are kept as JSON
//! so a payload that can no longer be decoded is detectable as corruption
//! rather than a crash. Expiry is owned by the store: callers never compare
//! timestamps themselves.
//!
//! Time comes from an injected [`Clock`], which lets tests simulate a day of
//! inactivity without sleeping.

mod clock;
mod error;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, StoreResult};
pub use store::SessionStore;

