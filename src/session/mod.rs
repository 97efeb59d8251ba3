//! In-memory form sessions
//!
//! Each session owns one `SubmissionController`. Results live only as long as
//! the session; nothing is persisted.

mod store;

pub use store::{SessionStore, SessionView};
