//! Sign-then-broadcast submission workflow for one transaction form

mod controller;

pub use controller::{Phase, SubmissionController, SubmissionView};
