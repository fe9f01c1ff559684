//! Core utilities shared by the page classifier and the challenge handlers.

pub mod forms;
pub mod types;

pub use forms::{FormDescriptor, FormError};
pub use types::{ChallengeSubmission, PayloadEncoding, ResponseSnapshot};
