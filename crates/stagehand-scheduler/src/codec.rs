//! Byte encoding of a whole [`TaskCoordinator`] snapshot.
//!
//! JSON via serde. Timestamps serialize as RFC 3339 with full nanosecond
//! precision, so a decode of an encode is exact.

use crate::{coordinator::TaskCoordinator, error::Result};

pub fn to_bytes(coordinator: &TaskCoordinator) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(coordinator)?)
}

pub fn from_bytes(bytes: &[u8]) -> Result<TaskCoordinator> {
    Ok(serde_json::from_slice(bytes)?)
}
