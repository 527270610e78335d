//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a primitive is alive.
//!
//! # Tasks
//! - Janitor: Removes expired cache entries at the configured interval

mod janitor;

pub(crate) use janitor::spawn_janitor;
