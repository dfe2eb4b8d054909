//! Socket pumps. Each session runs one of each.

pub(crate) mod read;
pub(crate) mod write;
