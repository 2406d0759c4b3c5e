/// Filesystem layout for exported units and atomic artifact writes.
pub mod fs;
