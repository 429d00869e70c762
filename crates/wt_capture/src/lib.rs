mod convert;
mod engine;

pub use convert::{copy_from_snapshot, copy_rows};
pub use engine::CaptureEngine;
