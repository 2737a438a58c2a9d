//! Report generation: terminal views and file exports.

mod export;
mod render;

pub use export::*;
pub use render::*;
