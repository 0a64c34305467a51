//! Self-contained collaborators for running the renderer without a map
//! engine: an in-memory source cache, a static style and a painter that
//! fills tile squares. The CLI and the test suites are built on these.

mod cache;
mod painter;
mod style;

pub use cache::MemorySourceCache;
pub use painter::{FillPainter, PaintLog, PassRecord};
pub use style::StaticStyle;
