//! Page regeneration: pre-rendered pages served fresh, stale-while-rebuilding
//! or as placeholders.

mod page;
mod scheduler;

pub use page::{PageKey, PageOutcome, PageState, RenderedPage};
pub use scheduler::{EnumerationReport, PageBuilder, PageScheduler};
