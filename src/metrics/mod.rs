pub mod accumulator;
pub mod event;
pub mod percentiles;
pub mod scheduler;
pub mod table;

pub use accumulator::{KeyedSummary, RollupKind, Summary, WindowAccumulator};
pub use event::{MetricEvent, MetricKind};
pub use percentiles::PercentileSet;
pub use scheduler::{FlushScheduler, SchedulerState};
pub use table::RollupTable;
