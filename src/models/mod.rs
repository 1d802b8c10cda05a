pub mod loaders;
pub mod outcome;
pub mod update;
pub mod work_item;

pub use loaders::{load_work_list, parse_work_list};
pub use outcome::{ExtractionOutcome, FailureReason};
pub use update::{column_letter, BufferedUpdate, CellRange};
pub use work_item::{is_valid_source, WorkItem};
