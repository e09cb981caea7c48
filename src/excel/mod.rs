mod changelog;
mod fill_details;
mod loader;

pub use changelog::{change_log_file_name, AuxRow, ChangeLog, ChangeRow};
pub use fill_details::{run_fill_details, FillDetailsJob, FillDetailsSummary, FILL_DETAILS_SHEET, FILL_DETAILS_TABLE};
pub use loader::{LoadStats, NodeRow, NodeTable, NODES_SHEET, OPTIONAL_COLUMNS, REQUIRED_COLUMNS};
