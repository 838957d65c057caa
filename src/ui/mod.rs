pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{header, info, label, section, success, summary_row, value, warn};
pub use table::{result_table, stats_table};
pub use theme::{theme, Theme};
