mod columns;
mod jobs;
mod names;
mod params;
mod tables;

pub use columns::Column;
pub use jobs::{Job, Stage};
pub use names::{full_name, normalize_table_name, split_full_name, strip_schema};
pub use params::{resolve_parameter, ResolvedTable};
pub use tables::{DbType, TableRef, TableRole};

pub(crate) fn is_false(b: &bool) -> bool {
    !*b
}
