//! Log database migrations - embedded SQL files
//!
//! Migrations are compiled into the binary with `include_str!` and applied
//! in order by the logging service.

/// All log migrations as (filename, sql_content)
///
/// New migrations get the next `NNN_description.sql` name and an entry
/// at the end of this list.
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    (
        "001_initial_schema.sql",
        include_str!("001_initial_schema.sql"),
    ),
];
