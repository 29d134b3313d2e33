//! Database migrations - embedded SQL files
//!
//! Migrations are compiled into the binary at build time using include_str!.
//! Each migration is a tuple of (name, sql_content), applied in order.

/// All migrations, embedded at compile time.
/// Format: (filename, sql_content)
///
/// New migrations get the next NNN_description.sql name and an entry here.
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_tenants.sql", include_str!("001_tenants.sql")),
    (
        "002_daily_records_and_product_lines.sql",
        include_str!("002_daily_records_and_product_lines.sql"),
    ),
    ("003_rollups.sql", include_str!("003_rollups.sql")),
    ("004_department_codes.sql", include_str!("004_department_codes.sql")),
];
