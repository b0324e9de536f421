//! Output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};

use pgmigrate_core::{EnumOutcome, MigrationReport, TableReport};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn enum_cell(outcome: &EnumOutcome) -> Cell {
    match outcome {
        EnumOutcome::Created => Cell::new("created").fg(Color::Green),
        EnumOutcome::Skipped => Cell::new("exists"),
        EnumOutcome::Mismatch { .. } => Cell::new("mismatch").fg(Color::Yellow),
        EnumOutcome::Failed { .. } => Cell::new("failed").fg(Color::Red),
    }
}

fn sequence_cell(table: &TableReport) -> Cell {
    match table.sequence_synced {
        Some(true) => Cell::new("synced").fg(Color::Green),
        Some(false) => Cell::new("not synced").fg(Color::Yellow),
        None if table.sequences.is_empty() => Cell::new("-"),
        None => Cell::new("untouched"),
    }
}

/// Render a run report as tables plus a one-line verdict
pub fn print_report(report: &MigrationReport) {
    if report.dry_run {
        warning("DRY RUN - target database not modified");
        println!();
    }

    if !report.enums.is_empty() {
        let mut table = create_table();
        table.set_header(vec!["Enum", "Status", "Detail"]);
        for e in &report.enums {
            let detail = match &e.outcome {
                EnumOutcome::Mismatch { expected, actual } => format!(
                    "expected [{}], target has [{}]",
                    expected.join(", "),
                    actual.join(", ")
                ),
                EnumOutcome::Failed { error } => error.clone(),
                _ => String::new(),
            };
            table.add_row(vec![Cell::new(&e.name), enum_cell(&e.outcome), Cell::new(detail)]);
        }
        println!("{}", table);
    }

    let mut table = create_table();
    table.set_header(vec![
        "Table", "Schema", "Read", "Inserted", "Skipped", "Failed", "Sequences",
    ]);
    for t in &report.tables {
        let schema = match &t.schema_error {
            Some(_) => Cell::new("failed").fg(Color::Red),
            None => Cell::new("ok"),
        };
        let failed = if t.failed > 0 {
            Cell::new(t.failed).fg(Color::Red)
        } else {
            Cell::new(t.failed)
        };
        table.add_row(vec![
            Cell::new(&t.table),
            schema,
            Cell::new(t.rows_read),
            Cell::new(t.inserted),
            Cell::new(t.skipped),
            failed,
            sequence_cell(t),
        ]);
    }
    println!("{}", table);

    let mut problems = Vec::new();
    for t in &report.tables {
        for e in t.schema_error.iter().chain(t.read_error.iter()) {
            problems.push(format!("  {}: {}", t.table, e));
        }
        for r in &t.row_errors {
            problems.push(format!("  {} ({}): {}", t.table, r.key, r.message));
        }
    }
    if !problems.is_empty() {
        println!();
        println!("{}", "Errors:".red().bold());
        for line in problems.iter().take(20) {
            println!("{}", line);
        }
        if problems.len() > 20 {
            println!(
                "  ... and {} more (see `pgmigrate logs list --run {}`)",
                problems.len() - 20,
                report.run_id
            );
        }
    }

    println!();
    if report.has_errors() {
        warning(&format!(
            "Migration finished with errors: {} rows inserted, {} rows failed",
            report.total_inserted(),
            report.total_failed_rows()
        ));
    } else {
        success(&format!(
            "Migration complete: {} rows inserted",
            report.total_inserted()
        ));
    }
    if report.enum_mismatches() > 0 {
        warning(&format!(
            "{} enum type(s) differ in the target and were left unchanged",
            report.enum_mismatches()
        ));
    }
}
