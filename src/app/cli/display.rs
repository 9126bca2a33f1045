//! Table and report rendering for CLI output

use crate::core::styles::StyleRole;
use crate::queue::{BrokerHealth, BrokerInfo, DlqRecord};
use prettytable::{format, Cell, Row, Table};

fn styled_cell(text: &str, role: StyleRole, use_color: bool) -> Cell {
    let cell = Cell::new(text);
    match role.to_prettytable_spec() {
        Some(spec) if use_color => cell.style_spec(&spec),
        _ => cell,
    }
}

fn table_with_titles(titles: &[&str], use_color: bool) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.set_titles(Row::new(
        titles
            .iter()
            .map(|t| styled_cell(t, StyleRole::Header, use_color))
            .collect(),
    ));
    table
}

/// One row per consumer group, streams without groups get a single row
pub fn info_table(info: &BrokerInfo, use_color: bool) -> Table {
    let mut table = table_with_titles(
        &["Stream", "Length", "Group", "Position", "Lag", "In-flight", "Retry", "DLQ"],
        use_color,
    );

    for stream in &info.streams {
        let name = styled_cell(&stream.name, StyleRole::Key, use_color);
        if stream.groups.is_empty() {
            table.add_row(Row::new(vec![
                name,
                Cell::new(&stream.length.to_string()),
                styled_cell("-", StyleRole::Dim, use_color),
            ]));
            continue;
        }
        for (i, group) in stream.groups.iter().enumerate() {
            let (stream_cell, length_cell) = if i == 0 {
                (name.clone(), Cell::new(&stream.length.to_string()))
            } else {
                (Cell::new(""), Cell::new(""))
            };
            table.add_row(Row::new(vec![
                stream_cell,
                length_cell,
                Cell::new(&group.name),
                Cell::new(&group.position.to_string()),
                Cell::new(&group.lag.to_string()),
                Cell::new(&group.in_flight.to_string()),
                Cell::new(&group.failed.to_string()),
                Cell::new(&group.dlq.to_string()),
            ]));
        }
    }
    table
}

pub fn dlq_table(records: &[DlqRecord], use_color: bool) -> Table {
    let mut table = table_with_titles(&["Identifier", "Reason", "Failed at", "Payload"], use_color);
    for record in records {
        table.add_row(Row::new(vec![
            Cell::new(&record.identifier),
            styled_cell(&record.failure_reason.to_string(), StyleRole::Warning, use_color),
            Cell::new(&format_timestamp(record.timestamp)),
            Cell::new(&record.payload.to_string()),
        ]));
    }
    table
}

pub fn health_report(health: &BrokerHealth, use_color: bool) -> String {
    let (status, role) = match (health.healthy, &health.warning) {
        (true, _) => ("healthy", StyleRole::Healthy),
        (false, Some(_)) if health.error.is_none() => ("degraded", StyleRole::Warning),
        (false, _) => ("unhealthy", StyleRole::Unhealthy),
    };

    let mut lines = vec![format!(
        "{} {} ({})",
        StyleRole::Key.paint(&health.broker, use_color),
        role.paint(status, use_color),
        health.transport
    )];
    if let Some(warning) = &health.warning {
        lines.push(format!("  warning: {}", StyleRole::Warning.paint(warning, use_color)));
    }
    if let Some(error) = &health.error {
        lines.push(format!("  error: {}", StyleRole::Unhealthy.paint(error, use_color)));
    }
    let counts = &health.message_counts;
    lines.push(format!(
        "  streams: {}  groups: {}  messages: {}  in-flight: {}  retry: {}  dlq: {}",
        health.streams,
        health.consumer_groups,
        counts.total,
        counts.in_flight,
        counts.failed,
        counts.dlq
    ));
    lines.join("\n")
}

/// Epoch seconds as `YYYY-MM-DD HH:MM:SS` UTC
pub fn format_timestamp(epoch_seconds: f64) -> String {
    let secs = epoch_seconds.floor() as i64;
    let nanos = ((epoch_seconds - epoch_seconds.floor()) * 1e9) as u32;
    chrono::DateTime::from_timestamp(secs, nanos)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| epoch_seconds.to_string())
}
