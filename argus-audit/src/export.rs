//! Streaming event export.
//!
//! Pages through the backend with a bounded page size and writes each record
//! straight to the output, so exports of any size hold only one page in
//! memory. The row set is exactly what `list_events` would page through for
//! the same filter.

use std::io::Write;

use tracing::info;

use argus_core::error::{ArgusError, ArgusResult};
use argus_core::types::SecurityEvent;

use crate::log::AuditLog;
use crate::types::EventFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One JSON object per line.
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(s: &str) -> ArgusResult<Self> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ArgusError::InvalidArgument(format!(
                "unknown export format '{other}'"
            ))),
        }
    }
}

const CSV_HEADER: &str =
    "id,timestamp_ms,kind,actor_id,source_address,agent_fingerprint,target,outcome,severity_hint";

/// Stream all events matching `filter` (its paging fields are ignored).
/// Returns the number of rows written.
pub fn export_events(
    log: &AuditLog,
    format: ExportFormat,
    filter: &EventFilter,
    out: &mut dyn Write,
) -> ArgusResult<u64> {
    let page_size = log.export_page_size();
    let mut page_filter = filter.clone();
    page_filter.limit = page_size;
    page_filter.offset = 0;

    if format == ExportFormat::Csv {
        writeln!(out, "{CSV_HEADER}")?;
    }

    let mut written = 0u64;
    loop {
        let page = log.backend().events(&page_filter)?;
        let page_len = page.len();
        for event in &page {
            match format {
                ExportFormat::Json => {
                    serde_json::to_writer(&mut *out, event)?;
                    writeln!(out)?;
                }
                ExportFormat::Csv => writeln!(out, "{}", csv_row(event))?,
            }
            written += 1;
        }
        if page_len < page_size {
            break;
        }
        page_filter.offset += page_size;
    }
    out.flush()?;
    info!(rows = written, ?format, "Export finished");
    Ok(written)
}

fn csv_row(event: &SecurityEvent) -> String {
    [
        csv_field(&event.id),
        event.timestamp_ms.to_string(),
        event.kind.wire_tag().to_string(),
        csv_field(event.actor_id.as_deref().unwrap_or_default()),
        csv_field(event.source_address.as_deref().unwrap_or_default()),
        csv_field(event.agent_fingerprint.as_deref().unwrap_or_default()),
        csv_field(event.target.as_deref().unwrap_or_default()),
        format!("{:?}", event.outcome).to_lowercase(),
        format!("{:?}", event.severity_hint).to_lowercase(),
    ]
    .join(",")
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
