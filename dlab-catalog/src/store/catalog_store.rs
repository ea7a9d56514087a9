//! Catalog store: one CSV row per media item
//!
//! Reading never fails on a bad row: rows that are too short or whose label
//! cannot be parsed are skipped with a warning. Writing always emits the
//! current header. Label updates re-render only the rows they change;
//! every other byte of the store, terminators and quoting included, is kept.

use super::schema::{migrate, ColumnMap, Field, RawRow, CURRENT_HEADER, MIN_ROW_FIELDS};
use super::storage::{CatalogStorage, StoreTarget};
use crate::error::{CatalogError, CatalogResult};
use crate::models::{MediaItem, MediaKind, PatientRecord, Source};
use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Outcome of a label update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelUpdate {
    /// Existing rows rewritten
    Updated(usize),
    /// No row matched; a minimal row was appended
    Appended,
    /// The store did not exist; it was created with one row
    Created,
}

/// Parse store text into patient records, in file order
pub fn parse_store(text: &str) -> Vec<PatientRecord> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(Ok(header)) => header,
        Some(Err(e)) => {
            warn!("Unreadable catalog header, store treated as empty: {}", e);
            return Vec::new();
        }
        None => return Vec::new(),
    };
    let columns = ColumnMap::from_header(&header);

    let mut patients: Vec<PatientRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (line, record) in records.enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(row = line + 1, "Skipping unreadable row: {}", e);
                continue;
            }
        };

        let Some(row) = row_to_item(&columns, &record, line + 1) else {
            continue;
        };
        let (patient_name, original_name, item) = row;

        let slot = *index.entry(patient_name.clone()).or_insert_with(|| {
            patients.push(PatientRecord::new(
                patient_name.clone(),
                original_name.clone(),
                item.source.clone(),
            ));
            patients.len() - 1
        });
        patients[slot].media.insert(item);
    }

    debug!(
        version = ?columns.version(),
        patients = patients.len(),
        "Parsed catalog store"
    );
    patients
}

/// One row → (patient id, patient original name, item)
fn row_to_item(
    columns: &ColumnMap,
    record: &StringRecord,
    line: usize,
) -> Option<(String, String, MediaItem)> {
    if record.len() < MIN_ROW_FIELDS {
        warn!(row = line, fields = record.len(), "Skipping malformed row: {:?}", record);
        return None;
    }

    let Some(raw) = RawRow::extract(columns, record) else {
        warn!(row = line, "Skipping row missing patient, item or label: {:?}", record);
        return None;
    };
    let raw = migrate(raw, columns.version());

    if raw.patient_name.trim().is_empty() || raw.item_name.trim().is_empty() {
        warn!(row = line, "Skipping row with empty patient or item: {:?}", record);
        return None;
    }

    let label = match raw.label.trim().parse::<i64>() {
        Ok(label) => label,
        Err(_) => {
            warn!(row = line, label = %raw.label, "Skipping row with invalid label");
            return None;
        }
    };

    let kind_text = raw.kind.unwrap_or_default();
    let kind = if kind_text.trim().is_empty() {
        MediaKind::Dicom
    } else {
        match MediaKind::parse_lenient(&kind_text) {
            Some(kind) => kind,
            None => {
                warn!(row = line, kind = %kind_text, "Skipping row with unknown kind");
                return None;
            }
        }
    };

    let frame_count = raw
        .frame_count
        .as_deref()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);

    let original_name = raw.original_name.unwrap_or_default();
    let original_patient_name = match raw.original_patient_name {
        Some(name) if !name.is_empty() => name,
        _ => original_name.clone(),
    };

    let mut item = MediaItem::new(
        raw.item_name,
        kind,
        Source::new(raw.source.unwrap_or_default()),
        original_patient_name,
        PathBuf::from(raw.filepath.unwrap_or_default()),
        frame_count,
    );
    item.label = label;

    Some((raw.patient_name, original_name, item))
}

/// Render patient records with the current header
///
/// `clear_labels` writes every label as 0.
pub fn render_store(records: &[PatientRecord], clear_labels: bool) -> CatalogResult<String> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let csv_err = |e: csv::Error| CatalogError::Internal(format!("Failed to render catalog: {}", e));

    writer.write_record(CURRENT_HEADER).map_err(csv_err)?;

    for record in records {
        for item in record.media.iter() {
            let label = (if clear_labels { 0 } else { item.label }).to_string();
            let filepath = item.filepath.to_string_lossy();
            let frame_count = item.declared_frame_count.to_string();
            writer
                .write_record([
                    record.anonymized_id.as_str(),
                    record.original_name.as_str(),
                    item.source.as_str(),
                    item.name.as_str(),
                    label.as_str(),
                    &*filepath,
                    frame_count.as_str(),
                    item.original_patient_name.as_str(),
                    item.kind.as_str(),
                ])
                .map_err(csv_err)?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CatalogError::Internal(format!("Failed to flush catalog: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| CatalogError::Internal(format!("Catalog is not UTF-8: {}", e)))
}

/// One stored row and where its bytes sit in the store text
struct RowSpan {
    record: StringRecord,
    start: usize,
    /// End of the row's fields, before its line terminator
    content_end: usize,
    /// Start of the next row, or the end of the text
    end: usize,
}

/// Rows of a store with their byte spans, header first
fn read_spans(text: &str) -> CatalogResult<Vec<RowSpan>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows: Vec<(StringRecord, usize)> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| CatalogError::Storage(format!("Unreadable catalog store: {}", e)))?;
        // The reader may report a row as starting on the previous terminator
        let reported = record.position().map(|p| p.byte() as usize).unwrap_or(0).min(text.len());
        let rest = &text[reported..];
        let start = reported + rest.len() - rest.trim_start_matches(|c: char| c == '\r' || c == '\n').len();
        rows.push((record, start));
    }

    let starts: Vec<usize> = rows.iter().map(|(_, start)| *start).collect();
    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(i, (record, start))| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            let content = text[start..end].trim_end_matches(|c: char| c == '\r' || c == '\n');
            RowSpan {
                record,
                start,
                content_end: start + content.len(),
                end,
            }
        })
        .collect())
}

/// A single record as CSV, without a terminator
fn render_row(fields: &[&str]) -> CatalogResult<String> {
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(fields)
        .map_err(|e| CatalogError::Internal(format!("Failed to render catalog row: {}", e)))?;
    let bytes = writer
        .into_inner()
        .map_err(|e| CatalogError::Internal(format!("Failed to flush catalog row: {}", e)))?;
    let mut row =
        String::from_utf8(bytes).map_err(|e| CatalogError::Internal(format!("Catalog is not UTF-8: {}", e)))?;
    if row.ends_with('\n') {
        row.pop();
    }
    Ok(row)
}

/// Line terminator a store already uses; `\n` when it has none yet
fn detect_terminator(text: &str) -> &'static str {
    match text.find('\n') {
        Some(i) if i > 0 && text.as_bytes()[i - 1] == b'\r' => "\r\n",
        _ => "\n",
    }
}

/// Copy `text`, re-rendering only rows for which `edit` returns new fields
///
/// Every other byte, terminators and quoting included, is kept.
fn splice_rows<F>(text: &str, rows: &[RowSpan], mut edit: F) -> CatalogResult<String>
where
    F: FnMut(&StringRecord) -> Option<Vec<String>>,
{
    let mut out = String::with_capacity(text.len() + 16);
    let mut copied = 0usize;
    for row in rows.iter().skip(1) {
        let Some(fields) = edit(&row.record) else {
            continue;
        };
        let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
        out.push_str(&text[copied..row.start]);
        out.push_str(&render_row(&fields)?);
        out.push_str(&text[row.content_end..row.end]);
        copied = row.end;
    }
    out.push_str(&text[copied..]);
    Ok(out)
}

/// Column holding the label, or an error when the header has none
fn label_column(columns: &ColumnMap) -> CatalogResult<usize> {
    columns
        .index(Field::Label)
        .ok_or_else(|| CatalogError::Storage("Catalog store has no label column".to_string()))
}

/// Fields of `record` with field `index` replaced
fn replace_field(record: &StringRecord, index: usize, value: &str) -> Vec<String> {
    record
        .iter()
        .enumerate()
        .map(|(i, field)| if i == index { value.to_string() } else { field.to_string() })
        .collect()
}

/// Set the label of every row matching `(patient_id, item_name)`
///
/// An item name shared by a DICOM and an animated PNG of the same patient
/// matches both rows. Only matching rows are re-rendered. When nothing
/// matched, a minimal row is appended using the store's line terminator.
pub fn rewrite_label(
    text: &str,
    patient_id: &str,
    item_name: &str,
    label: i64,
) -> CatalogResult<(String, LabelUpdate)> {
    let rows = read_spans(text)?;
    let Some(header) = rows.first() else {
        let header = render_row(&CURRENT_HEADER)?;
        let (text, _) = rewrite_label(&format!("{}\n", header), patient_id, item_name, label)?;
        return Ok((text, LabelUpdate::Appended));
    };

    let columns = ColumnMap::from_header(&header.record);
    let label_idx = label_column(&columns)?;
    let (patient_idx, item_idx) = match (columns.index(Field::PatientName), columns.index(Field::ItemName)) {
        (Some(p), Some(i)) => (p, i),
        _ => {
            return Err(CatalogError::Storage(
                "Catalog store has no patient or item column".to_string(),
            ))
        }
    };
    let label_text = label.to_string();

    let mut updated = 0usize;
    let mut out = splice_rows(text, &rows, |record| {
        if record.len() < MIN_ROW_FIELDS || label_idx >= record.len() {
            return None;
        }
        if record.get(patient_idx) != Some(patient_id) || record.get(item_idx) != Some(item_name) {
            return None;
        }
        updated += 1;
        Some(replace_field(record, label_idx, &label_text))
    })?;

    if updated > 0 {
        return Ok((out, LabelUpdate::Updated(updated)));
    }

    let width = header.record.len().max(MIN_ROW_FIELDS);
    let mut fields = vec![String::new(); width];
    fields[patient_idx] = patient_id.to_string();
    fields[item_idx] = item_name.to_string();
    fields[label_idx] = label_text;
    if let Some(i) = columns.index(Field::FrameCount) {
        fields[i] = "0".to_string();
    }
    if let Some(i) = columns.index(Field::Kind) {
        fields[i] = MediaKind::Dicom.as_str().to_string();
    }
    let fields: Vec<&str> = fields.iter().map(String::as_str).collect();

    let terminator = detect_terminator(text);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push_str(terminator);
    }
    out.push_str(&render_row(&fields)?);
    out.push_str(terminator);
    Ok((out, LabelUpdate::Appended))
}

/// Set every label to 0; other rows and bytes are left untouched
pub fn clear_labels(text: &str) -> CatalogResult<(String, usize)> {
    let rows = read_spans(text)?;
    let Some(header) = rows.first() else {
        return Ok((text.to_string(), 0));
    };

    let label_idx = label_column(&ColumnMap::from_header(&header.record))?;

    let mut cleared = 0usize;
    let out = splice_rows(text, &rows, |record| {
        if record.len() < MIN_ROW_FIELDS || label_idx >= record.len() {
            return None;
        }
        if record.get(label_idx).map(str::trim) == Some("0") {
            return None;
        }
        cleared += 1;
        Some(replace_field(record, label_idx, "0"))
    })?;

    Ok((out, cleared))
}

/// Typed access to the stores held by a [`CatalogStorage`]
pub struct CatalogStore<'a> {
    storage: &'a dyn CatalogStorage,
}

impl<'a> CatalogStore<'a> {
    pub fn new(storage: &'a dyn CatalogStorage) -> Self {
        Self { storage }
    }

    fn read_text(&self, target: &StoreTarget) -> CatalogResult<Option<String>> {
        self.storage
            .read_store(target)
            .map_err(|e| CatalogError::Storage(format!("Failed to read {} store: {}", target, e)))
    }

    fn write_text(&self, target: &StoreTarget, text: &str) -> CatalogResult<()> {
        self.storage
            .write_store(target, text)
            .map_err(|e| CatalogError::Storage(format!("Failed to write {} store: {}", target, e)))
    }

    /// Records of a store, or `None` if it was never written
    pub fn load(&self, target: &StoreTarget) -> CatalogResult<Option<Vec<PatientRecord>>> {
        Ok(self.read_text(target)?.map(|text| parse_store(&text)))
    }

    /// Replace a store's contents; the Main store never keeps labels
    pub fn save(&self, target: &StoreTarget, records: &[PatientRecord]) -> CatalogResult<()> {
        let text = render_store(records, *target == StoreTarget::Main)?;
        self.write_text(target, &text)
    }

    /// Set one item's label in place
    pub fn update_label(
        &self,
        target: &StoreTarget,
        patient_id: &str,
        item_name: &str,
        label: i64,
    ) -> CatalogResult<LabelUpdate> {
        let (text, outcome) = match self.read_text(target)? {
            Some(text) => rewrite_label(&text, patient_id, item_name, label)?,
            None => {
                let (text, _) = rewrite_label("", patient_id, item_name, label)?;
                (text, LabelUpdate::Created)
            }
        };
        self.write_text(target, &text)?;
        Ok(outcome)
    }

    /// Reset every label of a store to 0; returns how many changed
    pub fn clear_labels(&self, target: &StoreTarget) -> CatalogResult<usize> {
        let Some(text) = self.read_text(target)? else {
            return Ok(0);
        };
        let (text, cleared) = clear_labels(&text)?;
        if cleared > 0 {
            self.write_text(target, &text)?;
        }
        Ok(cleared)
    }
}
