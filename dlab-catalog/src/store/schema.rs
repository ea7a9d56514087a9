//! Catalog store record schema and its versions
//!
//! Three on-disk layouts exist:
//!
//! | version | columns |
//! |---------|---------|
//! | V1 | `patientName, dicomName, label, filepath, frameCount` |
//! | V2 | `patientName, originalName, source, dicomName, label, filepath, frameCount, originalPatientName` |
//! | V3 | `patientName, originalName, source, itemName, label, filepath, frameCount, originalPatientName, kind` |
//!
//! Columns are located by header name. A header naming none of the known
//! columns is read positionally under the V1 layout. Each row is read
//! into a [`RawRow`] and lifted to the current version by one migration step
//! per version.

use csv::StringRecord;

/// Columns written by the current version, in order
pub const CURRENT_HEADER: [&str; 9] = [
    "patientName",
    "originalName",
    "source",
    "itemName",
    "label",
    "filepath",
    "frameCount",
    "originalPatientName",
    "kind",
];

const V1_LAYOUT: &[&str] = &["patientName", "dicomName", "label", "filepath", "frameCount"];
const V2_LAYOUT: &[&str] = &[
    "patientName",
    "originalName",
    "source",
    "dicomName",
    "label",
    "filepath",
    "frameCount",
    "originalPatientName",
];

/// Minimum fields a row needs: patient, item, label
pub const MIN_ROW_FIELDS: usize = 3;

/// On-disk layout generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchemaVersion {
    V1,
    V2,
    V3,
}

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion::V3;

    /// Infer the version from a header row
    pub fn detect(header: &StringRecord) -> Self {
        let has = |name: &str| header.iter().any(|h| h.trim().eq_ignore_ascii_case(name));

        if has("kind") || has("itemName") {
            SchemaVersion::V3
        } else if has("source") || has("originalName") || has("originalPatientName") {
            SchemaVersion::V2
        } else {
            SchemaVersion::V1
        }
    }

    fn layout(&self) -> &'static [&'static str] {
        match self {
            SchemaVersion::V1 => V1_LAYOUT,
            SchemaVersion::V2 => V2_LAYOUT,
            SchemaVersion::V3 => &CURRENT_HEADER,
        }
    }
}

/// Logical column of a catalog row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    PatientName,
    OriginalName,
    Source,
    ItemName,
    Label,
    Filepath,
    FrameCount,
    OriginalPatientName,
    Kind,
}

impl Field {
    const ALL: [Field; 9] = [
        Field::PatientName,
        Field::OriginalName,
        Field::Source,
        Field::ItemName,
        Field::Label,
        Field::Filepath,
        Field::FrameCount,
        Field::OriginalPatientName,
        Field::Kind,
    ];

    /// Header names this field has had, newest first
    fn names(&self) -> &'static [&'static str] {
        match self {
            Field::PatientName => &["patientName"],
            Field::OriginalName => &["originalName"],
            Field::Source => &["source"],
            Field::ItemName => &["itemName", "dicomName"],
            Field::Label => &["label"],
            Field::Filepath => &["filepath"],
            Field::FrameCount => &["frameCount"],
            Field::OriginalPatientName => &["originalPatientName"],
            Field::Kind => &["kind"],
        }
    }

    fn slot(&self) -> usize {
        Field::ALL.iter().position(|f| f == self).unwrap_or(0)
    }
}

/// Field → column index for one store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    version: SchemaVersion,
    indices: [Option<usize>; 9],
}

impl ColumnMap {
    pub fn from_header(header: &StringRecord) -> Self {
        let version = SchemaVersion::detect(header);
        let layout = version.layout();
        let mut indices = [None; 9];

        for field in Field::ALL {
            indices[field.slot()] = header.iter().position(|h| {
                let h = h.trim();
                field.names().iter().any(|n| h.eq_ignore_ascii_case(n))
            });
        }

        if indices.iter().all(Option::is_none) {
            for field in Field::ALL {
                indices[field.slot()] = layout
                    .iter()
                    .position(|n| field.names().contains(n))
                    .filter(|&i| i < header.len());
            }
        }

        Self { version, indices }
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    pub fn index(&self, field: Field) -> Option<usize> {
        self.indices[field.slot()]
    }

    pub fn get<'r>(&self, record: &'r StringRecord, field: Field) -> Option<&'r str> {
        self.index(field).and_then(|i| record.get(i))
    }
}

/// One row as read, before defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub patient_name: String,
    pub item_name: String,
    pub label: String,
    pub original_name: Option<String>,
    pub source: Option<String>,
    pub filepath: Option<String>,
    pub frame_count: Option<String>,
    pub original_patient_name: Option<String>,
    pub kind: Option<String>,
}

impl RawRow {
    /// Pull every known field out of a record
    ///
    /// `None` when the record lacks one of the three required fields.
    pub fn extract(columns: &ColumnMap, record: &StringRecord) -> Option<Self> {
        let owned = |field| columns.get(record, field).map(|v| v.to_string());

        Some(Self {
            patient_name: owned(Field::PatientName)?,
            item_name: owned(Field::ItemName)?,
            label: owned(Field::Label)?,
            original_name: owned(Field::OriginalName),
            source: owned(Field::Source),
            filepath: owned(Field::Filepath),
            frame_count: owned(Field::FrameCount),
            original_patient_name: owned(Field::OriginalPatientName),
            kind: owned(Field::Kind),
        })
    }
}

/// V1 → V2: rows gain the patient's original name and source
fn migrate_v1(mut row: RawRow) -> RawRow {
    row.original_name.get_or_insert_with(String::new);
    row.source.get_or_insert_with(String::new);
    row.original_patient_name.get_or_insert_with(String::new);
    row
}

/// V2 → V3: every row before V3 was a DICOM
fn migrate_v2(mut row: RawRow) -> RawRow {
    row.kind.get_or_insert_with(|| "Dicom".to_string());
    row
}

/// Lift a row read under `version` to the current version
pub fn migrate(row: RawRow, version: SchemaVersion) -> RawRow {
    let mut row = row;
    if version < SchemaVersion::V2 {
        row = migrate_v1(row);
    }
    if version < SchemaVersion::V3 {
        row = migrate_v2(row);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cols: &[&str]) -> StringRecord {
        StringRecord::from(cols.to_vec())
    }

    #[test]
    fn test_detect_versions() {
        assert_eq!(SchemaVersion::detect(&header(V1_LAYOUT)), SchemaVersion::V1);
        assert_eq!(SchemaVersion::detect(&header(V2_LAYOUT)), SchemaVersion::V2);
        assert_eq!(SchemaVersion::detect(&header(&CURRENT_HEADER)), SchemaVersion::V3);
    }

    #[test]
    fn test_columns_found_by_name_in_any_order() {
        let map = ColumnMap::from_header(&header(&["kind", "label", "itemName", "patientName"]));
        assert_eq!(map.index(Field::Kind), Some(0));
        assert_eq!(map.index(Field::Label), Some(1));
        assert_eq!(map.index(Field::ItemName), Some(2));
        assert_eq!(map.index(Field::PatientName), Some(3));
        assert_eq!(map.index(Field::Source), None);
    }

    #[test]
    fn test_v1_item_column_is_dicom_name() {
        let map = ColumnMap::from_header(&header(V1_LAYOUT));
        assert_eq!(map.index(Field::ItemName), Some(1));
        assert_eq!(map.index(Field::Kind), None);
    }

    #[test]
    fn test_unrecognized_header_falls_back_to_positions() {
        let map = ColumnMap::from_header(&header(&["a", "b", "c"]));
        assert_eq!(map.version(), SchemaVersion::V1);
        assert_eq!(map.index(Field::PatientName), Some(0));
        assert_eq!(map.index(Field::ItemName), Some(1));
        assert_eq!(map.index(Field::Label), Some(2));
        assert_eq!(map.index(Field::Filepath), None);
    }

    #[test]
    fn test_migrate_v1_fills_defaults() {
        let row = RawRow {
            patient_name: "Patient 1".into(),
            item_name: "a.dcm".into(),
            label: "2".into(),
            ..Default::default()
        };
        let row = migrate(row, SchemaVersion::V1);
        assert_eq!(row.source.as_deref(), Some(""));
        assert_eq!(row.kind.as_deref(), Some("Dicom"));
    }

    #[test]
    fn test_migrate_current_is_identity() {
        let row = RawRow {
            patient_name: "Patient 1".into(),
            item_name: "a.png".into(),
            label: "1".into(),
            kind: Some("AnimatedPng".into()),
            ..Default::default()
        };
        assert_eq!(migrate(row.clone(), SchemaVersion::V3), row);
    }
}
