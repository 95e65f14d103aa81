use serde::{Deserialize, Serialize};

/// Tabular formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFormat {
    Csv,
    Tsv,
}

impl DatasetFormat {
    pub fn delimiter(&self) -> u8 {
        match self {
            DatasetFormat::Csv => b',',
            DatasetFormat::Tsv => b'\t',
        }
    }

    pub fn from_extension(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(DatasetFormat::Csv),
            "tsv" => Some(DatasetFormat::Tsv),
            _ => None,
        }
    }

    pub fn from_mime(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/csv" | "application/csv" => Some(DatasetFormat::Csv),
            "text/tab-separated-values" => Some(DatasetFormat::Tsv),
            _ => None,
        }
    }
}

/// Opaque reference to an uploaded dataset.
///
/// Sizes and counts are captured at admission time and never re-validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHandle {
    pub storage_key: String,
    pub file_name: String,
    pub format: DatasetFormat,
    pub size_bytes: u64,
    pub row_count: u64,
    pub column_count: u64,
}
