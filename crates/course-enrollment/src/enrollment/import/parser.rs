use serde::{Deserialize, Deserializer};
use std::io::Read;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CatalogRecord {
    /// 1-indexed data row, header excluded.
    pub(crate) row: usize,
    pub(crate) code: String,
    pub(crate) title: String,
    pub(crate) seat_limit: u32,
    pub(crate) waitlist_enabled: Option<String>,
    pub(crate) prerequisites: Vec<String>,
    pub(crate) instructor: Option<String>,
    pub(crate) meeting_times: String,
    pub(crate) syllabus: String,
}

pub(crate) fn parse_records<R: Read>(reader: R) -> Result<Vec<CatalogRecord>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();

    for (index, record) in csv_reader.deserialize::<CatalogRow>().enumerate() {
        let row = record?;
        records.push(CatalogRecord {
            row: index + 1,
            prerequisites: split_codes(row.prerequisites.as_deref()),
            code: row.code,
            title: row.title,
            seat_limit: row.seat_limit,
            waitlist_enabled: row.waitlist_enabled,
            instructor: row.instructor,
            meeting_times: row.meeting_times.unwrap_or_default(),
            syllabus: row.syllabus.unwrap_or_default(),
        });
    }

    Ok(records)
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    code: String,
    title: String,
    seat_limit: u32,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    waitlist_enabled: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    prerequisites: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    instructor: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    meeting_times: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    syllabus: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn split_codes(value: Option<&str>) -> Vec<String> {
    value
        .map(|codes| {
            codes
                .split(';')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Accepts the spellings spreadsheet exports tend to produce.
pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}
