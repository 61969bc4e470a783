use crate::error::CrawlError;
use crate::links::CollectedLink;
use crate::utils::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Column holding one report link per row
pub const REPORT_URL_COLUMN: &str = "report_url";

/// Receives the full deduplicated link set whenever it changes
pub trait ResultSink: Send {
    fn write(&mut self, links: &[CollectedLink]) -> Result<(), CrawlError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ReportUrlRow {
    report_url: String,
}

/// Single-column CSV spreadsheet, rewritten in full on every write
#[derive(Debug, Clone)]
pub struct CsvResultSink {
    path: PathBuf,
}

impl CsvResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for CsvResultSink {
    fn write(&mut self, links: &[CollectedLink]) -> Result<(), CrawlError> {
        if links.is_empty() {
            ::log::info!("No report links collected yet; {} will only hold a header", self.path.display());
        }

        write_atomic(&self.path, |w| {
            let mut writer = csv::Writer::from_writer(w);
            if links.is_empty() {
                writer.write_record([REPORT_URL_COLUMN])?;
            }
            for link in links {
                writer.serialize(ReportUrlRow {
                    report_url: link.clone(),
                })?;
            }
            writer
                .flush()
                .map_err(|e| CrawlError::persistence(&self.path, e))?;
            Ok(())
        })?;

        ::log::debug!("Wrote {} report links to {}", links.len(), self.path.display());
        Ok(())
    }
}

/// Read a result file back as the input sequence for report scraping
pub fn read_links(path: impl AsRef<Path>) -> Result<Vec<CollectedLink>, CrawlError> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let mut links = Vec::new();
    for row in reader.deserialize::<ReportUrlRow>() {
        let url = row?.report_url.trim().to_string();
        if !url.is_empty() {
            links.push(url);
        }
    }
    Ok(links)
}

/// Hashes of the analysed sample
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportHashes {
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub ssdeep: Option<String>,
}

/// One MITRE ATT&CK technique observed in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MitreTechnique {
    pub id: String,
    pub name: String,
    pub tactic: String,
}

/// One network indicator (connection, DNS request, HTTP request)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIndicator {
    pub kind: String,
    pub value: String,
}

/// Structured data a report scraper produces for one collected link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    /// The collected link this record was scraped from
    pub identifier: CollectedLink,
    #[serde(default)]
    pub hashes: ReportHashes,
    pub verdict: Option<String>,
    #[serde(default)]
    pub behaviors: Vec<String>,
    #[serde(default)]
    pub mitre_techniques: Vec<MitreTechnique>,
    #[serde(default)]
    pub network_indicators: Vec<NetworkIndicator>,
    /// Location of the downloaded packet capture, if any
    #[serde(default)]
    pub pcap_reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(items: &[&str]) -> Vec<CollectedLink> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvResultSink::new(dir.path().join("reports.csv"));

        sink.write(&links(&["https://x/tasks/1", "https://x/tasks/2"])).unwrap();

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        assert!(contents.starts_with("report_url\n"));
        assert_eq!(
            read_links(sink.path()).unwrap(),
            links(&["https://x/tasks/1", "https://x/tasks/2"])
        );
    }

    #[test]
    fn test_rewrite_reflects_current_set_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvResultSink::new(dir.path().join("reports.csv"));

        sink.write(&links(&["a", "b", "c"])).unwrap();
        sink.write(&links(&["a"])).unwrap();

        assert_eq!(read_links(sink.path()).unwrap(), links(&["a"]));
    }

    #[test]
    fn test_empty_set_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvResultSink::new(dir.path().join("reports.csv"));

        sink.write(&[]).unwrap();

        assert_eq!(std::fs::read_to_string(sink.path()).unwrap(), "report_url\n");
        assert!(read_links(sink.path()).unwrap().is_empty());
    }

    #[test]
    fn test_report_record_from_json() {
        let record: ReportRecord = serde_json::from_str(
            r#"{
                "identifier": "https://x/tasks/1",
                "verdict": "Malicious activity",
                "hashes": { "sha256": "ab12" },
                "mitre_techniques": [{ "id": "T1059", "name": "Command and Scripting Interpreter", "tactic": "Execution" }]
            }"#,
        )
        .unwrap();

        assert_eq!(record.hashes.sha256.as_deref(), Some("ab12"));
        assert_eq!(record.mitre_techniques[0].id, "T1059");
        assert!(record.behaviors.is_empty());
        assert!(record.pcap_reference.is_none());
    }
}
