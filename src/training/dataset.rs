//! Base prompts the rollout loop iterates over.
//!
//! Accepted file layouts, chosen by extension:
//!
//! - `.json`: an array of strings, or of objects with a `question` (or
//!   `prompt`) field.
//! - `.jsonl`: one such string or object per line.
//! - `.csv`: a header row naming a `question` (or `prompt`) column; quoted
//!   cells may span lines.
//! - anything else: one prompt per non-empty line, with `\n` escapes expanded
//!   so multi-line poems fit on a line.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

/// One record of a JSON or JSON-lines dataset.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PromptRecord {
    Text(String),
    Question { question: String },
    Prompt { prompt: String },
}

impl PromptRecord {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) | Self::Question { question: text } | Self::Prompt { prompt: text } => {
                text
            }
        }
    }
}

/// One row of a CSV dataset; other columns are ignored.
#[derive(Debug, Deserialize)]
struct CsvRow {
    question: Option<String>,
    prompt: Option<String>,
}

/// An ordered list of base prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptDataset {
    prompts: Vec<String>,
}

impl PromptDataset {
    pub fn new(prompts: Vec<String>) -> Self {
        Self { prompts }
    }

    /// Load prompts from `path`; see the module docs for the formats.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompts from {}", path.display()))?;

        let prompts = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                let records: Vec<PromptRecord> = serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                records.into_iter().map(PromptRecord::into_text).collect()
            }
            Some("jsonl") => text
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(i, line)| {
                    serde_json::from_str::<PromptRecord>(line)
                        .map(PromptRecord::into_text)
                        .with_context(|| format!("{}:{}: invalid record", path.display(), i + 1))
                })
                .collect::<Result<Vec<_>>>()?,
            Some("csv") => {
                let mut reader = csv::Reader::from_reader(text.as_bytes());
                let mut prompts = Vec::new();
                for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
                    let row = row.with_context(|| {
                        format!("{}: invalid row {}", path.display(), i + 1)
                    })?;
                    match row.question.or(row.prompt) {
                        Some(prompt) => prompts.push(prompt),
                        None => bail!(
                            "{}: row {} has no question or prompt column",
                            path.display(),
                            i + 1
                        ),
                    }
                }
                prompts
            }
            _ => text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| line.replace("\\n", "\n"))
                .collect(),
        };

        if prompts.is_empty() {
            bail!("No prompts found in {}", path.display());
        }

        info!(path = %path.display(), prompts = prompts.len(), "Loaded prompt dataset");
        Ok(Self { prompts })
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Consecutive, non-overlapping batches in dataset order. The last batch
    /// is short when `batch_size` does not divide the dataset.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = &[String]> {
        self.prompts.chunks(batch_size.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_json_strings_and_objects() {
        let file = write_temp(
            ".json",
            r#"["Roses are red,\n", {"question": "Over the hills\n"}, {"prompt": "Far away"}]"#,
        );
        let ds = PromptDataset::load_from_file(file.path()).unwrap();
        assert_eq!(
            ds.prompts(),
            &["Roses are red,\n", "Over the hills\n", "Far away"]
        );
    }

    #[test]
    fn test_load_jsonl_skips_blank_lines() {
        let file = write_temp(".jsonl", "{\"question\": \"a\"}\n\n\"b\"\n");
        let ds = PromptDataset::load_from_file(file.path()).unwrap();
        assert_eq!(ds.prompts(), &["a", "b"]);
    }

    #[test]
    fn test_load_jsonl_reports_bad_line() {
        let file = write_temp(".jsonl", "\"ok\"\n{\"answer\": 1}\n");
        let err = PromptDataset::load_from_file(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains(":2:"));
    }

    #[test]
    fn test_load_csv_question_column_with_multiline_cell() {
        let file = write_temp(
            ".csv",
            "question,answer\n\"Roses are red,\nViolets are blue,\",x\nOver the hills,y\n",
        );
        let ds = PromptDataset::load_from_file(file.path()).unwrap();
        assert_eq!(
            ds.prompts(),
            &["Roses are red,\nViolets are blue,", "Over the hills"]
        );
    }

    #[test]
    fn test_load_csv_prompt_column_fallback() {
        let file = write_temp(".csv", "id,prompt\n1,first\n2,\"second, with comma\"\n");
        let ds = PromptDataset::load_from_file(file.path()).unwrap();
        assert_eq!(ds.prompts(), &["first", "second, with comma"]);
    }

    #[test]
    fn test_load_csv_without_prompt_column_fails() {
        let file = write_temp(".csv", "title,answer\npoem,x\n");
        let err = PromptDataset::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("no question or prompt column"));
    }

    #[test]
    fn test_load_plain_text_expands_newlines() {
        let file = write_temp(".txt", "Roses are red,\\nViolets are blue,\\n\n\n  \nSecond\n");
        let ds = PromptDataset::load_from_file(file.path()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.prompts()[0], "Roses are red,\nViolets are blue,\n");
    }

    #[test]
    fn test_load_empty_file_fails() {
        let file = write_temp(".txt", "\n\n");
        assert!(PromptDataset::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_batches_preserve_order_and_short_tail() {
        let ds = PromptDataset::new((0..5).map(|i| i.to_string()).collect());
        let batches: Vec<&[String]> = ds.batches(2).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], &["0", "1"]);
        assert_eq!(batches[2], &["4"]);
    }
}
