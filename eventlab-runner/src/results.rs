//! Results table: one CSV line per configuration, written in input order.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("cannot open results file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write results: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush results: {0}")]
    Io(#[from] std::io::Error),
    #[error("summary statistics missing '{0}'")]
    MissingStat(&'static str),
    #[error("summary statistic '{label}' is not numeric: '{value}'")]
    NotNumeric { label: String, value: String },
    #[error("results sink lock poisoned")]
    Poisoned,
    #[error("row {0} submitted twice")]
    Duplicate(usize),
}

/// Labels expected from the portfolio, in output order.
pub const SUMMARY_LABELS: [&str; 4] = [
    "Total Return",
    "Sharpe Ratio",
    "Max Drawdown",
    "Drawdown Duration",
];

/// Marker written in place of the statistics for a failed configuration.
pub const FAILED_MARKER: &str = "FAILED";

/// Summary statistics as output fields: `%` suffix stripped, numeric checked.
pub fn summary_fields(stats: &[(String, String)]) -> Result<Vec<String>, ResultsError> {
    SUMMARY_LABELS
        .iter()
        .map(|&label| {
            let value = stats
                .iter()
                .find(|(l, _)| l == label)
                .map(|(_, v)| v.trim())
                .ok_or(ResultsError::MissingStat(label))?;
            let bare = value.strip_suffix('%').unwrap_or(value).trim();
            if bare.parse::<f64>().is_err() {
                return Err(ResultsError::NotNumeric {
                    label: label.to_string(),
                    value: value.to_string(),
                });
            }
            Ok(bare.to_string())
        })
        .collect()
}

/// Fields for a failed configuration: `params…,FAILED,,,`.
pub fn failure_fields(mut params: Vec<String>) -> Vec<String> {
    params.push(FAILED_MARKER.to_string());
    params.extend(std::iter::repeat(String::new()).take(SUMMARY_LABELS.len() - 1));
    params
}

struct SinkState<W: Write> {
    writer: csv::Writer<W>,
    next: usize,
    pending: BTreeMap<usize, Vec<String>>,
    written: usize,
}

/// Ordered, incrementally flushed CSV sink.
///
/// Rows may be submitted from several threads in any order. Each row is
/// buffered under its input index and written as soon as every earlier
/// index has been written, then the writer is flushed. The file on disk is
/// therefore always a prefix of the input order.
pub struct OrderedCsvSink<W: Write> {
    state: Mutex<SinkState<W>>,
}

impl OrderedCsvSink<std::fs::File> {
    /// Append to `path`, creating it if needed. No header row is written.
    pub fn append(path: &Path) -> Result<Self, ResultsError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ResultsError::Open {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self::new(file))
    }
}

impl<W: Write> OrderedCsvSink<W> {
    pub fn new(inner: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(inner);
        Self {
            state: Mutex::new(SinkState {
                writer,
                next: 0,
                pending: BTreeMap::new(),
                written: 0,
            }),
        }
    }

    /// Buffer the row for `index` and write out the contiguous prefix.
    pub fn submit(&self, index: usize, fields: Vec<String>) -> Result<(), ResultsError> {
        let mut state = self.state.lock().map_err(|_| ResultsError::Poisoned)?;
        if index < state.next || state.pending.contains_key(&index) {
            return Err(ResultsError::Duplicate(index));
        }
        state.pending.insert(index, fields);

        let mut wrote = false;
        loop {
            let next = state.next;
            let Some(fields) = state.pending.remove(&next) else {
                break;
            };
            state.writer.write_record(&fields)?;
            state.next += 1;
            state.written += 1;
            wrote = true;
        }
        if wrote {
            state.writer.flush()?;
        }
        Ok(())
    }

    /// Rows written so far.
    pub fn written(&self) -> usize {
        self.state.lock().map(|s| s.written).unwrap_or(0)
    }

    /// Rows buffered behind a gap.
    pub fn pending(&self) -> usize {
        self.state.lock().map(|s| s.pending.len()).unwrap_or(0)
    }

    /// Flush and return the underlying writer. Rows still behind a gap are dropped.
    pub fn finish(self) -> Result<W, ResultsError> {
        let state = self.state.into_inner().map_err(|_| ResultsError::Poisoned)?;
        state
            .writer
            .into_inner()
            .map_err(|e| ResultsError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total: &str) -> Vec<(String, String)> {
        vec![
            ("Total Return".into(), total.into()),
            ("Sharpe Ratio".into(), "1.25".into()),
            ("Max Drawdown".into(), "4.10%".into()),
            ("Drawdown Duration".into(), "37".into()),
        ]
    }

    fn text(sink: OrderedCsvSink<Vec<u8>>) -> String {
        String::from_utf8(sink.finish().unwrap()).unwrap()
    }

    #[test]
    fn percent_suffix_is_stripped() {
        assert_eq!(
            summary_fields(&stats("-2.50%")).unwrap(),
            vec!["-2.50", "1.25", "4.10", "37"]
        );
    }

    #[test]
    fn non_numeric_stat_is_rejected() {
        assert!(matches!(
            summary_fields(&stats("n/a")),
            Err(ResultsError::NotNumeric { .. })
        ));
        assert!(matches!(
            summary_fields(&stats("1.0%")[..2]),
            Err(ResultsError::MissingStat("Max Drawdown"))
        ));
    }

    #[test]
    fn failure_row_shape() {
        assert_eq!(
            failure_fields(vec!["100".into(), "3".into(), "0.5".into()]),
            vec!["100", "3", "0.5", "FAILED", "", "", ""]
        );
    }

    #[test]
    fn out_of_order_rows_are_written_in_index_order() {
        let sink = OrderedCsvSink::new(Vec::new());
        sink.submit(2, vec!["c".into()]).unwrap();
        sink.submit(1, vec!["b".into()]).unwrap();
        assert_eq!(sink.written(), 0);
        assert_eq!(sink.pending(), 2);
        sink.submit(0, vec!["a".into()]).unwrap();
        assert_eq!(sink.written(), 3);
        assert_eq!(text(sink), "a\nb\nc\n");
    }

    #[test]
    fn rows_behind_a_gap_are_not_written() {
        let sink = OrderedCsvSink::new(Vec::new());
        sink.submit(0, vec!["a".into(), "1".into()]).unwrap();
        sink.submit(2, vec!["c".into(), "3".into()]).unwrap();
        assert!(matches!(sink.submit(0, vec![]), Err(ResultsError::Duplicate(0))));
        assert_eq!(text(sink), "a,1\n");
    }

    #[test]
    fn failed_row_renders_trailing_empty_fields() {
        let sink = OrderedCsvSink::new(Vec::new());
        sink.submit(0, failure_fields(vec!["50".into()])).unwrap();
        assert_eq!(text(sink), "50,FAILED,,,\n");
    }

    #[test]
    fn append_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "old,row\n").unwrap();

        let sink = OrderedCsvSink::append(&path).unwrap();
        sink.submit(0, vec!["new".into(), "row".into()]).unwrap();
        drop(sink);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old,row\nnew,row\n");
    }
}
