use crate::config::Config;
use crate::document_file::DocumentFile;
use anyhow::{bail, Context as _, Result};
use clap::Args;
use colored::Colorize;
use massing_document::{Context, Document};
use massing_sync::DeltasRecord;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Document file the log starts from
    pub document: PathBuf,

    /// JSON array of committed delta records
    pub log: PathBuf,

    /// Where to write the result, defaults to the input document
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Apply records even when their hashes disagree with the document
    #[arg(long)]
    pub skip_hash_check: bool,
}

/// Apply `records` in order, returning how many were applied
pub fn replay_records(document: &mut Document, records: &[DeltasRecord], check_hashes: bool) -> Result<usize> {
    let ctx = Context::default();

    for (index, record) in records.iter().enumerate() {
        if check_hashes && record.prev_hash != document.hash() {
            bail!(
                "record {} expects hash {:#010x}, document is at {:#010x}",
                index,
                record.prev_hash,
                document.hash()
            );
        }

        let committed = document
            .apply_remote_deltas(&ctx, &record.deltas)
            .with_context(|| format!("record {} from user {} failed to apply", index, record.origin))?;
        debug!(index, origin = record.origin, hash = committed.hash, "replayed record");

        if check_hashes && committed.hash != record.total_hash {
            bail!(
                "record {} produced hash {:#010x}, log says {:#010x}",
                index,
                committed.hash,
                record.total_hash
            );
        }
    }

    Ok(records.len())
}

pub fn replay(args: ReplayArgs, config: &Config) -> Result<()> {
    let file = DocumentFile::read(&args.document)?;
    let mut document = file.open(&config.document)?;

    let content = fs::read_to_string(&args.log).with_context(|| format!("cannot read {}", args.log.display()))?;
    let records: Vec<DeltasRecord> =
        serde_json::from_str(&content).with_context(|| format!("{} is not a delta log", args.log.display()))?;

    println!("{} {} records", "Replaying".cyan().bold(), records.len());
    let applied = replay_records(&mut document, &records, !args.skip_hash_check)?;

    let output = args.output.unwrap_or(args.document);
    DocumentFile::from_document(&document).write(&output)?;

    println!(
        "  {} {} records applied, hash {}",
        "✓".green(),
        applied,
        format!("{:#010x}", document.hash()).yellow()
    );
    println!("  {} Wrote {}", "✓".green(), output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use massing_common::point;
    use massing_document::DocumentConfig;

    fn recorded_session() -> (Document, Document, Vec<DeltasRecord>) {
        let ctx = Context::default();
        let start = Document::new(0, DocumentConfig::default()).unwrap();
        let mut live = Document::from_record(&start.to_record(), 1, DocumentConfig::default(), start.hash()).unwrap();
        live.enable_journal();

        let root = live.root_group_id();
        live.add_edge(&ctx, root, point(0.0, 0.0, 0.0), point(2.0, 0.0, 0.0))
            .unwrap();
        live.add_vertex(&ctx, root, point(0.0, 3.0, 0.0)).unwrap();
        live.undo(&ctx).unwrap();

        let records = live
            .take_journal()
            .iter()
            .map(|batch| DeltasRecord::from_commit(1, batch))
            .collect();
        (start, live, records)
    }

    #[test]
    fn test_replay_reaches_same_state() {
        let (mut start, live, records) = recorded_session();

        let applied = replay_records(&mut start, &records, true).unwrap();

        assert_eq!(applied, 3);
        assert!(start.state_eq(&live));
        assert_eq!(start.hash(), live.hash());
    }

    #[test]
    fn test_replay_rejects_out_of_order_log() {
        let (mut start, _, mut records) = recorded_session();
        records.swap(0, 1);

        let err = replay_records(&mut start, &records, true).unwrap_err();
        assert!(err.to_string().contains("record 0 expects hash"));
    }

    #[test]
    fn test_replay_writes_output_file() {
        let (start, live, records) = recorded_session();
        let dir = tempfile::tempdir().unwrap();
        let document = dir.path().join("doc.massing.json");
        let log = dir.path().join("log.json");
        let output = dir.path().join("out.massing.json");

        DocumentFile::from_document(&start).write(&document).unwrap();
        fs::write(&log, serde_json::to_string(&records).unwrap()).unwrap();

        let args = ReplayArgs {
            document: document.clone(),
            log,
            output: Some(output.clone()),
            skip_hash_check: false,
        };
        replay(args, &Config::default()).unwrap();

        let written = DocumentFile::read(&output).unwrap();
        assert_eq!(written.hash, live.hash());
        assert_eq!(written.document, live.to_record());
        // Input untouched when an output path is given
        assert_eq!(DocumentFile::read(&document).unwrap().hash, start.hash());
    }
}
