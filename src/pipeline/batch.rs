use std::path::PathBuf;

use crate::config::{AlignConfig, LanguageTable};
use crate::error::AlignmentError;
use crate::matching::MatchReport;
use crate::output::{read_existing, render_srt, timestamps_path, write_json, FileTimestamps};
use crate::pipeline::progress::{ItemStatus, Stage};
use crate::pipeline::runtime::TimestampAligner;
use crate::types::Match;

#[derive(Debug)]
pub enum ItemOutcome {
    Aligned(FileTimestamps),
    /// A non-empty result from an earlier run was reused.
    Skipped(FileTimestamps),
    Failed(AlignmentError),
}

#[derive(Debug)]
pub struct ItemReport {
    pub base_name: String,
    pub outcome: ItemOutcome,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub items: Vec<ItemReport>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Aligned(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed(_)))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Results of aligned and skipped items, in match order.
    pub fn timestamps(&self) -> Vec<&FileTimestamps> {
        self.items
            .iter()
            .filter_map(|item| match &item.outcome {
                ItemOutcome::Aligned(ts) | ItemOutcome::Skipped(ts) => Some(ts),
                ItemOutcome::Failed(_) => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|item| pred(&item.outcome)).count()
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Receives one `<base name>_timestamps.json` per aligned match.
    pub output_dir: PathBuf,
    pub write_srt: bool,
}

/// Aligns every complete match in turn.
///
/// A match whose timestamps file already exists and is non-empty is skipped,
/// which makes reruns resumable. Nothing is locked: two runs sharing an
/// output directory can both miss the file and both write it, or one can
/// read the other's partial write.
pub struct BatchRunner<'a> {
    aligner: &'a TimestampAligner,
    options: BatchOptions,
}

impl<'a> BatchRunner<'a> {
    pub fn new(aligner: &'a TimestampAligner, options: BatchOptions) -> Self {
        Self { aligner, options }
    }

    /// Only configuration errors abort the run; they are checked before the
    /// first match is touched. Every other failure is recorded against its
    /// match and the batch moves on.
    pub fn run(
        &self,
        report: &MatchReport,
        config: &AlignConfig,
        languages: Option<&LanguageTable>,
    ) -> Result<BatchSummary, AlignmentError> {
        config.validate(languages)?;
        std::fs::create_dir_all(&self.options.output_dir)
            .map_err(|e| AlignmentError::io("create output directory", e))?;

        let mut summary = BatchSummary::default();
        for item in &report.matches {
            let issue = report
                .issues
                .iter()
                .find(|issue| issue.base_name == item.base_name);
            let outcome = match issue.map(AlignmentError::from) {
                Some(err) => {
                    self.aligner
                        .report(Stage::Matching, &item.base_name, ItemStatus::Failed(err.to_string()));
                    ItemOutcome::Failed(err)
                }
                None => self.process(item, config)?,
            };
            summary.items.push(ItemReport {
                base_name: item.base_name.clone(),
                outcome,
            });
        }

        tracing::info!(
            succeeded = summary.succeeded(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "batch finished"
        );
        Ok(summary)
    }

    fn process(&self, item: &Match, config: &AlignConfig) -> Result<ItemOutcome, AlignmentError> {
        let name = item.base_name.as_str();
        let path = timestamps_path(&self.options.output_dir, name);
        match read_existing(&path) {
            Ok(Some(existing)) => {
                tracing::info!(item = name, path = %path.display(), "timestamps exist, skipping");
                self.aligner.report(Stage::Writing, name, ItemStatus::Skipped);
                return Ok(ItemOutcome::Skipped(existing));
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(item = name, error = %err, "unreadable earlier result, realigning");
            }
        }

        let mut stage = Stage::Segmenting;
        let result = self
            .aligner
            .align_match_tracked(item, config, &mut stage)
            .and_then(|timestamps| {
                stage = Stage::Writing;
                self.persist(name, &timestamps).map(|()| timestamps)
            });
        match result {
            Ok(timestamps) => {
                self.aligner.report(Stage::Writing, name, ItemStatus::Succeeded);
                Ok(ItemOutcome::Aligned(timestamps))
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                tracing::warn!(item = name, stage = stage.as_str(), error = %err, "match failed");
                self.aligner
                    .report(stage, name, ItemStatus::Failed(err.to_string()));
                Ok(ItemOutcome::Failed(err))
            }
        }
    }

    fn persist(&self, name: &str, timestamps: &FileTimestamps) -> Result<(), AlignmentError> {
        write_json(&timestamps_path(&self.options.output_dir, name), timestamps)?;
        if self.options.write_srt {
            let srt_path = self.options.output_dir.join(format!("{name}.srt"));
            std::fs::write(&srt_path, render_srt(timestamps))
                .map_err(|e| AlignmentError::io("write srt", e))?;
        }
        Ok(())
    }
}

