use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};
use anyhow::Result;
use crate::error::CollectorError;
use crate::reconcile::{reconcile, ReconcileStats};
use crate::rules::RuleSet;
use crate::store::SdFile;
use crate::zone::ZoneSource;

/// Outcome of one successful cycle for one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub domain: String,
    /// A records in the zone snapshot
    pub records: usize,
    pub stats: ReconcileStats,
    /// Groups in the persisted document
    pub groups: usize,
    /// False when the file already held the same content
    pub written: bool,
}

/// Runs poll cycles: transfer, build targets, load, reconcile, save.
pub struct Collector<S> {
    source: S,
    rules: RuleSet,
    output_dir: PathBuf,
    span: Span,
}

impl<S: ZoneSource> Collector<S> {
    /// `span` is the parent of every cycle's span.
    pub fn new(source: S, rules: RuleSet, output_dir: impl Into<PathBuf>, span: Span) -> Self {
        Self {
            source,
            rules,
            output_dir: output_dir.into(),
            span,
        }
    }

    /// One complete cycle for `domain`. A failed transfer returns before
    /// the document is loaded, so the previous file stays untouched.
    pub async fn run_cycle(&self, domain: &str) -> Result<CycleReport, CollectorError> {
        let records = self
            .source
            .transfer(domain)
            .await
            .map_err(|source| CollectorError::Transfer {
                domain: domain.to_string(),
                source,
            })?;

        let targets = self.rules.build_targets(&records);

        let file = SdFile::for_domain(&self.output_dir, domain);
        let mut doc = file.load();
        let stats = reconcile(&mut doc, &targets);
        let written = file.save(&doc)?;
        tracing::debug!(path = %file.path().display(), written, "Document reconciled");

        Ok(CycleReport {
            domain: domain.to_string(),
            records: records.len(),
            stats,
            groups: doc.groups.len(),
            written,
        })
    }

    /// Run a cycle for every domain in turn. Failures are logged and do not
    /// stop the remaining domains.
    pub async fn poll(&self, domains: &[String]) -> Vec<Result<CycleReport, CollectorError>> {
        let mut outcomes = Vec::with_capacity(domains.len());

        for domain in domains {
            let span = tracing::info_span!(parent: &self.span, "cycle", domain = %domain);
            let outcome = self.run_cycle(domain).instrument(span.clone()).await;

            span.in_scope(|| match &outcome {
                Ok(report) => tracing::info!(
                    records = report.records,
                    added = report.stats.added,
                    removed = report.stats.removed,
                    created = report.stats.created,
                    pruned = report.stats.pruned,
                    groups = report.groups,
                    written = report.written,
                    "Cycle complete"
                ),
                Err(e @ CollectorError::Write { .. }) => {
                    tracing::error!("Cycle failed: {}", e);
                }
                Err(e) => {
                    tracing::warn!("Cycle aborted: {}", e);
                }
            });
            outcomes.push(outcome);
        }

        outcomes
    }
}

/// Poll loop - cycles on a fixed interval until cancelled.
/// Cancellation is observed between cycles only.
pub async fn run<S: ZoneSource>(
    collector: Collector<S>,
    domains: Vec<String>,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Collector shutting down");
                break;
            }
            _ = ticker.tick() => {
                collector.poll(&domains).await;
            }
        }
    }

    Ok(())
}
