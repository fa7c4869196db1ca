//! The stages of one pipeline run: fetch, save, analyze, sync.
//!
//! Each stage publishes progress before it starts and after every item.
//! Per-message failures, including store errors and panics during one
//! message's analysis, are recorded on the message and counted. Only a
//! fetch failure or a store failure outside a single message ends the run.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use futures_util::FutureExt;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::archive::{ArchiveSink, ArchiveSync, RetryPolicy, SyncError};
use crate::config::Config;
use crate::db::event_repo::{self, EventRow};
use crate::db::message_repo::{self, AnalysisUpdate, MessageRow, MessageStatus};
use crate::db::{format_timestamp, marker_repo, Database, DatabaseError};
use crate::extraction::{Analysis, Extractor, KeywordMatch, KeywordMatcher, LanguageModel, MessageInput};
use crate::mail::{MailBatch, MailSource};
use crate::reminder::ReminderScheduler;

use super::error::PipelineError;
use super::lock::RunLease;
use super::progress::{RunKind, TaskProgress, TaskStatus};

/// External collaborators a pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub mail: Arc<dyn MailSource>,
    pub model: Arc<dyn LanguageModel>,
    pub archive: Arc<dyn ArchiveSink>,
}

/// Aggregate counts of a finished run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub new_count: u32,
    pub saved: u32,
    pub analyzed: u32,
    pub failed: u32,
    pub synced: u32,
    pub sync_failed: u32,
}

impl RunSummary {
    pub fn describe(&self, kind: RunKind) -> String {
        let analysis = format!(
            "{} analyzed, {} failed, {} archived",
            self.analyzed, self.failed, self.synced
        );
        let mut text = match kind {
            RunKind::Check => format!(
                "Fetched {} new messages, saved {}: {}",
                self.new_count, self.saved, analysis
            ),
            RunKind::Reanalyze => format!("Reanalyzed messages: {}", analysis),
        };
        if self.sync_failed > 0 {
            text.push_str(&format!(", {} archive failures", self.sync_failed));
        }
        text
    }
}

enum Analyzed {
    Done(String),
    Failed(String),
    /// Another writer moved the message first.
    Skipped,
}

pub struct Pipeline {
    db: Database,
    mail: Arc<dyn MailSource>,
    extractor: Extractor,
    keywords: KeywordMatcher,
    scheduler: ReminderScheduler,
    archive: ArchiveSync,
    concurrency: usize,
}

impl Pipeline {
    pub fn from_config(config: &Config, db: Database, collaborators: Collaborators) -> Self {
        Self {
            extractor: Extractor::from_config(collaborators.model, &config.model, &config.reminder),
            keywords: KeywordMatcher::new(&config.keywords),
            scheduler: ReminderScheduler::from_config(&config.reminder),
            archive: ArchiveSync::new(
                db.clone(),
                collaborators.archive,
                RetryPolicy::from_config(&config.archive),
            ),
            mail: collaborators.mail,
            concurrency: config.pipeline.analyze_concurrency.max(1),
            db,
        }
    }

    /// Runs every stage for `kind`. A re-analysis skips fetch and save and
    /// picks up failed messages as well as unprocessed ones.
    pub async fn run(
        &self,
        kind: RunKind,
        progress: &TaskProgress,
        lease: &RunLease,
    ) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();

        let claimable: &[MessageStatus] = match kind {
            RunKind::Check => {
                progress.stage(TaskStatus::Fetching, "Fetching new mail");
                let batch = self.fetch().instrument(info_span!("fetch")).await?;
                summary.new_count = batch.messages.len() as u32;
                progress.set_new_count(summary.new_count);

                progress.stage(
                    TaskStatus::Saving,
                    format!("Saving {} messages", summary.new_count),
                );
                summary.saved = {
                    let _span = info_span!("save").entered();
                    self.save(&batch, progress, lease)?
                };
                &[MessageStatus::Unprocessed]
            }
            RunKind::Reanalyze => &[MessageStatus::Failed, MessageStatus::Unprocessed],
        };

        let ids = message_repo::list_ids_by_status(&self.db, claimable)?;
        progress.set_total(ids.len() as u32);
        progress.stage(
            TaskStatus::Analyzing,
            format!("Analyzing {} messages", ids.len()),
        );
        let processed = self
            .analyze(ids, claimable, progress, lease, &mut summary)
            .instrument(info_span!("analyze"))
            .await;

        progress.stage(
            TaskStatus::Syncing,
            format!("Archiving {} messages", processed.len()),
        );
        self.sync(&processed, progress, lease, &mut summary)
            .instrument(info_span!("sync"))
            .await;

        Ok(summary)
    }

    async fn fetch(&self) -> Result<MailBatch, PipelineError> {
        let source = self.mail.name();
        let marker = marker_repo::get(&self.db, source)?;
        debug!(source, marker = marker.as_deref().unwrap_or("-"), "listing new mail");

        let batch = self.mail.list_new(marker.as_deref()).await?;
        info!("Fetched {} messages from {}", batch.messages.len(), source);
        Ok(batch)
    }

    /// Persists messages not seen before, then advances the source marker.
    /// Returns how many were new.
    fn save(
        &self,
        batch: &MailBatch,
        progress: &TaskProgress,
        lease: &RunLease,
    ) -> Result<u32, PipelineError> {
        let now = format_timestamp(Utc::now());
        let mut saved = 0;

        for message in &batch.messages {
            let keywords = self.keywords.classify(&message.subject, &message.body);
            let row = MessageRow {
                id: message.id.clone(),
                sender: message.sender.clone(),
                subject: message.subject.clone(),
                body: message.body.clone(),
                received_at: format_timestamp(message.received_at),
                keywords: serde_json::to_string(&keywords)?,
                status: MessageStatus::Unprocessed,
                summary: None,
                importance_score: None,
                importance_reason: None,
                error: None,
                created_at: now.clone(),
                updated_at: now.clone(),
            };

            if message_repo::insert_if_absent(&self.db, &row)? {
                saved += 1;
                progress.record_saved();
            } else {
                debug!(message_id = %message.id, "message already stored");
            }
            lease.heartbeat();
        }

        if let Some(marker) = &batch.marker {
            marker_repo::set(&self.db, self.mail.name(), marker, &now)?;
        }
        Ok(saved)
    }

    async fn analyze(
        &self,
        ids: Vec<String>,
        claimable: &[MessageStatus],
        progress: &TaskProgress,
        lease: &RunLease,
        summary: &mut RunSummary,
    ) -> Vec<String> {
        let mut processed = Vec::with_capacity(ids.len());
        let mut results = stream::iter(ids)
            .map(|id| {
                let span = info_span!("message", message_id = %id);
                self.analyze_isolated(id, claimable).instrument(span)
            })
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = results.next().await {
            match outcome {
                Analyzed::Done(id) => {
                    summary.analyzed += 1;
                    progress.record_analyzed();
                    processed.push(id);
                }
                Analyzed::Failed(id) => {
                    summary.failed += 1;
                    progress.record_failed();
                    processed.push(id);
                }
                Analyzed::Skipped => {}
            }
            lease.heartbeat();
        }

        processed
    }

    /// Runs one analysis so that neither a store error nor a panic escapes:
    /// both fail only this message.
    async fn analyze_isolated(&self, id: String, claimable: &[MessageStatus]) -> Analyzed {
        let error = match AssertUnwindSafe(self.analyze_one(id.clone(), claimable))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "analysis panicked".to_string(),
        };

        error!("analysis aborted: {}", error);
        let now = format_timestamp(Utc::now());
        match message_repo::mark_failed(&self.db, &id, &error, &now) {
            Ok(true) => Analyzed::Failed(id),
            Ok(false) => Analyzed::Skipped,
            Err(e) => {
                error!("could not record failure: {}", e);
                Analyzed::Skipped
            }
        }
    }

    async fn analyze_one(
        &self,
        id: String,
        claimable: &[MessageStatus],
    ) -> Result<Analyzed, PipelineError> {
        let claimed_at = format_timestamp(Utc::now());
        if !message_repo::transition(&self.db, &id, claimable, MessageStatus::Analyzing, &claimed_at)? {
            debug!("message no longer claimable");
            return Ok(Analyzed::Skipped);
        }
        let Some(message) = message_repo::find_by_id(&self.db, &id)? else {
            return Ok(Analyzed::Skipped);
        };

        let keywords: Vec<KeywordMatch> = match serde_json::from_str(&message.keywords) {
            Ok(keywords) => keywords,
            Err(e) => {
                warn!(message_id = %id, "ignoring unreadable keyword matches: {}", e);
                Vec::new()
            }
        };
        let input = MessageInput {
            subject: &message.subject,
            body: &message.body,
            keywords: &keywords,
        };

        match self.extractor.extract(&input).await {
            Ok(analysis) => {
                self.store_analysis(&id, &analysis)?;
                Ok(Analyzed::Done(id))
            }
            Err(e) => {
                warn!("analysis failed: {}", e);
                let now = format_timestamp(Utc::now());
                message_repo::mark_failed(&self.db, &id, &e.to_string(), &now)?;
                Ok(Analyzed::Failed(id))
            }
        }
    }

    fn store_analysis(&self, id: &str, analysis: &Analysis) -> Result<(), PipelineError> {
        let now = Utc::now();
        let created_at = format_timestamp(now);

        let mut events = Vec::with_capacity(analysis.events.len());
        let mut deliveries = Vec::new();
        for (index, event) in analysis.events.iter().enumerate() {
            let event_id = event_repo::make_id(id, index);
            deliveries.extend(
                self.scheduler
                    .schedule(&event_id, event.start, event.tier(), now)
                    .iter()
                    .map(|d| d.to_row(&created_at)),
            );
            events.push(EventRow {
                id: event_id,
                message_id: id.to_string(),
                title: event.title.clone(),
                description: event.description.clone(),
                location: event.location.clone(),
                start_time: format_timestamp(event.start),
                end_time: event.end.map(format_timestamp),
                importance_score: event.importance.value(),
                tier: event.tier().as_str().to_string(),
                created_at: created_at.clone(),
            });
        }

        let update = AnalysisUpdate {
            summary: analysis.summary.clone(),
            importance_score: analysis.importance.value(),
            importance_reason: analysis.importance_reason.clone(),
            updated_at: created_at.clone(),
        };
        message_repo::complete_analysis(&self.db, id, &update, &events, &deliveries)?;
        info!(
            events = events.len(),
            deliveries = deliveries.len(),
            importance = analysis.importance.value(),
            "message analyzed"
        );
        Ok(())
    }

    /// Fails every message still claimed for analysis. Only the lock holder
    /// may claim messages, so these all belong to the run that is ending.
    pub fn fail_claimed(&self, reason: &str) -> Result<usize, DatabaseError> {
        message_repo::fail_stranded(&self.db, reason, &format_timestamp(Utc::now()))
    }

    /// Archives every message that reached a terminal status in this run.
    /// Failures are counted and never end the run.
    async fn sync(
        &self,
        ids: &[String],
        progress: &TaskProgress,
        lease: &RunLease,
        summary: &mut RunSummary,
    ) {
        for id in ids {
            let span = info_span!("message", message_id = %id);
            match self.sync_one(id).instrument(span).await {
                Ok(()) => {
                    summary.synced += 1;
                    progress.record_synced();
                }
                Err(e) => {
                    warn!(message_id = %id, sink = self.archive.sink_name(), "archive sync failed: {}", e);
                    summary.sync_failed += 1;
                    progress.record_sync_failed();
                }
            }
            lease.heartbeat();
        }
    }

    async fn sync_one(&self, id: &str) -> Result<(), SyncError> {
        let message = message_repo::find_by_id(&self.db, id)?
            .ok_or_else(|| SyncError::MessageNotFound(id.to_string()))?;
        let events = event_repo::list_for_message(&self.db, id)?;
        self.archive.sync(&message, &events).await?;
        Ok(())
    }
}
