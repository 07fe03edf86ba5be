//! Incremental sync: decide which observation dates need processing, sample
//! them, cache them and fold the results into the history ledger.
//!
//! A date is *new* when it has no cache file yet (or a rebuild is forced) and
//! *existing* otherwise. New dates are processed in ascending calendar order.
//! Ledger rules:
//!
//! - new date: source identifier overwritten, date appended to the list if
//!   absent, pixel count set to the sum over sampled fields;
//! - existing date: source identifier recorded only if the ledger has none.

use crate::date::{DateWindow, ObservationDate};
use crate::error::Result;
use crate::field::FieldTarget;
use crate::ledger::HistoryLedger;
use crate::record::{DateCacheRecord, FieldRecord};
use crate::source::{best_scene_per_date, ImagerySource, Region, Scene};
use crate::store::CacheStore;

/// Result of sampling one field on one date.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    Sampled { polygon_uu: String, pixels: usize },
    Skipped { polygon_uu: String, reason: String },
}

impl FieldOutcome {
    pub fn polygon_uu(&self) -> &str {
        match self {
            Self::Sampled { polygon_uu, .. } | Self::Skipped { polygon_uu, .. } => polygon_uu,
        }
    }

    pub fn is_sampled(&self) -> bool {
        matches!(self, Self::Sampled { .. })
    }
}

/// What happened while processing one new date.
#[derive(Debug, Clone, PartialEq)]
pub struct DateReport {
    pub date: ObservationDate,
    pub source_id: String,
    pub outcomes: Vec<FieldOutcome>,
}

impl DateReport {
    /// Pixels over all sampled fields; this is what the ledger records.
    pub fn pixel_count(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                FieldOutcome::Sampled { pixels, .. } => *pixels as u64,
                FieldOutcome::Skipped { .. } => 0,
            })
            .sum()
    }

    pub fn sampled(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_sampled()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.sampled()
    }
}

/// Partition of the available scenes, one scene per date, ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    pub new: Vec<Scene>,
    pub existing: Vec<Scene>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.existing.is_empty()
    }

    pub fn new_dates(&self) -> Vec<ObservationDate> {
        self.new.iter().map(|s| s.date).collect()
    }

    pub fn existing_dates(&self) -> Vec<ObservationDate> {
        self.existing.iter().map(|s| s.date).collect()
    }
}

/// How a sync run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The catalog returned no scenes; nothing was touched.
    NoScenes,
    /// Every available date is already cached; the ledger was left alone.
    NothingNew { existing: Vec<ObservationDate> },
    /// New dates were processed (or a rebuild was forced).
    Updated {
        reports: Vec<DateReport>,
        existing: Vec<ObservationDate>,
    },
}

impl SyncOutcome {
    /// Whether the maps and ledger should be rewritten.
    pub fn needs_publish(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }

    /// Latest date processed on this run.
    pub fn latest_new_date(&self) -> Option<ObservationDate> {
        match self {
            Self::Updated { reports, .. } => reports.iter().map(|r| r.date).max(),
            _ => None,
        }
    }
}

/// Owns the ledger for the duration of a run and applies the merge rules.
#[derive(Debug)]
pub struct IncrementalSync {
    store: CacheStore,
    ledger: HistoryLedger,
    force_rebuild: bool,
}

impl IncrementalSync {
    pub fn new(store: CacheStore, ledger: HistoryLedger, force_rebuild: bool) -> Self {
        Self {
            store,
            ledger,
            force_rebuild,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub fn into_ledger(self) -> HistoryLedger {
        self.ledger
    }

    /// Split `scenes` into new and existing dates. Does not touch the ledger.
    pub fn plan(&self, scenes: impl IntoIterator<Item = Scene>) -> SyncPlan {
        let mut plan = SyncPlan::default();
        for (date, scene) in best_scene_per_date(scenes) {
            if self.force_rebuild || !self.store.exists(date) {
                plan.new.push(scene);
            } else {
                plan.existing.push(scene);
            }
        }
        plan
    }

    /// Record the source identifiers of a plan in the ledger.
    pub fn apply_sources(&mut self, plan: &SyncPlan) {
        for scene in &plan.new {
            self.ledger.assign_source(scene.date, scene.source_id.as_str());
        }
        for scene in &plan.existing {
            self.ledger
                .remember_source(scene.date, scene.source_id.as_str());
        }
    }

    /// Sample every target on `scene`, write the date's cache record and
    /// update the ledger.
    ///
    /// Per-field failures become [`FieldOutcome::Skipped`]; only cache write
    /// errors abort. A field with zero clear pixels is still recorded, with
    /// an empty pixel list, so its outline is drawn for that date.
    pub fn process_date<S: ImagerySource>(
        &mut self,
        source: &mut S,
        scene: &Scene,
        targets: &[FieldTarget],
    ) -> Result<DateReport> {
        let mut record = DateCacheRecord::new(scene.date);
        let mut outcomes = Vec::with_capacity(targets.len());

        for (i, target) in targets.iter().enumerate() {
            let outcome = match source.sample_field(scene, target) {
                Ok(pixels) => {
                    let count = pixels.len();
                    record.fields.push(FieldRecord {
                        polygon_uu: target.polygon_uu.clone(),
                        address: target.address.clone(),
                        boundary: target.boundary_ring(),
                        pixels,
                    });
                    FieldOutcome::Sampled {
                        polygon_uu: target.polygon_uu.clone(),
                        pixels: count,
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "{} [{}/{}] {}: {}",
                        scene.date,
                        i + 1,
                        targets.len(),
                        target.address,
                        e
                    );
                    FieldOutcome::Skipped {
                        polygon_uu: target.polygon_uu.clone(),
                        reason: e.to_string(),
                    }
                }
            };
            match &outcome {
                FieldOutcome::Sampled { pixels, .. } => tracing::debug!(
                    "{} [{}/{}] {}: {}px",
                    scene.date,
                    i + 1,
                    targets.len(),
                    target.address,
                    pixels
                ),
                FieldOutcome::Skipped { reason, .. } => tracing::debug!(
                    "{} [{}/{}] {}: skipped ({})",
                    scene.date,
                    i + 1,
                    targets.len(),
                    target.address,
                    reason
                ),
            }
            outcomes.push(outcome);
        }

        let report = DateReport {
            date: scene.date,
            source_id: scene.source_id.clone(),
            outcomes,
        };
        self.store.write(&record)?;
        self.ledger.record_processed(scene.date, report.pixel_count());
        tracing::info!(
            "{}: {} pixels from {} fields ({} skipped)",
            scene.date,
            report.pixel_count(),
            report.sampled(),
            report.skipped()
        );
        Ok(report)
    }

    /// Search, plan and process in one go.
    pub fn run<S: ImagerySource>(
        &mut self,
        source: &mut S,
        region: &Region,
        window: &DateWindow,
        targets: &[FieldTarget],
    ) -> Result<SyncOutcome> {
        let scenes = source.list_scenes(region, window)?;
        tracing::info!("{} scenes in {}", scenes.len(), window.to_interval());
        if scenes.is_empty() && !self.force_rebuild {
            return Ok(SyncOutcome::NoScenes);
        }

        let plan = self.plan(scenes);
        tracing::info!(
            "{} new dates, {} cached",
            plan.new.len(),
            plan.existing.len()
        );
        if plan.new.is_empty() && !self.force_rebuild {
            return Ok(SyncOutcome::NothingNew {
                existing: plan.existing_dates(),
            });
        }

        self.apply_sources(&plan);
        let mut reports = Vec::with_capacity(plan.new.len());
        for scene in &plan.new {
            reports.push(self.process_date(source, scene, targets)?);
        }
        Ok(SyncOutcome::Updated {
            reports,
            existing: plan.existing_dates(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> ObservationDate {
        s.parse().unwrap()
    }

    fn scene(day: &str, id: &str) -> Scene {
        Scene {
            date: date(day),
            source_id: id.into(),
            cloud_cover: Some(10.0),
        }
    }

    #[test]
    fn plan_partitions_on_cache_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.write(&DateCacheRecord::new(date("2025-12-02"))).unwrap();

        let sync = IncrementalSync::new(store.clone(), HistoryLedger::new(), false);
        let plan = sync.plan(vec![scene("2025-12-14", "b"), scene("2025-12-02", "a")]);
        assert_eq!(plan.new_dates(), vec![date("2025-12-14")]);
        assert_eq!(plan.existing_dates(), vec![date("2025-12-02")]);

        let forced = IncrementalSync::new(store, HistoryLedger::new(), true);
        let plan = forced.plan(vec![scene("2025-12-14", "b"), scene("2025-12-02", "a")]);
        assert_eq!(plan.new.len(), 2);
        assert_eq!(plan.new[0].source_id, "a");
    }

    #[test]
    fn apply_sources_respects_merge_rules() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = HistoryLedger::new();
        ledger.assign_source("2025-12-02".parse().unwrap(), "old-a");
        ledger.assign_source("2025-12-14".parse().unwrap(), "old-b");

        let mut sync = IncrementalSync::new(CacheStore::new(dir.path()), ledger, false);
        let plan = SyncPlan {
            new: vec![scene("2025-12-14", "new-b")],
            existing: vec![scene("2025-12-02", "new-a"), scene("2025-12-26", "new-c")],
        };
        sync.apply_sources(&plan);

        let l = sync.ledger();
        assert_eq!(l.source_id("2025-12-14".parse().unwrap()), Some("new-b"));
        assert_eq!(l.source_id("2025-12-02".parse().unwrap()), Some("old-a"));
        assert_eq!(l.source_id("2025-12-26".parse().unwrap()), Some("new-c"));
        // sources alone do not list a date as processed
        assert!(l.is_empty());
    }

    #[test]
    fn report_counts_only_sampled_pixels() {
        let report = DateReport {
            date: "2025-12-14".parse().unwrap(),
            source_id: "x".into(),
            outcomes: vec![
                FieldOutcome::Sampled { polygon_uu: "a".into(), pixels: 12 },
                FieldOutcome::Skipped { polygon_uu: "b".into(), reason: "timed out".into() },
                FieldOutcome::Sampled { polygon_uu: "c".into(), pixels: 3 },
            ],
        };
        assert_eq!(report.pixel_count(), 15);
        assert_eq!((report.sampled(), report.skipped()), (2, 1));
        assert_eq!(report.outcomes[1].polygon_uu(), "b");
    }
}
