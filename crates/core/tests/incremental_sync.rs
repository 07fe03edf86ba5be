//! End-to-end sync scenarios against an in-memory imagery source.

use std::collections::HashMap;
use std::fs;

use geo_types::{LineString, Polygon};
use mugimap_core::prelude::*;
use mugimap_core::source::Region;

/// Fixed scene list; each field yields a configured number of identical pixels.
struct FakeSource {
    scenes: Vec<Scene>,
    /// Pixels returned per field id; missing ids fail.
    pixels_per_field: HashMap<String, usize>,
    ndvi: f64,
    sampled: Vec<(ObservationDate, String)>,
}

impl FakeSource {
    fn new(scenes: &[(&str, &str)]) -> Self {
        Self {
            scenes: scenes
                .iter()
                .map(|(date, id)| Scene {
                    date: date.parse().unwrap(),
                    source_id: id.to_string(),
                    cloud_cover: Some(5.0),
                })
                .collect(),
            pixels_per_field: HashMap::from([("A".to_string(), 3), ("B".to_string(), 2)]),
            ndvi: 0.5,
            sampled: Vec::new(),
        }
    }
}

impl ImagerySource for FakeSource {
    fn list_scenes(&mut self, _region: &Region, window: &DateWindow) -> Result<Vec<Scene>> {
        Ok(self
            .scenes
            .iter()
            .filter(|s| window.contains(s.date))
            .cloned()
            .collect())
    }

    fn sample_field(&mut self, scene: &Scene, field: &FieldTarget) -> Result<Vec<PixelRecord>> {
        self.sampled.push((scene.date, field.polygon_uu.clone()));
        let n = *self
            .pixels_per_field
            .get(&field.polygon_uu)
            .ok_or_else(|| Error::Source(format!("sample failed for {}", field.polygon_uu)))?;
        Ok((0..n)
            .map(|i| PixelRecord {
                lat: 33.0 + i as f64 * 1e-4,
                lon: 131.0,
                ndvi: Some(self.ndvi),
                ndwi: Some(-0.1),
                gndvi: None,
            })
            .collect())
    }
}

fn square(x: f64, y: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![(x, y), (x + 0.001, y), (x + 0.001, y + 0.001), (x, y + 0.001), (x, y)]),
        vec![],
    )
}

fn targets() -> Vec<FieldTarget> {
    vec![
        FieldTarget {
            polygon_uu: "A".into(),
            address: "大字新庄 1".into(),
            polygon: square(131.0, 33.0),
        },
        FieldTarget {
            polygon_uu: "B".into(),
            address: "大字新庄 2".into(),
            polygon: square(131.01, 33.0),
        },
    ]
}

fn d(s: &str) -> ObservationDate {
    s.parse().unwrap()
}

fn window() -> DateWindow {
    DateWindow::new(d("2025-12-01"), d("2026-01-01")).unwrap()
}

fn region() -> Region {
    Region::from_targets(&targets()).unwrap()
}

#[test]
fn two_new_dates_on_empty_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path().join("cache"));
    let mut source = FakeSource::new(&[("2025-12-14", "S2B_14"), ("2025-12-02", "S2A_02")]);

    let mut sync = IncrementalSync::new(store.clone(), HistoryLedger::new(), false);
    let outcome = sync.run(&mut source, &region(), &window(), &targets()).unwrap();

    let SyncOutcome::Updated { reports, existing } = &outcome else {
        panic!("expected an update, got {outcome:?}");
    };
    assert!(existing.is_empty());
    // ascending calendar order
    assert_eq!(reports[0].date, d("2025-12-02"));
    assert_eq!(reports[1].date, d("2025-12-14"));
    assert_eq!(outcome.latest_new_date(), Some(d("2025-12-14")));

    assert!(store.exists(d("2025-12-02")));
    assert!(store.exists(d("2025-12-14")));

    let ledger = sync.into_ledger();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger.source_id(d("2025-12-02")), Some("S2A_02"));
    assert_eq!(ledger.pixel_count(d("2025-12-14")), Some(5));

    let record = store.read(d("2025-12-14")).unwrap();
    assert_eq!(record.fields.len(), 2);
    assert_eq!(record.fields[0].address, "大字新庄 1");
    assert_eq!(record.fields[0].boundary.len(), 5);
}

#[test]
fn failed_fields_are_skipped_and_empty_fields_kept() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path());
    let mut source = FakeSource::new(&[("2025-12-14", "S2B_14")]);
    source.pixels_per_field = HashMap::from([("A".to_string(), 0)]);

    let mut sync = IncrementalSync::new(store.clone(), HistoryLedger::new(), false);
    let outcome = sync.run(&mut source, &region(), &window(), &targets()).unwrap();
    let SyncOutcome::Updated { reports, .. } = outcome else {
        panic!("expected an update");
    };

    let report = &reports[0];
    assert_eq!((report.sampled(), report.skipped()), (1, 1));
    assert_eq!(
        report.outcomes[0],
        FieldOutcome::Sampled {
            polygon_uu: "A".into(),
            pixels: 0
        }
    );
    assert!(matches!(&report.outcomes[1], FieldOutcome::Skipped { reason, .. } if reason.contains("sample failed")));

    // the fully masked field keeps its boundary; the failed one is absent
    let record = store.read(d("2025-12-14")).unwrap();
    assert_eq!(record.fields.len(), 1);
    assert_eq!(record.fields[0].polygon_uu, "A");
    assert!(record.fields[0].pixels.is_empty());
    assert_eq!(record.fields[0].boundary.len(), 5);
    assert_eq!(sync.ledger().pixel_count(d("2025-12-14")), Some(0));
}

#[test]
fn rerun_without_new_imagery_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path());
    let mut source = FakeSource::new(&[("2025-12-14", "S2B_14")]);

    let mut first = IncrementalSync::new(store.clone(), HistoryLedger::new(), false);
    first.run(&mut source, &region(), &window(), &targets()).unwrap();
    let ledger = first.into_ledger();
    let before = fs::read(store.path_for(d("2025-12-14"))).unwrap();

    source.ndvi = 0.9;
    source.sampled.clear();
    let mut second = IncrementalSync::new(store.clone(), ledger.clone(), false);
    let outcome = second.run(&mut source, &region(), &window(), &targets()).unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::NothingNew {
            existing: vec![d("2025-12-14")]
        }
    );
    assert!(source.sampled.is_empty());
    assert_eq!(second.ledger(), &ledger);
    assert_eq!(fs::read(store.path_for(d("2025-12-14"))).unwrap(), before);
}

#[test]
fn no_scenes_is_an_early_exit() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = FakeSource::new(&[]);
    let mut sync = IncrementalSync::new(CacheStore::new(dir.path()), HistoryLedger::new(), false);
    let outcome = sync.run(&mut source, &region(), &window(), &targets()).unwrap();
    assert_eq!(outcome, SyncOutcome::NoScenes);
    assert!(!outcome.needs_publish());
    assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn forced_rebuild_with_no_scenes_still_publishes() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = FakeSource::new(&[]);
    let mut sync = IncrementalSync::new(CacheStore::new(dir.path()), HistoryLedger::new(), true);
    let outcome = sync.run(&mut source, &region(), &window(), &targets()).unwrap();
    assert!(outcome.needs_publish());
    assert_eq!(outcome.latest_new_date(), None);
}

#[test]
fn force_rebuild_overwrites_cache_and_pixel_count() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path());
    let mut source = FakeSource::new(&[("2025-12-14", "S2B_14")]);

    let mut first = IncrementalSync::new(store.clone(), HistoryLedger::new(), false);
    first.run(&mut source, &region(), &window(), &targets()).unwrap();
    let ledger = first.into_ledger();
    assert_eq!(ledger.pixel_count(d("2025-12-14")), Some(5));

    source.pixels_per_field.insert("B".into(), 7);
    source.ndvi = 0.8;
    source.scenes[0].source_id = "S2B_14_reprocessed".into();

    let mut rebuild = IncrementalSync::new(store.clone(), ledger, true);
    rebuild.run(&mut source, &region(), &window(), &targets()).unwrap();
    let ledger = rebuild.into_ledger();

    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.pixel_count(d("2025-12-14")), Some(10));
    assert_eq!(ledger.source_id(d("2025-12-14")), Some("S2B_14_reprocessed"));
    let record = store.read(d("2025-12-14")).unwrap();
    assert_eq!(record.fields[0].pixels[0].ndvi, Some(0.8));
}

#[test]
fn ledger_dates_always_have_cache_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path().join("cache"));
    let ledger_path = dir.path().join("observation_history.json");
    let mut source = FakeSource::new(&[("2025-12-02", "a"), ("2025-12-09", "b"), ("2025-12-21", "c")]);

    let mut sync = IncrementalSync::new(store.clone(), HistoryLedger::load(&ledger_path).unwrap(), false);
    sync.run(&mut source, &region(), &window(), &targets()).unwrap();
    sync.into_ledger().save(&ledger_path).unwrap();

    let ledger = HistoryLedger::load(&ledger_path).unwrap();
    assert_eq!(ledger.len(), 3);
    for date in ledger.dates() {
        assert!(store.read(*date).is_ok(), "{date} has no readable cache file");
    }
}
