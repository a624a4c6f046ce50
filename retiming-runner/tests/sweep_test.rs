//! Integration tests for the parameter sweep.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{Duration, NaiveDate};
use retiming_core::domain::PriceSeries;
use retiming_runner::runner::RunSettings;
use retiming_runner::sweep::{ParamGrid, ParamSweep};
use tempfile::TempDir;

/// A few trending legs with pullbacks, enough to trigger crosses and stops.
fn make_series(n: usize) -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let closes: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64;
            100.0 + 0.05 * t + 15.0 * (t / 40.0).sin() + 4.0 * (t / 7.0).cos()
        })
        .collect();
    PriceSeries::from_closes("SWEEP", start, Duration::hours(1), &closes).unwrap()
}

#[test]
fn small_grid_yields_two_valid_cells() {
    let grid = ParamGrid::new(vec![5, 10], vec![20], 0.10);
    assert_eq!(grid.size(), 2);
    let combos = grid.combinations();
    assert_eq!(combos.len(), 2);
    assert!(combos.iter().all(|p| p.short_window < p.long_window));

    let series = make_series(300);
    let results = ParamSweep::new(&series, RunSettings::default())
        .run(&grid)
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.failures().is_empty());
}

#[test]
fn failing_cell_does_not_abort_sweep() {
    // 400 bars: long=500 cannot be evaluated, long=100 can.
    let series = make_series(400);
    let grid = ParamGrid::new(vec![10, 20], vec![100, 500], 0.10);
    let results = ParamSweep::new(&series, RunSettings::default())
        .with_workers(2)
        .run(&grid)
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.all().iter().all(|r| r.params.long_window == 100));
    assert_eq!(results.failures().len(), 2);
    assert!(results
        .failures()
        .iter()
        .all(|f| f.params.long_window == 500 && f.message.contains("insufficient history")));
}

#[test]
fn parallel_matches_sequential() {
    let series = make_series(1_500);
    let grid = ParamGrid::new(vec![5, 10, 20, 40], vec![50, 100, 200], 0.10);

    let sequential = ParamSweep::new(&series, RunSettings::default())
        .with_workers(1)
        .run(&grid)
        .unwrap();
    let parallel = ParamSweep::new(&series, RunSettings::default())
        .with_workers(4)
        .run(&grid)
        .unwrap();

    assert_eq!(sequential.len(), grid.size());
    assert_eq!(sequential.all(), parallel.all());
    let seq_rank: Vec<_> = sequential.ranked().iter().map(|r| r.params.clone()).collect();
    let par_rank: Vec<_> = parallel.ranked().iter().map(|r| r.params.clone()).collect();
    assert_eq!(seq_rank, par_rank);
}

#[test]
fn rows_stay_in_grid_order() {
    let series = make_series(600);
    let grid = ParamGrid::new(vec![5, 10], vec![30, 60], 0.05);
    let results = ParamSweep::new(&series, RunSettings::default())
        .with_workers(3)
        .run(&grid)
        .unwrap();
    let pairs: Vec<(usize, usize)> = results
        .all()
        .iter()
        .map(|r| (r.params.short_window, r.params.long_window))
        .collect();
    assert_eq!(pairs, vec![(5, 30), (5, 60), (10, 30), (10, 60)]);
}

#[test]
fn progress_callback_sees_every_cell() {
    let series = make_series(300);
    let grid = ParamGrid::new(vec![5, 10, 15], vec![20, 40], 0.10);
    let calls = AtomicUsize::new(0);
    let max_seen = Mutex::new(0usize);

    ParamSweep::new(&series, RunSettings::default())
        .with_workers(2)
        .run_with_progress(&grid, |done, total| {
            assert_eq!(total, 6);
            calls.fetch_add(1, Ordering::SeqCst);
            let mut max = max_seen.lock().unwrap();
            *max = (*max).max(done);
        })
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert_eq!(*max_seen.lock().unwrap(), 6);
}

#[test]
fn ranking_sorts_by_sharpe_descending() {
    let series = make_series(1_000);
    let grid = ParamGrid::new(vec![5, 10, 20], vec![50, 100], 0.10);
    let results = ParamSweep::new(&series, RunSettings::default())
        .run(&grid)
        .unwrap();
    let ranked = results.ranked();
    assert!(ranked
        .windows(2)
        .all(|w| w[0].sharpe_ratio >= w[1].sharpe_ratio));
    assert_eq!(results.top_k(2).len(), 2);
    assert_eq!(
        results.best().map(|r| r.sharpe_ratio),
        ranked.first().map(|r| r.sharpe_ratio)
    );
}

#[test]
fn csv_holds_full_table_in_grid_order() {
    let series = make_series(400);
    let grid = ParamGrid::new(vec![10, 20], vec![100, 500], 0.10);
    let results = ParamSweep::new(&series, RunSettings::default())
        .with_workers(1)
        .run(&grid)
        .unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out").join("dual_ma_optimization.csv");
    results.write_csv(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "short_window,long_window,stop_loss_fraction,total_return,sharpe_ratio,max_drawdown"
    );
    // Failed cells are absent.
    assert_eq!(lines.len(), 1 + results.len());
    assert!(lines[1].starts_with("10,100,0.1,"));
    assert!(lines[2].starts_with("20,100,0.1,"));
}
