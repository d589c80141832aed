//! Test that exports metric tables to JSON for Python plotting.
//!
//! Run with: cargo test --test export_tables --features serde -- --ignored --nocapture

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;

use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;

use trial_dynamics::{
    append_projection, correlation_rows, cross_correlate, epoch, estimate_tangling, rebin,
    signal_ops, signal_rows, tangling_rows, EpochWindow, EventMarker, ExtractionReport,
    InclusionPolicy, LagRow, MetricRow, PrincipalAxes, SignalRow, TanglingConfig, Trial,
    TrialDataset, TrialId,
};

#[derive(Serialize)]
struct SessionParams {
    trials: usize,
    samples: usize,
    channels: usize,
    bin_size: f64,
    coarse_bin_size: f64,
    stability_epsilon: f64,
    tangling_seed: u64,
}

#[derive(Serialize)]
struct TableExport {
    params: SessionParams,
    extraction: ExtractionReport,
    tangling: Vec<MetricRow>,
    correlation: Vec<LagRow>,
    context_dim: Vec<SignalRow>,
}

// ============================================================================
// Synthetic session
// ============================================================================

/// One trial of a two-task session: sinusoidal population rates whose
/// phase depends on the task, plus a hand-velocity channel that turns on
/// at the go cue.
fn make_trial(id: u64, samples: usize, channels: usize, go_at: usize, task: &str) -> Trial {
    let task_offset = if task == "CST" { 0.0 } else { 1.5 };
    let jitter = (id as f64 * 0.37).sin() * 0.2;
    let rates = Array2::from_shape_fn((samples, channels), |(t, c)| {
        let phase = t as f64 * 0.12 + c as f64 * 0.8 + jitter;
        5.0 + 4.0 * (phase + task_offset).sin()
    });
    let hand_vel = Array2::from_shape_fn((samples, 1), |(t, _)| {
        if t >= go_at {
            ((t - go_at) as f64 * 0.2 + jitter).sin() * 20.0
        } else {
            0.0
        }
    });

    Trial::new(TrialId(id), 0.01, samples)
        .with_signal("rates", rates)
        .unwrap()
        .with_signal("hand_vel", hand_vel)
        .unwrap()
        .with_event("go", EventMarker::Single(go_at))
        .with_metadata("task", task)
}

fn make_session(per_task: usize, samples: usize, channels: usize) -> TrialDataset {
    let mut trials = Vec::new();
    for i in 0..per_task {
        trials.push(make_trial(i as u64 + 1, samples, channels, 40 + i % 3, "CST"));
        trials.push(make_trial(
            (per_task + i) as u64 + 1,
            samples,
            channels,
            40 + i % 3,
            "RTT",
        ));
    }
    TrialDataset::from_trials(trials).unwrap()
}

// ============================================================================
// Export
// ============================================================================

#[test]
#[ignore] // Run manually with: cargo test --test export_tables --features serde -- --ignored --nocapture
fn export_metric_tables_to_json() {
    let per_task = 8;
    let samples = 120;
    let channels = 12;
    let seed = 20230223;
    let epsilon = 1e-3;

    let ds = make_session(per_task, samples, channels);

    // Normalize, coarsen a context-model copy, and restrict the rest to
    // the movement window.
    let ds = ds
        .map_signal("rates_norm", |t| {
            Ok(signal_ops::soft_normalize(t.signal_required("rates")?, 5.0))
        })
        .unwrap();
    let coarse = rebin(&ds, 0.1, &BTreeMap::new()).unwrap();
    assert_eq!(coarse.iter().next().unwrap().sample_count(), 12);

    let window = EpochWindow::new("move", "go", -0.2, 0.5, InclusionPolicy::Strict);
    let set = epoch::extract(&ds, &window).unwrap();
    let extraction = set.report();
    let moved = set.into_dataset().unwrap();

    // Project, differentiate, and run both metrics.
    let mut pca = PrincipalAxes::new(4);
    let projected = append_projection(&moved, &mut pca, "rates_norm", "rates_pca", "task").unwrap();
    let projected = projected
        .map_signal("rates_pca_vel", |t| {
            Ok(signal_ops::time_derivative(
                t.signal_required("rates_pca")?,
                t.bin_size(),
            ))
        })
        .unwrap();

    let mut rng = SmallRng::seed_from_u64(seed);
    let tangling = estimate_tangling(
        &projected,
        "rates_pca",
        "rates_pca_vel",
        &TanglingConfig::default()
            .with_stability_epsilon(epsilon)
            .with_num_sample_points(400),
        &mut rng,
    )
    .unwrap();

    let projected = projected
        .map_signal("context_dim", |t| {
            let pca = t.signal_required("rates_pca")?;
            Ok(pca.slice(ndarray::s![.., 0..1]).to_owned())
        })
        .unwrap();
    let correlation = cross_correlate(&projected, "context_dim", "hand_vel").unwrap();

    let export = TableExport {
        params: SessionParams {
            trials: 2 * per_task,
            samples,
            channels,
            bin_size: 0.01,
            coarse_bin_size: 0.1,
            stability_epsilon: epsilon,
            tangling_seed: seed,
        },
        extraction,
        tangling: tangling_rows(&tangling),
        correlation: correlation_rows(&correlation),
        context_dim: signal_rows(&projected, "context_dim", 0).unwrap(),
    };

    let json = serde_json::to_string_pretty(&export).expect("Failed to serialize");

    let output_path = "target/metric_tables.json";
    let mut file = File::create(output_path).expect("Failed to create file");
    file.write_all(json.as_bytes()).expect("Failed to write file");

    println!(
        "Exported {} tangling rows, {} correlation lags, {} signal rows to {}",
        export.tangling.len(),
        export.correlation.len(),
        export.context_dim.len(),
        output_path
    );
    println!(
        "Extraction: {} requested, {} extracted, {} dropped (missing event), {} dropped (out of range)",
        export.extraction.requested,
        export.extraction.extracted,
        export.extraction.dropped_missing_event,
        export.extraction.dropped_out_of_range
    );
}
