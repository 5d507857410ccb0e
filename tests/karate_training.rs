use approx::assert_abs_diff_eq;
use candle_core::Device;

use karate_gnn::datasets::KarateClub;
use karate_gnn::graph::ExecutionStrategy;
use karate_gnn::nn::Aggregation;
use karate_gnn::train::{train, TrainConfig};

#[test]
fn default_run_reduces_the_loss() -> anyhow::Result<()> {
    let report = train(&KarateClub::builtin(), &TrainConfig::default(), &Device::Cpu)?;
    let losses = report.losses();
    assert_eq!(losses.len(), 30);
    assert!(losses.last() < losses.first());
    Ok(())
}

#[test]
fn leaders_end_up_in_different_classes() -> anyhow::Result<()> {
    let report = train(&KarateClub::builtin(), &TrainConfig::default(), &Device::Cpu)?;
    let predictions = report.final_predictions().unwrap();
    assert_eq!(predictions.len(), 34);
    assert_ne!(predictions[0], predictions[33], "predictions: {predictions:?}");
    Ok(())
}

#[test]
fn longer_run_fits_the_labelled_nodes() -> anyhow::Result<()> {
    let config = TrainConfig {
        epochs: 200,
        ..Default::default()
    };
    let report = train(&KarateClub::builtin(), &config, &Device::Cpu)?;
    let losses = report.losses();
    assert!(*losses.last().unwrap() < 0.3, "losses: {losses:?}");

    let predictions = report.final_predictions().unwrap();
    assert_eq!(predictions[0], 0);
    assert_eq!(predictions[33], 1);
    Ok(())
}

#[test]
fn execution_strategy_does_not_change_training() -> anyhow::Result<()> {
    let karate = KarateClub::builtin();
    let runs = [
        (ExecutionStrategy::Fused, Aggregation::Builtin),
        (ExecutionStrategy::DegreeBucketing, Aggregation::Builtin),
        (ExecutionStrategy::Auto, Aggregation::UserDefined),
    ]
    .into_iter()
    .map(|(strategy, aggregation)| {
        let config = TrainConfig {
            epochs: 5,
            strategy,
            aggregation,
            ..Default::default()
        };
        train(&karate, &config, &Device::Cpu).map(|report| report.losses())
    })
    .collect::<anyhow::Result<Vec<_>>>()?;

    for other in &runs[1..] {
        for (a, b) in runs[0].iter().zip(other) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-3);
        }
    }
    Ok(())
}

#[test]
fn forcing_fusion_on_closures_fails() {
    let config = TrainConfig {
        epochs: 1,
        strategy: ExecutionStrategy::Fused,
        aggregation: Aggregation::UserDefined,
        ..Default::default()
    };
    assert!(train(&KarateClub::builtin(), &config, &Device::Cpu).is_err());
}
