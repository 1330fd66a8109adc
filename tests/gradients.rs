mod common;

use common::{assert_gradients_close, numeric_gradient, random_logits};
use ferrite_losses::loss::{
    ContrastiveConfig, CosentConfig, FocalConfig, LabelSmoothingConfig, Rank, RDropConfig,
    SparseMultilabelConfig, UdaConfig,
};
use ferrite_losses::{
    ContrastiveLoss, CosentLoss, CrossEntropyLoss, FocalLoss, IndexTensor, LabelSmoothingCrossEntropy,
    MultilabelCategoricalCrossentropy, RDropLoss, Reduction, SparseMultilabelCategoricalCrossentropy,
    Tensor, TrainingProgress, TsaSchedule, UdaLoss,
};

const TOL: f64 = 1e-5;

#[test]
fn cross_entropy_gradient() {
    let z = random_logits(&[4, 5], 2.0, 1);
    let targets = [0, 4, -100, 2];
    let ce = CrossEntropyLoss::default();
    let numeric = numeric_gradient(&z, |x| ce.compute(x, &targets).unwrap());
    assert_gradients_close(&ce.derivative(&z, &targets).unwrap(), &numeric, TOL);
}

#[test]
fn focal_gradient_for_several_gammas() {
    let z = random_logits(&[5, 4], 2.0, 2);
    let targets = [1, 3, 0, -100, 2];
    for gamma in [0.0, 0.5, 2.0, 3.5] {
        let focal = FocalLoss::new(FocalConfig {
            gamma,
            weight: Some(vec![1.0, 0.5, 2.0, 1.5]),
            ignore_index: -100,
        }).unwrap();
        let numeric = numeric_gradient(&z, |x| focal.compute(x, &targets).unwrap());
        assert_gradients_close(&focal.derivative(&z, &targets).unwrap(), &numeric, TOL);
    }
}

#[test]
fn label_smoothing_gradient_for_every_reduction() {
    let z = random_logits(&[2, 3, 4], 2.0, 3);
    let targets = [0, 3, -100, 1, 2, 2];
    for reduction in [Reduction::Mean, Reduction::Sum, Reduction::None] {
        let ls = LabelSmoothingCrossEntropy::new(LabelSmoothingConfig { eps: 0.2, reduction, ignore_index: -100 }).unwrap();
        let numeric = numeric_gradient(&z, |x| ls.compute(x, &targets).unwrap().data().iter().sum());
        assert_gradients_close(&ls.derivative(&z, &targets).unwrap(), &numeric, TOL);
    }
}

#[test]
fn dense_multilabel_gradient() {
    let z = random_logits(&[3, 5], 3.0, 4);
    let truth = Tensor::from_rows(vec![
        vec![1.0, 0.0, 0.0, 1.0, 0.0],
        vec![0.0, 0.0, 0.0, 0.0, 0.0],
        vec![1.0, 1.0, 1.0, 1.0, 1.0],
    ]).unwrap();
    let loss = MultilabelCategoricalCrossentropy::new();
    let numeric = numeric_gradient(&z, |x| loss.compute(x, &truth).unwrap());
    assert_gradients_close(&loss.derivative(&z, &truth).unwrap(), &numeric, TOL);
}

#[test]
fn sparse_multilabel_gradient() {
    let z = random_logits(&[3, 6], 2.0, 5);
    let truth = IndexTensor::new(vec![3, 2], vec![1, 4, 0, 5, 2, 6]).unwrap();
    let loss = SparseMultilabelCategoricalCrossentropy::new(SparseMultilabelConfig::default()).unwrap();
    let numeric = numeric_gradient(&z, |x| loss.compute(x, &truth).unwrap().data().iter().sum());
    assert_gradients_close(&loss.derivative(&z, &truth).unwrap(), &numeric, TOL);
}

#[test]
fn sparse_multilabel_gradient_with_zero_padding() {
    let z = random_logits(&[2, 5], 2.0, 6);
    let truth = IndexTensor::new(vec![2, 3], vec![2, 0, 0, 1, 3, 0]).unwrap();
    let loss = SparseMultilabelCategoricalCrossentropy::new(SparseMultilabelConfig { mask_zero: true, epsilon: 1e-7 }).unwrap();
    let numeric = numeric_gradient(&z, |x| loss.compute(x, &truth).unwrap().data().iter().sum());
    let analytic = loss.derivative(&z, &truth).unwrap();
    assert_gradients_close(&analytic, &numeric, TOL);
    // the padding class never receives gradient
    assert_eq!(analytic.row(0)[0], 0.0);
}

#[test]
fn contrastive_gradients() {
    let d = Tensor::from_vec(vec![0.2, 0.9, 0.4, 1.5, 0.7, 0.1]);
    let labels = [1, 1, 0, 0, 0, 1];
    for online in [false, true] {
        for size_average in [true, false] {
            let loss = ContrastiveLoss::new(ContrastiveConfig { margin: 1.0, online, size_average, ..Default::default() }).unwrap();
            let numeric = numeric_gradient(&d, |x| loss.compute(x.data(), &labels).unwrap());
            let analytic = Tensor::from_vec(loss.derivative(d.data(), &labels).unwrap());
            assert_gradients_close(&analytic, &numeric, TOL);
        }
    }
}

#[test]
fn cosent_score_gradient() {
    let cos = Tensor::from_vec(vec![0.3, -0.1, 0.8, 0.05]);
    let labels = [1.0, 0.0, 0.5, 1.0];
    let loss = CosentLoss::new(CosentConfig { scale: 5.0 }).unwrap();
    let numeric = numeric_gradient(&cos, |x| loss.compute_scores(x.data(), &labels).unwrap());
    let analytic = Tensor::from_vec(loss.derivative_scores(cos.data(), &labels).unwrap());
    assert_gradients_close(&analytic, &numeric, TOL);
}

#[test]
fn rdrop_gradient_for_both_layouts() {
    let z = random_logits(&[4, 3], 2.0, 7);
    let labels = [0, 0, 2, 2];
    for rank in [Rank::Adjacent, Rank::Updown] {
        let loss = RDropLoss::new(RDropConfig { alpha: 4.0, rank }).unwrap();
        let numeric = numeric_gradient(&z, |x| loss.compute(x, &labels).unwrap());
        assert_gradients_close(&loss.derivative(&z, &labels).unwrap(), &numeric, TOL);
    }
}

#[test]
fn uda_gradient_skips_detached_block() {
    let z = Tensor::from_rows(vec![
        vec![3.0, 0.0, 0.0],
        vec![0.0, 0.3, 0.1],
        vec![0.5, -0.5, 0.2],
        vec![1.0, 0.0, -1.0],
        vec![0.2, 0.1, -0.3],
        vec![-1.0, 0.5, 0.0],
    ]).unwrap();
    let labels = [0, 1];
    let progress = TrainingProgress::new(0, 10).unwrap();
    let configs = [
        UdaConfig::default(),
        UdaConfig { tsa_schedule: Some(TsaSchedule::Linear), start_p: 0.5, end_p: 1.0, ..UdaConfig::default() },
    ];
    for config in configs {
        let uda = UdaLoss::new(config).unwrap();
        let numeric = numeric_gradient(&z, |x| uda.compute(x, &labels, &progress).unwrap().total());
        let analytic = uda.derivative(&z, &labels, &progress).unwrap();
        // sup rows 0..2 and augmented rows 4..6 carry gradient; originals 2..4 are frozen targets
        for row in [0, 1, 4, 5] {
            for (a, n) in analytic.row(row).iter().zip(numeric.row(row)) {
                assert!((a - n).abs() <= TOL * (1.0 + n.abs()), "row {row}: {a} vs {n}");
            }
        }
        assert!(analytic.row(2).iter().chain(analytic.row(3)).all(|&g| g == 0.0));
    }
}
