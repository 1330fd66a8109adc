mod common;

use approx::assert_relative_eq;
use common::random_logits;
use ferrite_losses::loss::{
    nll_loss, ContrastiveConfig, FocalConfig, LabelSmoothingConfig, RDropConfig, SparseMultilabelConfig,
    UdaConfig,
};
use ferrite_losses::math::stable::log_softmax_rows;
use ferrite_losses::{
    ContrastiveLoss, CrossEntropyLoss, FocalLoss, IndexTensor, LabelSmoothingCrossEntropy,
    MultilabelCategoricalCrossentropy, RDropLoss, Reduction, SparseMultilabelCategoricalCrossentropy,
    Tensor, TrainingProgress, TsaSchedule, UdaLoss,
};
use proptest::prelude::*;

fn focal(gamma: f64) -> FocalLoss {
    FocalLoss::new(FocalConfig { gamma, ..FocalConfig::default() }).unwrap()
}

fn sparse(mask_zero: bool) -> SparseMultilabelCategoricalCrossentropy {
    SparseMultilabelCategoricalCrossentropy::new(SparseMultilabelConfig { mask_zero, epsilon: 1e-7 }).unwrap()
}

#[test]
fn focal_scenario_is_below_cross_entropy() {
    let z = Tensor::from_rows(vec![vec![2.0, 0.0, 0.0], vec![0.0, 2.0, 0.0]]).unwrap();
    let fl = focal(2.0).compute(&z, &[0, 1]).unwrap();
    let ce = CrossEntropyLoss::default().compute(&z, &[0, 1]).unwrap();
    assert!(fl < ce, "focal {fl} vs ce {ce}");
}

#[test]
fn focal_gamma_zero_equals_nll() {
    let z = random_logits(&[6, 4], 3.0, 11);
    let targets = [0, 1, 2, 3, -100, 1];
    let nll = nll_loss(&log_softmax_rows(&z), &targets, None, -100, Reduction::Mean).unwrap();
    assert_relative_eq!(focal(0.0).compute(&z, &targets).unwrap(), nll.item().unwrap(), epsilon = 1e-12);
}

#[test]
fn label_smoothing_without_eps_is_cross_entropy() {
    let z = random_logits(&[5, 7], 3.0, 12);
    let targets = [6, 0, 3, -100, 2];
    let ls = LabelSmoothingCrossEntropy::new(LabelSmoothingConfig { eps: 0.0, ..Default::default() }).unwrap();
    let ce = CrossEntropyLoss::default().compute(&z, &targets).unwrap();
    assert_relative_eq!(ls.compute(&z, &targets).unwrap().item().unwrap(), ce, epsilon = 1e-12);
}

#[test]
fn dense_and_sparse_multilabel_agree_on_one_hot_targets() {
    let z = random_logits(&[4, 5], 4.0, 13);
    let classes = [3usize, 0, 4, 1];
    let mut one_hot = Tensor::zeros(&[4, 5]);
    for (i, &c) in classes.iter().enumerate() {
        one_hot.row_mut(i)[c] = 1.0;
    }
    let indices = IndexTensor::new(vec![4, 1], classes.iter().map(|&c| c as i64).collect()).unwrap();

    let dense = MultilabelCategoricalCrossentropy::new().compute(&z, &one_hot).unwrap();
    let per_example = sparse(false).compute(&z, &indices).unwrap();
    let sparse_mean = per_example.data().iter().sum::<f64>() / 4.0;
    assert_relative_eq!(dense, sparse_mean, epsilon = 1e-6);
}

#[test]
fn contrastive_offline_reference_points() {
    let loss = ContrastiveLoss::new(ContrastiveConfig::default()).unwrap();
    assert_eq!(loss.compute(&[0.0, 0.0], &[1, 1]).unwrap(), 0.0);
    let loss = ContrastiveLoss::new(ContrastiveConfig { margin: 1.0, ..Default::default() }).unwrap();
    assert_eq!(loss.compute(&[2.0], &[0]).unwrap(), 0.0);
}

#[test]
fn rdrop_identical_passes_equal_supervised_loss() {
    let single = random_logits(&[3, 4], 2.0, 14);
    let mut rows = Vec::new();
    for i in 0..3 {
        rows.push(single.row(i).to_vec());
        rows.push(single.row(i).to_vec());
    }
    let z = Tensor::from_rows(rows).unwrap();
    let labels = [0, 0, 3, 3, 1, 1];
    let rdrop = RDropLoss::new(RDropConfig::default()).unwrap();
    let ce = CrossEntropyLoss::default().compute(&z, &labels).unwrap();
    assert_eq!(rdrop.compute(&z, &labels).unwrap(), ce);
}

#[test]
fn linear_tsa_spans_start_to_end() {
    let start = TrainingProgress::new(0, 500).unwrap();
    let end = TrainingProgress::new(500, 500).unwrap();
    assert_relative_eq!(TsaSchedule::Linear.threshold(&start, 0.3, 0.8), 0.3);
    assert_relative_eq!(TsaSchedule::Linear.threshold(&end, 0.3, 0.8), 0.8);
}

#[test]
fn losses_are_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<FocalLoss>();
    assert_send_sync::<LabelSmoothingCrossEntropy>();
    assert_send_sync::<SparseMultilabelCategoricalCrossentropy>();
    assert_send_sync::<ContrastiveLoss>();
    assert_send_sync::<RDropLoss>();
    assert_send_sync::<UdaLoss>();

    let loss = std::sync::Arc::new(focal(2.0));
    let handles: Vec<_> = (0..4)
        .map(|seed| {
            let loss = loss.clone();
            std::thread::spawn(move || {
                let z = random_logits(&[3, 3], 2.0, seed);
                loss.compute(&z, &[0, 1, 2]).unwrap()
            })
        })
        .collect();
    for h in handles {
        assert!(h.join().unwrap() >= 0.0);
    }
}

proptest! {
    #[test]
    fn prop_classification_losses_are_non_negative(seed in 0u64..10_000, scale in 0.1f64..20.0) {
        let z = random_logits(&[4, 5], scale, seed);
        let targets = [0, 4, 2, -100];
        prop_assert!(CrossEntropyLoss::default().compute(&z, &targets).unwrap() >= 0.0);
        prop_assert!(focal(2.0).compute(&z, &targets).unwrap() >= 0.0);
        let ls = LabelSmoothingCrossEntropy::new(LabelSmoothingConfig::default()).unwrap();
        prop_assert!(ls.compute(&z, &targets).unwrap().item().unwrap() >= 0.0);
    }

    #[test]
    fn prop_multilabel_losses_are_non_negative(seed in 0u64..10_000, scale in 0.1f64..40.0) {
        let z = random_logits(&[3, 6], scale, seed);
        let truth = Tensor::from_rows(vec![
            vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            vec![0.0; 6],
            vec![0.0, 1.0, 1.0, 1.0, 0.0, 1.0],
        ]).unwrap();
        prop_assert!(MultilabelCategoricalCrossentropy::new().compute(&z, &truth).unwrap() >= 0.0);
    }

    #[test]
    fn prop_sparse_aux_clamped_and_finite(seed in 0u64..10_000, mask_zero in any::<bool>()) {
        let z = random_logits(&[4, 8], 50.0, seed);
        let truth = IndexTensor::new(vec![4, 3], vec![1, 2, 0, 7, 7, 3, 0, 0, 5, 4, 8, 1]).unwrap();
        for terms in sparse(mask_zero).terms(&z, &truth).unwrap() {
            prop_assert!(terms.aux >= 1e-7 && terms.aux <= 1.0);
            prop_assert!(!terms.neg_loss.is_nan());
            prop_assert!(!terms.total().is_nan());
        }
    }

    #[test]
    fn prop_contrastive_is_non_negative(
        distances in proptest::collection::vec(0.0f64..3.0, 6),
        margin in 0.1f64..2.0,
        online in any::<bool>(),
    ) {
        let labels = [1, 0, 1, 0, 0, 1];
        let loss = ContrastiveLoss::new(ContrastiveConfig { margin, online, ..Default::default() }).unwrap();
        prop_assert!(loss.compute(&distances, &labels).unwrap() >= 0.0);
    }

    #[test]
    fn prop_consistency_losses_are_non_negative(seed in 0u64..10_000, alpha in 0.0f64..10.0) {
        let z = random_logits(&[6, 4], 3.0, seed);
        let rdrop = RDropLoss::new(RDropConfig { alpha, ..RDropConfig::default() }).unwrap();
        let terms = rdrop.terms(&z, &[0, 0, 1, 1, 3, 3]).unwrap();
        prop_assert!(terms.kl >= -1e-12);
        prop_assert!(terms.total >= 0.0);

        let uda = UdaLoss::new(UdaConfig::default()).unwrap();
        let progress = TrainingProgress::new(3, 10).unwrap();
        prop_assert!(uda.compute(&z, &[2, 1], &progress).unwrap().total() >= -1e-12);
    }

    #[test]
    fn prop_tsa_schedules_are_monotone(total in 1u64..5_000, a in 0u64..5_000, b in 0u64..5_000) {
        let (lo, hi) = (a.min(b).min(total), a.max(b).min(total));
        let p_lo = TrainingProgress::new(lo, total).unwrap();
        let p_hi = TrainingProgress::new(hi, total).unwrap();
        for schedule in [TsaSchedule::Linear, TsaSchedule::Exp, TsaSchedule::Log] {
            prop_assert!(schedule.threshold(&p_lo, 0.1, 0.9) <= schedule.threshold(&p_hi, 0.1, 0.9));
        }
    }
}
