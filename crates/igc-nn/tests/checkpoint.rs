// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use igc_nn::io::{
    load_bincode, load_json, load_state_dict_json, save_bincode, save_json, save_state_dict_json,
    upgrade_legacy_state, widen_input_channels,
};
use igc_nn::{
    ComplexTensor, GaborPooling, IGConvCmplx, IGConvConfig, Module, ReLUCmplx, ReluKind, Sequential,
    TensorError,
};
use ndarray::{ArrayD, Axis};
use tempfile::tempdir;

fn input(channels: usize) -> ComplexTensor {
    let shape = [1, channels, 6, 6];
    ComplexTensor::from_fn(&shape, |idx| {
        let t = (idx[1] * 36 + idx[2] * 6 + idx[3]) as f32;
        num_complex::Complex32::new((0.21 * t).sin(), (0.17 * t).cos())
    })
}

fn layer(in_features: usize, seed: u64) -> IGConvCmplx {
    IGConvCmplx::new(
        "conv1",
        IGConvConfig::new(in_features, 4, 3)
            .with_no_g(4)
            .with_gabor_pooling(GaborPooling::SummedMag)
            .with_seed(seed),
    )
    .unwrap()
}

#[test]
fn json_and_bincode_checkpoints_restore_outputs() {
    let dir = tempdir().unwrap();
    let source = layer(2, 1);
    let x = input(2);
    let expected = source.forward(&x).unwrap();

    let json = dir.path().join("conv1.json");
    save_json(&source, &json).unwrap();
    let mut restored = layer(2, 99);
    assert_ne!(restored.forward(&x).unwrap(), expected);
    load_json(&mut restored, &json).unwrap();
    assert_eq!(restored.forward(&x).unwrap(), expected);

    let bin = dir.path().join("conv1.bin");
    save_bincode(&source, &bin).unwrap();
    let mut restored = layer(2, 42);
    load_bincode(&mut restored, &bin).unwrap();
    assert_eq!(restored.forward(&x).unwrap(), expected);
}

#[test]
fn gabor_parameters_load_from_either_key() {
    let source = layer(1, 3);
    let mut state = source.state_dict().unwrap();
    state.remove("conv1.gabor.gabor_params");
    let mut target = layer(1, 4);
    target.load_state_dict(&state).unwrap();
    assert_eq!(target.gabor().params().value(), source.gabor().params().value());

    state.remove("conv1.gabor.gabor");
    let err = target.load_state_dict(&state).unwrap_err();
    assert!(matches!(err, TensorError::MissingParameter { .. }));
}

#[test]
fn legacy_filter_banks_are_upgraded_before_loading() {
    let dir = tempdir().unwrap();
    let source = layer(1, 5);
    source.forward(&input(1)).unwrap();
    let mut state = source.state_dict().unwrap();
    let filters = state.remove("conv1.gabor.gabor_filters").unwrap();
    state.insert("conv1.gabor.gabor_filters".into(), filters.index_axis_move(Axis(2), 0));
    let path = dir.path().join("legacy.json");
    save_state_dict_json(&state, &path).unwrap();

    let mut legacy = load_state_dict_json(&path).unwrap();
    let mut target = layer(1, 6);
    assert!(target.load_state_dict(&legacy).is_err());
    assert_eq!(upgrade_legacy_state(&mut legacy), 1);
    target.load_state_dict(&legacy).unwrap();
    assert_eq!(target.forward(&input(1)).unwrap(), source.forward(&input(1)).unwrap());
}

#[test]
fn widened_checkpoint_loads_into_a_wider_layer() {
    let narrow = IGConvCmplx::new("conv1", IGConvConfig::new(1, 4, 3).with_no_g(4).with_seed(7)).unwrap();
    let mut state = narrow.state_dict().unwrap();
    widen_input_channels(&mut state, "conv1.ReConv.weight", 1).unwrap();
    widen_input_channels(&mut state, "conv1.ImConv.weight", 1).unwrap();

    let mut too_wide = IGConvCmplx::new("conv1", IGConvConfig::new(3, 4, 3).with_no_g(4)).unwrap();
    assert!(too_wide.load_state_dict(&state).is_err());
    let mut wide = IGConvCmplx::new("conv1", IGConvConfig::new(2, 4, 3).with_no_g(4)).unwrap();
    wide.load_state_dict(&state).unwrap();

    // Two identical input channels through the tiled kernel double the response.
    let single = input(1);
    let doubled = ComplexTensor::from_stacked(
        ndarray::concatenate(Axis(2), &[single.stacked().view(), single.stacked().view()]).unwrap(),
    )
    .unwrap();
    let reference = narrow.forward(&single).unwrap();
    let widened = wide.forward(&doubled).unwrap();
    for (a, b) in reference.stacked().iter().zip(widened.stacked().iter()) {
        approx::assert_abs_diff_eq!(2.0 * a, *b, epsilon = 1e-4);
    }
}

#[test]
fn modulus_bias_survives_training_and_checkpoints() {
    let mut seq = Sequential::new();
    seq.push(layer(1, 10));
    seq.push(ReLUCmplx::new("act1", ReluKind::Mod, Some(4), Some(11)).unwrap());
    let before = seq.state_dict().unwrap()["act1.b"].clone();
    seq.visit_parameters_mut(&mut |param| {
        let update = ArrayD::from_elem(param.value().raw_dim(), 1.0);
        param.accumulate(&update)
    })
    .unwrap();
    seq.apply_step(0.5).unwrap();
    let after = seq.state_dict().unwrap();
    assert_eq!(after["act1.b"], before);
    assert_eq!(after["act1.b"].shape(), &[4, 1, 1]);
}

fn two_stage(seed: u64) -> Sequential {
    let mut seq = Sequential::new();
    for (name, in_features) in [("a", 2), ("b", 4)] {
        let config = IGConvConfig::new(in_features, 4, 3)
            .with_no_g(4)
            .with_gabor_pooling(GaborPooling::SummedMag)
            .with_seed(seed + in_features as u64);
        seq.push(IGConvCmplx::new(name, config).unwrap());
    }
    seq
}

#[test]
fn incomplete_state_leaves_every_layer_untouched() {
    let mut seq = two_stage(5);
    let x = input(2);
    let before = seq.forward(&x).unwrap();

    let mut partial = two_stage(77).state_dict().unwrap();
    partial.retain(|key, _| !key.starts_with("b."));
    let err = seq.load_state_dict(&partial).unwrap_err();
    assert!(matches!(err, TensorError::MissingParameter { ref name } if name.starts_with("b.")));

    let pristine = two_stage(5).state_dict().unwrap();
    assert_eq!(seq.state_dict().unwrap()["a.ReConv.weight"], pristine["a.ReConv.weight"]);
    assert_eq!(seq.forward(&x).unwrap(), before);
}
