// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Checkpoint persistence plus the two compatibility rewrites applied to
//! older state dictionaries before loading.

use crate::module::{Module, StateDict};
use crate::{PureResult, TensorError};
use ndarray::{concatenate, ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Key suffix of the cached Gabor filter bank buffer.
pub const GABOR_FILTERS_SUFFIX: &str = "gabor_filters";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl StoredTensor {
    fn from_array(array: &ArrayD<f32>) -> StoredTensor {
        StoredTensor {
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }

    fn into_array(self) -> PureResult<ArrayD<f32>> {
        let expected: usize = self.shape.iter().product();
        if expected != self.data.len() {
            return Err(TensorError::DataLength {
                expected,
                got: self.data.len(),
            });
        }
        Ok(ArrayD::from_shape_vec(IxDyn(&self.shape), self.data)?)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ModuleSnapshot {
    parameters: HashMap<String, StoredTensor>,
}

fn snapshot_from_state(state: &StateDict) -> ModuleSnapshot {
    let mut parameters = HashMap::new();
    for (name, array) in state {
        parameters.insert(name.clone(), StoredTensor::from_array(array));
    }
    ModuleSnapshot { parameters }
}

fn from_snapshot(snapshot: ModuleSnapshot) -> PureResult<StateDict> {
    let mut state = HashMap::new();
    for (name, stored) in snapshot.parameters.into_iter() {
        state.insert(name, stored.into_array()?);
    }
    Ok(state)
}

fn io_error(err: std::io::Error) -> TensorError {
    TensorError::IoError {
        message: err.to_string(),
    }
}

fn serde_error(err: impl ToString) -> TensorError {
    TensorError::SerializationError {
        message: err.to_string(),
    }
}

fn write_json(snapshot: &ModuleSnapshot, path: &Path) -> PureResult<()> {
    let file = File::create(path).map_err(io_error)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, snapshot).map_err(serde_error)
}

fn read_json(path: &Path) -> PureResult<ModuleSnapshot> {
    let file = File::open(path).map_err(io_error)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(serde_error)
}

fn write_bincode(snapshot: &ModuleSnapshot, path: &Path) -> PureResult<()> {
    let file = File::create(path).map_err(io_error)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, snapshot).map_err(serde_error)
}

fn read_bincode(path: &Path) -> PureResult<ModuleSnapshot> {
    let file = File::open(path).map_err(io_error)?;
    let reader = BufReader::new(file);
    bincode::deserialize_from(reader).map_err(serde_error)
}

pub fn save_json<M: Module + ?Sized, P: AsRef<Path>>(module: &M, path: P) -> PureResult<()> {
    write_json(&snapshot_from_state(&module.state_dict()?), path.as_ref())
}

pub fn load_json<M: Module + ?Sized, P: AsRef<Path>>(module: &mut M, path: P) -> PureResult<()> {
    let state = from_snapshot(read_json(path.as_ref())?)?;
    module.load_state_dict(&state)
}

pub fn save_state_dict_json<P: AsRef<Path>>(state: &StateDict, path: P) -> PureResult<()> {
    write_json(&snapshot_from_state(state), path.as_ref())
}

pub fn load_state_dict_json<P: AsRef<Path>>(path: P) -> PureResult<StateDict> {
    from_snapshot(read_json(path.as_ref())?)
}

pub fn save_bincode<M: Module + ?Sized, P: AsRef<Path>>(module: &M, path: P) -> PureResult<()> {
    write_bincode(&snapshot_from_state(&module.state_dict()?), path.as_ref())
}

pub fn load_bincode<M: Module + ?Sized, P: AsRef<Path>>(module: &mut M, path: P) -> PureResult<()> {
    let state = from_snapshot(read_bincode(path.as_ref())?)?;
    module.load_state_dict(&state)
}

pub fn save_state_dict_bincode<P: AsRef<Path>>(state: &StateDict, path: P) -> PureResult<()> {
    write_bincode(&snapshot_from_state(state), path.as_ref())
}

pub fn load_state_dict_bincode<P: AsRef<Path>>(path: P) -> PureResult<StateDict> {
    from_snapshot(read_bincode(path.as_ref())?)
}

/// Rewrites filter-bank buffers saved before the per-input singleton axis
/// existed: every `*gabor_filters` entry of rank 5 (`[2, no_g, 1, kh, kw]`)
/// gains an axis at position 2. Returns the number of rewritten entries.
///
/// Position 2 sits behind the stacked re/im axis and the orientation axis,
/// so the result is `[2, no_g, 1, 1, kh, kw]` for any `no_g`. Inserting at
/// position 1 would only line up when `no_g == 1`. Entries of any other rank
/// are left alone, which keeps the rewrite idempotent on current
/// checkpoints.
pub fn upgrade_legacy_state(state: &mut StateDict) -> usize {
    let mut upgraded = 0;
    for (key, value) in state.iter_mut() {
        let is_filter_bank = key.rsplit('.').next() == Some(GABOR_FILTERS_SUFFIX);
        if is_filter_bank && value.ndim() == 5 {
            let legacy = std::mem::replace(value, ArrayD::zeros(IxDyn(&[0])));
            *value = legacy.insert_axis(Axis(2));
            tracing::debug!(%key, shape = ?value.shape(), "upgraded legacy filter bank");
            upgraded += 1;
        }
    }
    upgraded
}

/// Widens a first-layer weight for inputs carrying extra scaling channels by
/// tiling it `2 × extra_scaling_channels` times along its input axis (the
/// third axis from the end).
pub fn widen_input_channels(state: &mut StateDict, key: &str, extra_scaling_channels: usize) -> PureResult<()> {
    if extra_scaling_channels == 0 {
        return Err(TensorError::InvalidDimensions {
            label: "extra_scaling_channels",
            value: 0,
        });
    }
    let weight = state.get_mut(key).ok_or_else(|| TensorError::MissingParameter {
        name: key.to_string(),
    })?;
    let rank = weight.ndim();
    if rank < 3 {
        return Err(TensorError::InvalidRank {
            label: "widen_input_channels",
            expected: 4,
            got: rank,
        });
    }
    let axis = Axis(rank - 3);
    let repeats = 2 * extra_scaling_channels;
    let views = vec![weight.view(); repeats];
    let widened = concatenate(axis, &views)?;
    tracing::debug!(key, from = ?weight.shape(), to = ?widened.shape(), "widened input channels");
    *weight = widened;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;
    use tempfile::tempdir;

    fn sample_state() -> StateDict {
        let mut state = StateDict::new();
        state.insert(
            "conv1.ReConv.weight".into(),
            ArrayD::from_shape_fn(IxDyn(&[2, 1, 3, 3]), |idx| idx[0] as f32 + 0.1 * idx[3] as f32),
        );
        state.insert(
            "conv1.gabor.gabor_filters".into(),
            ArrayD::from_elem(IxDyn(&[2, 4, 1, 3, 3]), 0.5),
        );
        state
    }

    #[test]
    fn state_dict_roundtrips_through_both_formats() {
        let dir = tempdir().unwrap();
        let state = sample_state();
        let json = dir.path().join("state.json");
        save_state_dict_json(&state, &json).unwrap();
        assert_eq!(load_state_dict_json(&json).unwrap(), state);
        let bin = dir.path().join("state.bin");
        save_state_dict_bincode(&state, &bin).unwrap();
        assert_eq!(load_state_dict_bincode(&bin).unwrap(), state);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let err = load_state_dict_json(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, TensorError::IoError { .. }));
    }

    #[test]
    fn legacy_filter_banks_gain_a_singleton_axis() {
        let mut state = sample_state();
        assert_eq!(upgrade_legacy_state(&mut state), 1);
        assert_eq!(state["conv1.gabor.gabor_filters"].shape(), &[2, 4, 1, 1, 3, 3]);
        assert_eq!(state["conv1.ReConv.weight"].shape(), &[2, 1, 3, 3]);
        assert_eq!(upgrade_legacy_state(&mut state), 0);
    }

    #[test]
    fn widening_tiles_the_input_axis() {
        let mut state = sample_state();
        widen_input_channels(&mut state, "conv1.ReConv.weight", 2).unwrap();
        let widened = &state["conv1.ReConv.weight"];
        assert_eq!(widened.shape(), &[2, 4, 3, 3]);
        for c in 0..4 {
            assert_eq!(widened.slice(s![.., c, .., ..]), widened.slice(s![.., 0, .., ..]));
        }
        assert!(widen_input_channels(&mut state, "absent", 1).is_err());
        assert!(widen_input_channels(&mut state, "conv1.ReConv.weight", 0).is_err());
    }
}
