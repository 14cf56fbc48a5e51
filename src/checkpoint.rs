//! Policy parameter files: JSON maps of named tensors, plus the averaging merge
//! used after a batch of parallel workers.

use crate::error::CheckpointError;
use crate::types::TankId;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_EXTENSION: &str = "json";
const MERGED_TAG: &str = "merged";

/// Parameter tensor of any rank, serialized as `{"v", "dim", "data"}`.
pub type Tensor = ArrayD<f32>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    pub tensors: BTreeMap<String, Tensor>,
}

impl Checkpoint {
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(name.into(), tensor);
    }
}

/// `agent1_policy_`, `agent2_policy_`
pub fn agent_prefix(agent: TankId) -> String {
    format!("agent{}_policy_", agent.side())
}

pub fn worker_file_name(agent: TankId, worker: usize) -> String {
    format!("{}{}.{}", agent_prefix(agent), worker, CHECKPOINT_EXTENSION)
}

pub fn merged_file_name(agent: TankId) -> String {
    format!("{}{}.{}", agent_prefix(agent), MERGED_TAG, CHECKPOINT_EXTENSION)
}

/// Writes a checkpoint, creating the parent directory if needed.
/// The file is replaced in place; concurrent readers may observe a partial write.
pub fn save_checkpoint(path: &Path, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string(checkpoint)?;
    fs::write(path, json)?;
    log::debug!(target: "checkpoint", "saved {}", path.display());
    Ok(())
}

/// Reads a checkpoint. A missing file is `Ok(None)` so callers can fall back to
/// freshly initialized parameters.
pub fn load_checkpoint(path: &Path) -> Result<Option<Checkpoint>, CheckpointError> {
    if !path.exists() {
        log::debug!(target: "checkpoint", "{} not found, starting fresh", path.display());
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    // Deserialization rejects tensors whose data does not fill their shape
    let checkpoint: Checkpoint = serde_json::from_str(&text)?;
    Ok(Some(checkpoint))
}

/// Element-wise mean of checkpoints that share the same tensor names and shapes.
pub fn average(checkpoints: &[Checkpoint]) -> Result<Checkpoint, CheckpointError> {
    let Some(first) = checkpoints.first() else {
        return Err(CheckpointError::Incompatible("nothing to average".to_string()));
    };
    let count = checkpoints.len() as f32;
    let mut merged = Checkpoint::default();

    for (name, reference) in &first.tensors {
        let mut sum = Tensor::zeros(reference.raw_dim());
        for checkpoint in checkpoints {
            let tensor = checkpoint
                .get(name)
                .ok_or_else(|| CheckpointError::Incompatible(format!("tensor '{}' is missing", name)))?;
            if tensor.shape() != reference.shape() {
                return Err(CheckpointError::Incompatible(format!(
                    "tensor '{}' has shape {:?}, expected {:?}",
                    name,
                    tensor.shape(),
                    reference.shape()
                )));
            }
            sum += tensor;
        }
        sum.mapv_inplace(|v| v / count);
        merged.insert(name.clone(), sum);
    }

    if let Some(extra) = checkpoints
        .iter()
        .flat_map(|c| c.tensors.keys())
        .find(|name| !first.tensors.contains_key(*name))
    {
        return Err(CheckpointError::Incompatible(format!("unexpected tensor '{}'", extra)));
    }
    Ok(merged)
}

/// Worker checkpoint files in `dir` starting with `prefix`, merged file excluded.
pub fn worker_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, CheckpointError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let is_checkpoint = path.extension().is_some_and(|e| e == CHECKPOINT_EXTENSION);
        if is_checkpoint && name.starts_with(prefix) && !name.contains(MERGED_TAG) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Averages every worker file matching `prefix` into `dir/output`, then deletes
/// the worker files. Returns the merged path, or `None` when nothing matched.
pub fn merge_checkpoints(dir: &Path, prefix: &str, output: &str) -> Result<Option<PathBuf>, CheckpointError> {
    let files = worker_files(dir, prefix)?;
    if files.is_empty() {
        log::warn!(target: "checkpoint", "no checkpoints matching '{}' in {}", prefix, dir.display());
        return Ok(None);
    }

    let mut checkpoints = Vec::with_capacity(files.len());
    for path in &files {
        if let Some(checkpoint) = load_checkpoint(path)? {
            checkpoints.push(checkpoint);
        }
    }
    let merged = average(&checkpoints)?;
    let output_path = dir.join(output);
    save_checkpoint(&output_path, &merged)?;
    log::info!(target: "checkpoint", "merged {} files into {}", files.len(), output_path.display());

    for path in &files {
        fs::remove_file(path)?;
        log::debug!(target: "checkpoint", "deleted {}", path.display());
    }
    Ok(Some(output_path))
}

/// Merges the worker files of both agents.
pub fn merge_all(dir: &Path) -> Result<[Option<PathBuf>; 2], CheckpointError> {
    let one = merge_checkpoints(dir, &agent_prefix(TankId::ONE), &merged_file_name(TankId::ONE))?;
    let two = merge_checkpoints(dir, &agent_prefix(TankId::TWO), &merged_file_name(TankId::TWO))?;
    Ok([one, two])
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::IxDyn;
    use tempfile::tempdir;

    fn single(name: &str, shape: Vec<usize>, data: Vec<f32>) -> Checkpoint {
        let mut c = Checkpoint::default();
        c.insert(name, Tensor::from_shape_vec(IxDyn(&shape), data).unwrap());
        c
    }

    #[test]
    fn test_file_names() {
        assert_eq!(worker_file_name(TankId::ONE, 3), "agent1_policy_3.json");
        assert_eq!(merged_file_name(TankId::TWO), "agent2_policy_merged.json");
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempdir().unwrap();
        assert!(load_checkpoint(&dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("a.json");
        let checkpoint = single("fc1.bias", vec![2], vec![0.5, -1.0]);
        save_checkpoint(&path, &checkpoint).unwrap();
        assert_eq!(load_checkpoint(&path).unwrap(), Some(checkpoint));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_checkpoint(&path), Err(CheckpointError::Format(_))));
    }

    #[test]
    fn test_tensor_that_does_not_fill_its_shape_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.json");
        fs::write(&path, r#"{"tensors":{"w":{"v":1,"dim":[2,2],"data":[1.0,2.0,3.0]}}}"#).unwrap();
        assert!(matches!(load_checkpoint(&path), Err(CheckpointError::Format(_))));
    }

    #[test]
    fn test_merge_averages_and_deletes_originals() {
        let dir = tempdir().unwrap();
        save_checkpoint(
            &dir.path().join(worker_file_name(TankId::ONE, 0)),
            &single("fc1.weight", vec![2], vec![2.0, 4.0]),
        )
        .unwrap();
        save_checkpoint(
            &dir.path().join(worker_file_name(TankId::ONE, 1)),
            &single("fc1.weight", vec![2], vec![4.0, 8.0]),
        )
        .unwrap();
        // Other agent's files are left alone
        save_checkpoint(
            &dir.path().join(worker_file_name(TankId::TWO, 0)),
            &single("fc1.weight", vec![2], vec![1.0, 1.0]),
        )
        .unwrap();

        let merged = merge_checkpoints(dir.path(), &agent_prefix(TankId::ONE), &merged_file_name(TankId::ONE))
            .unwrap()
            .unwrap();
        let result = load_checkpoint(&merged).unwrap().unwrap();
        let tensor = result.get("fc1.weight").unwrap();
        assert_eq!(tensor.shape(), &[2]);
        let values: Vec<f32> = tensor.iter().copied().collect();
        assert_approx_eq!(values[0], 3.0);
        assert_approx_eq!(values[1], 6.0);

        assert!(!dir.path().join(worker_file_name(TankId::ONE, 0)).exists());
        assert!(!dir.path().join(worker_file_name(TankId::ONE, 1)).exists());
        assert!(dir.path().join(worker_file_name(TankId::TWO, 0)).exists());
        assert!(merged.exists());
    }

    #[test]
    fn test_merge_ignores_previous_merged_file() {
        let dir = tempdir().unwrap();
        save_checkpoint(
            &dir.path().join(merged_file_name(TankId::ONE)),
            &single("w", vec![1], vec![100.0]),
        )
        .unwrap();
        save_checkpoint(&dir.path().join(worker_file_name(TankId::ONE, 0)), &single("w", vec![1], vec![1.0])).unwrap();
        merge_all(dir.path()).unwrap();
        let merged = load_checkpoint(&dir.path().join(merged_file_name(TankId::ONE))).unwrap().unwrap();
        assert_approx_eq!(merged.get("w").unwrap().sum(), 1.0);
    }

    #[test]
    fn test_merge_with_nothing_to_do() {
        let dir = tempdir().unwrap();
        assert_eq!(merge_all(dir.path()).unwrap(), [None, None]);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let a = single("w", vec![2], vec![1.0, 2.0]);
        let b = single("w", vec![1, 2], vec![1.0, 2.0]);
        assert!(matches!(average(&[a.clone(), b]), Err(CheckpointError::Incompatible(_))));
        let c = single("v", vec![2], vec![1.0, 2.0]);
        assert!(average(&[a, c]).is_err());
    }
}
