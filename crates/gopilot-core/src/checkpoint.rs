use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use log::debug;
use memmap2::MmapOptions;
use safetensors::{Dtype, SafeTensors};
use tch::{nn, Kind, Tensor};

use crate::error::{ModelError, Result, ShapeMismatch};

fn kind_of(name: &str, dtype: Dtype) -> Result<Kind> {
    match dtype {
        Dtype::F32 => Ok(Kind::Float),
        Dtype::F16 => Ok(Kind::Half),
        Dtype::BF16 => Ok(Kind::BFloat16),
        Dtype::F64 => Ok(Kind::Double),
        other => Err(ModelError::UnsupportedDtype {
            name: name.to_string(),
            dtype: format!("{other:?}"),
        }),
    }
}

/// Loads a safetensors checkpoint into `vs`.
///
/// The checkpoint must name exactly the parameters of the store, with the same
/// shapes. On any mismatch nothing is copied.
pub fn load_strict(vs: &mut nn::VarStore, path: &Path) -> Result<()> {
    let file = File::open(path).map_err(|source| ModelError::CheckpointIo {
        path: path.to_path_buf(),
        source,
    })?;
    // SAFETY: the file is opened read-only and the mapping does not outlive this call.
    let buffer = unsafe { MmapOptions::new().map(&file) }.map_err(|source| ModelError::CheckpointIo {
        path: path.to_path_buf(),
        source,
    })?;
    let tensors = SafeTensors::deserialize(&buffer).map_err(|source| ModelError::CheckpointFormat {
        path: path.to_path_buf(),
        source,
    })?;

    let mut variables: BTreeMap<String, Tensor> = vs.variables().into_iter().collect();
    let stored: BTreeMap<String, _> = tensors.tensors().into_iter().collect();

    let missing: Vec<String> = variables
        .keys()
        .filter(|name| !stored.contains_key(*name))
        .cloned()
        .collect();
    let unexpected: Vec<String> = stored
        .keys()
        .filter(|name| !variables.contains_key(*name))
        .cloned()
        .collect();
    let mismatched: Vec<ShapeMismatch> = stored
        .iter()
        .filter_map(|(name, view)| {
            let var = variables.get(name)?;
            let found: Vec<i64> = view.shape().iter().map(|&d| d as i64).collect();
            let expected = var.size();
            (found != expected).then(|| ShapeMismatch {
                name: name.clone(),
                expected,
                found,
            })
        })
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() || !mismatched.is_empty() {
        return Err(ModelError::CheckpointIncompatible {
            path: path.to_path_buf(),
            missing,
            unexpected,
            mismatched,
        });
    }

    // Decode everything first so a bad dtype cannot leave a half-loaded model.
    let device = vs.device();
    let mut decoded = Vec::with_capacity(stored.len());
    for (name, view) in &stored {
        let kind = kind_of(name, view.dtype())?;
        let shape: Vec<i64> = view.shape().iter().map(|&d| d as i64).collect();
        let tensor = Tensor::from_data_size(view.data(), &shape, kind).to_device(device);
        decoded.push((name.clone(), tensor));
    }

    tch::no_grad(|| {
        for (name, tensor) in &decoded {
            if let Some(var) = variables.get_mut(name) {
                var.copy_(tensor);
                debug!("Loaded tensor: {}", name);
            }
        }
    });

    Ok(())
}

pub fn save(vs: &nn::VarStore, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| ModelError::CheckpointIo {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }
    let variables: Vec<(String, Tensor)> = vs.variables().into_iter().collect();
    Tensor::write_safetensors(&variables, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GopilotConfig;
    use crate::model::GopilotModel;
    use tch::Device;

    fn tiny() -> GopilotConfig {
        GopilotConfig {
            vocab_size: 7,
            context_length: 4,
            embedding_dim: 4,
            num_layers: 1,
            num_heads: 1,
            feedforward_dim: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_roundtrip_restores_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt.safetensors");

        let source = GopilotModel::new(tiny(), 0.0, Device::Cpu).unwrap();
        source.save_checkpoint(&path).unwrap();

        let mut target = GopilotModel::new(tiny(), 0.0, Device::Cpu).unwrap();
        target.load_checkpoint(&path).unwrap();

        let a = source.var_store().variables();
        let b = target.var_store().variables();
        for (name, tensor) in &a {
            assert!(tensor.equal(&b[name]), "parameter {name} differs");
        }
    }

    #[test]
    fn test_shape_mismatch_is_incompatible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.safetensors");

        let wide = GopilotModel::new(GopilotConfig { vocab_size: 9, ..tiny() }, 0.0, Device::Cpu).unwrap();
        wide.save_checkpoint(&path).unwrap();

        let mut model = GopilotModel::new(tiny(), 0.0, Device::Cpu).unwrap();
        let before = model.var_store().variables()["embedding.weight"].copy();
        match model.load_checkpoint(&path) {
            Err(ModelError::CheckpointIncompatible { mismatched, missing, unexpected, .. }) => {
                assert!(missing.is_empty());
                assert!(unexpected.is_empty());
                let names: Vec<&str> = mismatched.iter().map(|m| m.name.as_str()).collect();
                assert!(names.contains(&"embedding.weight"));
                assert!(names.contains(&"lm_head.weight"));
            }
            other => panic!("expected incompatibility, got {other:?}"),
        }
        assert!(model.var_store().variables()["embedding.weight"].equal(&before));
    }

    #[test]
    fn test_garbage_file_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.safetensors");
        std::fs::write(&path, b"definitely not safetensors").unwrap();

        let mut model = GopilotModel::new(tiny(), 0.0, Device::Cpu).unwrap();
        let err = model.load_checkpoint(&path).unwrap_err();
        assert!(matches!(err, ModelError::CheckpointFormat { .. }), "{err}");
    }
}
