use log::warn;
use rand::seq::SliceRandom;
use tch::{Device, Tensor};

use crate::dataset::{Example, FineTuningDataset, IGNORE_INDEX};
use crate::seed::with_rng;

/// Padded `[batch, seq_len]` int64 tensors.
#[derive(Debug)]
pub struct Batch {
    pub inputs: Tensor,
    pub targets: Tensor,
}

#[derive(Debug, Clone)]
pub struct Batcher {
    batch_size: usize,
    pad_id: i64,
    device: Device,
}

impl Batcher {
    pub fn new(batch_size: usize, pad_id: i64, device: Device) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pad_id,
            device,
        }
    }

    /// Record indices for one epoch, shuffled with the shared generator and
    /// grouped into batches. The last batch may be short.
    pub fn epoch_indices(&self, len: usize) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..len).collect();
        with_rng(|rng| indices.shuffle(rng));
        indices.chunks(self.batch_size).map(<[usize]>::to_vec).collect()
    }

    /// Loads and pads the records at `indices`. Records that fail to load are
    /// skipped; returns `None` when none are left.
    pub fn collate(&self, dataset: &FineTuningDataset, indices: &[usize]) -> Option<Batch> {
        let examples: Vec<Example> = indices
            .iter()
            .filter_map(|&i| match dataset.get(i) {
                Ok(example) => Some(example),
                Err(e) => {
                    warn!("Skipping record {}: {}", i, e);
                    None
                }
            })
            .collect();
        self.pad(&examples)
    }

    pub fn pad(&self, examples: &[Example]) -> Option<Batch> {
        let seq_len = examples.iter().map(Example::len).max()?;
        let mut inputs = Vec::with_capacity(examples.len() * seq_len);
        let mut targets = Vec::with_capacity(examples.len() * seq_len);
        for example in examples {
            let pad = seq_len - example.len();
            inputs.extend_from_slice(&example.input_ids);
            inputs.extend(std::iter::repeat(self.pad_id).take(pad));
            targets.extend_from_slice(&example.targets);
            targets.extend(std::iter::repeat(IGNORE_INDEX).take(pad));
        }

        let shape = [examples.len() as i64, seq_len as i64];
        Some(Batch {
            inputs: Tensor::from_slice(&inputs).view(shape).to(self.device),
            targets: Tensor::from_slice(&targets).view(shape).to(self.device),
        })
    }
}
