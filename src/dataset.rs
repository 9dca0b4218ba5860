//! Labelled samples and the lazy batch iterator the evaluator consumes.
use crate::error::ResourceError;
use crate::tensorshape::TensorShape;
use crate::NNVFloat;
use log::debug;
use ndarray::{stack, Array1, ArrayD, ArrayView, Axis, IxDyn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub input: ArrayD<NNVFloat>,
    pub label: usize,
}

/// Samples stacked along axis 0.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub inputs: ArrayD<NNVFloat>,
    pub labels: Array1<usize>,
}

impl Batch {
    /// # Panics
    /// If the number of inputs and labels differ.
    pub fn new(inputs: ArrayD<NNVFloat>, labels: Array1<usize>) -> Self {
        assert_eq!(inputs.shape().first().copied(), Some(labels.len()));
        Self { inputs, labels }
    }

    /// # Panics
    /// If `samples` is empty or the inputs differ in shape.
    pub fn from_samples(samples: &[&Sample]) -> Self {
        let views: Vec<ArrayView<NNVFloat, IxDyn>> = samples.iter().map(|s| s.input.view()).collect();
        let inputs = stack(Axis(0), &views).unwrap();
        let labels = samples.iter().map(|s| s.label).collect();
        Self { inputs, labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Per-channel `(x - mean) / std` over the last axis (channels-last).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Normalization {
    pub mean: Vec<NNVFloat>,
    pub std: Vec<NNVFloat>,
}

impl Normalization {
    pub fn new(mean: Vec<NNVFloat>, std: Vec<NNVFloat>) -> Self {
        debug_assert_eq!(mean.len(), std.len());
        Self { mean, std }
    }

    /// # Panics
    /// If the last axis of `input` does not have one entry per channel.
    pub fn apply(&self, input: &mut ArrayD<NNVFloat>) {
        let channels = self.mean.len();
        assert_eq!(input.shape().last().copied(), Some(channels));
        for mut lane in input.lanes_mut(Axis(input.ndim() - 1)) {
            for (c, x) in lane.iter_mut().enumerate() {
                *x = (*x - self.mean[c]) / self.std[c];
            }
        }
    }
}

/// On-disk dataset: raw values, one flat vector per sample.
#[derive(Debug, Deserialize, Serialize)]
pub struct DatasetFile {
    pub shape: Vec<usize>,
    pub samples: Vec<SampleRecord>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SampleRecord {
    pub input: Vec<NNVFloat>,
    pub label: usize,
}

#[derive(Clone, Debug)]
pub struct InMemoryDataset {
    shape: TensorShape,
    samples: Vec<Sample>,
}

impl InMemoryDataset {
    /// # Panics
    /// If a sample does not match `shape`.
    pub fn new(shape: TensorShape, samples: Vec<Sample>) -> Self {
        assert!(samples.iter().all(|s| shape.matches(s.input.shape())));
        Self { shape, samples }
    }

    /// Reads a [`DatasetFile`], checks every sample against `expected` and
    /// `num_classes`, and applies `normalization`.
    ///
    /// # Errors
    /// Missing or unreadable file, malformed JSON, a sample of the wrong
    /// size, a label outside `0..num_classes`, or no samples at all.
    pub fn load(
        path: &Path,
        expected: &TensorShape,
        num_classes: usize,
        normalization: Option<&Normalization>,
    ) -> Result<Self, ResourceError> {
        if !path.exists() {
            return Err(ResourceError::DatasetNotFound {
                path: path.to_path_buf(),
            });
        }
        let raw = fs::read_to_string(path).map_err(|source| ResourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: DatasetFile =
            serde_json::from_str(&raw).map_err(|source| ResourceError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let shape = TensorShape::from(file.shape.clone());
        if !expected.is_compatible_with(&shape) {
            return Err(ResourceError::SampleShape {
                path: path.to_path_buf(),
                index: 0,
                found: shape,
                expected: expected.clone(),
            });
        }
        let samples = file
            .samples
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                if record.label >= num_classes {
                    return Err(ResourceError::LabelOutOfRange {
                        path: path.to_path_buf(),
                        index,
                        label: record.label,
                        num_classes,
                    });
                }
                let found = record.input.len();
                let mut input = ArrayD::from_shape_vec(IxDyn(&file.shape), record.input)
                    .map_err(|_| ResourceError::SampleShape {
                        path: path.to_path_buf(),
                        index,
                        found: TensorShape::from(vec![found]),
                        expected: expected.clone(),
                    })?;
                if let Some(norm) = normalization {
                    norm.apply(&mut input);
                }
                Ok(Sample {
                    input,
                    label: record.label,
                })
            })
            .collect::<Result<Vec<_>, ResourceError>>()?;
        if samples.is_empty() {
            return Err(ResourceError::EmptyDataset {
                path: path.to_path_buf(),
            });
        }
        debug!("loaded {} samples from {}", samples.len(), path.display());
        Ok(Self { shape, samples })
    }

    pub const fn shape(&self) -> &TensorShape {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Lazy, finite iterator over `batch_size` chunks, the last possibly
    /// shorter. With `num_samples` below the dataset size a subset is taken:
    /// a seeded random subset when `seed` is given, else the leading samples.
    /// The selection is stable for identical arguments.
    ///
    /// # Panics
    /// If `batch_size` is zero.
    pub fn batches(&self, batch_size: usize, num_samples: Option<usize>, seed: Option<u64>) -> Batches<'_> {
        assert!(batch_size > 0);
        let total = num_samples.map_or(self.samples.len(), |n| n.min(self.samples.len()));
        let order = match seed {
            Some(seed) if total < self.samples.len() => {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut idxs = rand::seq::index::sample(&mut rng, self.samples.len(), total).into_vec();
                idxs.sort_unstable();
                idxs
            }
            _ => (0..total).collect(),
        };
        Batches {
            dataset: self,
            order,
            batch_size,
            cursor: 0,
        }
    }
}

/// Not restartable: a fresh pass needs a fresh call to
/// [`InMemoryDataset::batches`].
pub struct Batches<'a> {
    dataset: &'a InMemoryDataset,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let samples: Vec<&Sample> = self.order[self.cursor..end]
            .iter()
            .map(|&i| &self.dataset.samples[i])
            .collect();
        self.cursor = end;
        Some(Batch::from_samples(&samples))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor + self.batch_size - 1) / self.batch_size;
        (remaining, Some(remaining))
    }
}
