//! Supported models and the collaborator that turns a model identifier into
//! an oracle plus its evaluation dataset.
use crate::context::ExecutionContext;
use crate::dataset::{InMemoryDataset, Normalization};
use crate::dnn::DNN;
use crate::error::{ConfigError, ResourceError};
use crate::oracle::ModelOracle;
use crate::tensorshape::TensorShape;
use crate::NNVFloat;
use itertools::Itertools;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ModelId {
    #[serde(rename = "cifar10_resnet20")]
    Cifar10Resnet20,
    #[serde(rename = "mnist_simplecnn")]
    MnistSimpleCnn,
}

/// Static facts about a supported model.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSpec {
    pub dataset: &'static str,
    pub num_classes: usize,
    /// Per-sample shape, channels last.
    pub input_shape: TensorShape,
    pub normalization: Normalization,
    pub default_epsilons: Vec<NNVFloat>,
}

impl ModelId {
    pub const ALL: [Self; 2] = [Self::Cifar10Resnet20, Self::MnistSimpleCnn];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cifar10Resnet20 => "cifar10_resnet20",
            Self::MnistSimpleCnn => "mnist_simplecnn",
        }
    }

    pub fn spec(self) -> ModelSpec {
        match self {
            Self::Cifar10Resnet20 => ModelSpec {
                dataset: "cifar10",
                num_classes: 10,
                input_shape: TensorShape::from(vec![32, 32, 3]),
                normalization: Normalization::new(
                    vec![0.4914, 0.4822, 0.4465],
                    vec![0.2471, 0.2435, 0.2616],
                ),
                default_epsilons: vec![0.01, 0.03, 0.05, 0.1],
            },
            Self::MnistSimpleCnn => ModelSpec {
                dataset: "mnist",
                num_classes: 10,
                input_shape: TensorShape::from(vec![28, 28, 1]),
                normalization: Normalization::new(vec![0.1307], vec![0.3081]),
                default_epsilons: vec![0.05, 0.1, 0.2, 0.3],
            },
        }
    }

    fn supported() -> String {
        Self::ALL.iter().map(|m| m.as_str()).join(", ")
    }
}

impl FromStr for ModelId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownModel {
                name: s.to_string(),
                supported: Self::supported(),
            })
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Produces frozen oracles and their datasets. Implementations guarantee the
/// oracle runs in inference mode.
pub trait ModelProvider {
    /// # Errors
    /// If the model cannot be produced; the error names the missing resource.
    fn load_model(
        &self,
        ctx: &ExecutionContext,
        model: ModelId,
    ) -> Result<Box<dyn ModelOracle>, ResourceError>;

    /// # Errors
    /// If the dataset cannot be produced; the error names the missing resource.
    fn load_dataset(
        &self,
        ctx: &ExecutionContext,
        model: ModelId,
    ) -> Result<InMemoryDataset, ResourceError>;
}

/// Reads `<models_dir>/<model>.json` (a serialized [`DNN`]) and
/// `<data_dir>/<dataset>.json` (a [`crate::dataset::DatasetFile`] with raw
/// `[0, 1]` pixels, normalized on load).
#[derive(Clone, Debug)]
pub struct FileModelProvider {
    models_dir: PathBuf,
    data_dir: PathBuf,
}

impl FileModelProvider {
    pub fn new(models_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    pub fn model_path(&self, model: ModelId) -> PathBuf {
        self.models_dir.join(format!("{}.json", model.as_str()))
    }

    pub fn dataset_path(&self, model: ModelId) -> PathBuf {
        self.data_dir.join(format!("{}.json", model.spec().dataset))
    }

    fn read_dnn(path: &Path) -> Result<DNN, ResourceError> {
        if !path.exists() {
            return Err(ResourceError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }
        let raw = fs::read_to_string(path).map_err(|source| ResourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ResourceError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl From<&crate::config::Settings> for FileModelProvider {
    fn from(settings: &crate::config::Settings) -> Self {
        Self::new(&settings.models_dir, &settings.data_dir)
    }
}

impl ModelProvider for FileModelProvider {
    fn load_model(
        &self,
        ctx: &ExecutionContext,
        model: ModelId,
    ) -> Result<Box<dyn ModelOracle>, ResourceError> {
        let path = self.model_path(model);
        let spec = model.spec();
        let dnn = Self::read_dnn(&path)?;
        let invalid = |reason: String| ResourceError::InvalidModel {
            path: path.clone(),
            reason,
        };
        dnn.validate().map_err(invalid)?;
        if !spec.input_shape.is_compatible_with(dnn.input_shape()) {
            return Err(invalid(format!(
                "input shape {} does not match {}",
                dnn.input_shape(),
                spec.input_shape
            )));
        }
        if dnn.num_classes() != spec.num_classes {
            return Err(invalid(format!(
                "{} output classes, expected {}",
                dnn.num_classes(),
                spec.num_classes
            )));
        }
        info!(
            target: ctx.target(),
            "loaded {} ({} layers) on {}",
            model,
            dnn.num_layers(),
            ctx.device()
        );
        Ok(Box::new(dnn))
    }

    fn load_dataset(
        &self,
        ctx: &ExecutionContext,
        model: ModelId,
    ) -> Result<InMemoryDataset, ResourceError> {
        let spec = model.spec();
        let path = self.dataset_path(model);
        let dataset = InMemoryDataset::load(
            &path,
            &spec.input_shape,
            spec.num_classes,
            Some(&spec.normalization),
        )?;
        info!(
            target: ctx.target(),
            "loaded {} samples of {} for {}",
            dataset.len(),
            spec.dataset,
            model
        );
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetFile, SampleRecord};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn write_json<T: Serialize>(path: &Path, value: &T) {
        fs::write(path, serde_json::to_string(value).unwrap()).unwrap();
    }

    fn mnist_fixture(dir: &Path, widths: &[usize]) -> FileModelProvider {
        let mut rng = StdRng::seed_from_u64(3);
        let dnn = DNN::dense_relu(TensorShape::from(vec![28, 28, 1]), widths, &mut rng);
        write_json(&dir.join("mnist_simplecnn.json"), &dnn);
        let samples = (0..3)
            .map(|i| SampleRecord {
                input: vec![0.1 * i as f64; 784],
                label: i,
            })
            .collect();
        write_json(
            &dir.join("mnist.json"),
            &DatasetFile {
                shape: vec![28, 28, 1],
                samples,
            },
        );
        FileModelProvider::new(dir, dir)
    }

    #[test]
    fn parses_known_names_only() {
        assert_eq!("mnist_simplecnn".parse::<ModelId>().unwrap(), ModelId::MnistSimpleCnn);
        assert_eq!(
            "cifar10_resnet20".parse::<ModelId>().unwrap(),
            ModelId::Cifar10Resnet20
        );
        let err = "resnet50".parse::<ModelId>().unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownModel {
                name: "resnet50".to_string(),
                supported: "cifar10_resnet20, mnist_simplecnn".to_string(),
            }
        );
    }

    #[test]
    fn specs_carry_dataset_defaults() {
        let cifar = ModelId::Cifar10Resnet20.spec();
        assert_eq!(cifar.dataset, "cifar10");
        assert_eq!(cifar.input_shape.dims(), Some(32 * 32 * 3));
        assert_eq!(cifar.default_epsilons, vec![0.01, 0.03, 0.05, 0.1]);
        let mnist = ModelId::MnistSimpleCnn.spec();
        assert_eq!(mnist.normalization, Normalization::new(vec![0.1307], vec![0.3081]));
        assert_eq!(mnist.default_epsilons, vec![0.05, 0.1, 0.2, 0.3]);
    }

    #[test]
    fn loads_model_and_normalized_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let provider = mnist_fixture(dir.path(), &[784, 16, 10]);
        let ctx = ExecutionContext::default();
        let oracle = provider.load_model(&ctx, ModelId::MnistSimpleCnn).unwrap();
        assert_eq!(oracle.num_classes(), 10);
        let dataset = provider.load_dataset(&ctx, ModelId::MnistSimpleCnn).unwrap();
        assert_eq!(dataset.len(), 3);
        let batch = dataset.batches(2, None, None).next().unwrap();
        approx::assert_abs_diff_eq!(batch.inputs[[0, 0, 0, 0]], -0.1307 / 0.3081, epsilon = 1e-12);
        assert_eq!(oracle.predict(&batch.inputs).unwrap().shape(), &[2, 10]);
    }

    #[test]
    fn missing_weights_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileModelProvider::new(dir.path(), dir.path());
        let ctx = ExecutionContext::default();
        match provider.load_model(&ctx, ModelId::Cifar10Resnet20) {
            Err(ResourceError::ModelNotFound { path }) => {
                assert_eq!(path, dir.path().join("cifar10_resnet20.json"));
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert!(matches!(
            provider.load_dataset(&ctx, ModelId::Cifar10Resnet20),
            Err(ResourceError::DatasetNotFound { .. })
        ));
    }

    #[test]
    fn rejects_wrong_class_count() {
        let dir = tempfile::tempdir().unwrap();
        let provider = mnist_fixture(dir.path(), &[784, 4]);
        let ctx = ExecutionContext::default();
        assert!(matches!(
            provider.load_model(&ctx, ModelId::MnistSimpleCnn),
            Err(ResourceError::InvalidModel { .. })
        ));
    }

    #[test]
    fn dataset_labels_must_fit_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let provider = mnist_fixture(dir.path(), &[784, 10]);
        let samples = vec![
            SampleRecord {
                input: vec![0.; 784],
                label: 9,
            },
            SampleRecord {
                input: vec![0.; 784],
                label: 10,
            },
        ];
        write_json(
            &dir.path().join("mnist.json"),
            &DatasetFile {
                shape: vec![28, 28, 1],
                samples,
            },
        );
        let ctx = ExecutionContext::default();
        match provider.load_dataset(&ctx, ModelId::MnistSimpleCnn) {
            Err(ResourceError::LabelOutOfRange { path, index, label, .. }) => {
                assert_eq!(path, dir.path().join("mnist.json"));
                assert_eq!((index, label), (1, 10));
            }
            other => panic!("unexpected {:?}", other.map(|d| d.len())),
        }
    }
}
