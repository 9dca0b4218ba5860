use ndarray::Array;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use nnv_robust::dataset::{DatasetFile, SampleRecord};
use nnv_robust::dnn::{Dense, ReLU, DNN};
use nnv_robust::models::ModelId;
use nnv_robust::tensorshape::TensorShape;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use std::fs;
use std::path::Path;

pub fn make_dnn(input_shape: &[usize], hidden: usize, classes: usize, seed: u64) -> DNN {
    let mut rng = Pcg64::seed_from_u64(seed);
    let input_size: usize = input_shape.iter().product();
    let normal = Normal::new(0., 1. / (input_size as f64).sqrt()).unwrap();
    let mut dnn = DNN::new(TensorShape::from(input_shape.to_vec()), vec![]);
    dnn.add_layer(Box::new(Dense::from_parts(
        Array::random_using((hidden, input_size), normal, &mut rng),
        Array::random_using(hidden, normal, &mut rng),
    )));
    dnn.add_layer(Box::new(ReLU::new(hidden)));
    dnn.add_layer(Box::new(Dense::from_parts(
        Array::random_using((classes, hidden), normal, &mut rng),
        Array::random_using(classes, normal, &mut rng),
    )));
    dnn
}

/// Writes weights and a `num_samples` dataset for `model` under `dir`.
pub fn write_fixture(dir: &Path, model: ModelId, num_samples: usize, seed: u64) {
    let spec = model.spec();
    let shape: Vec<usize> = (0..spec.input_shape.rank())
        .map(|i| spec.input_shape[i].unwrap())
        .collect();
    let dnn = make_dnn(&shape, 32, spec.num_classes, seed);
    fs::write(
        dir.join(format!("{}.json", model.as_str())),
        serde_json::to_string(&dnn).unwrap(),
    )
    .unwrap();

    let mut rng = Pcg64::seed_from_u64(seed + 1);
    let width: usize = shape.iter().product();
    let samples = (0..num_samples)
        .map(|_| SampleRecord {
            input: (0..width).map(|_| rng.gen_range(0.0..1.0)).collect(),
            label: rng.gen_range(0..spec.num_classes),
        })
        .collect();
    let dataset = DatasetFile { shape, samples };
    fs::write(
        dir.join(format!("{}.json", spec.dataset)),
        serde_json::to_string(&dataset).unwrap(),
    )
    .unwrap();
}
