use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// Per-sample tensor shape. `None` marks a dimension that accepts any size.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TensorShape {
	dims: Vec<Option<usize>>,
}

impl TensorShape {
	pub fn new(dims: Vec<Option<usize>>) -> Self {
		Self { dims }
	}

	pub fn rank(&self) -> usize {
		self.dims.len()
	}

	pub fn is_fully_defined(&self) -> bool {
		self.dims.iter().all(Option::is_some)
	}

	/// Number of scalars in one sample, if every dimension is known.
	pub fn dims(&self) -> Option<usize> {
		self.dims.iter().copied().product()
	}

	pub fn is_compatible_with(&self, other: &Self) -> bool {
		if self.dims.len() != other.dims.len() {
			return false;
		}
		self.dims
			.iter()
			.zip(other.dims.iter())
			.all(|(x, y)| match (x, y) {
				(Some(a), Some(b)) => a == b,
				_ => true,
			})
	}

	/// Whether a concrete array shape, without its batch axis, fits.
	pub fn matches(&self, shape: &[usize]) -> bool {
		self.is_compatible_with(&Self::from(shape.to_vec()))
	}
}

impl Index<usize> for TensorShape {
	type Output = Option<usize>;

	fn index(&self, idx: usize) -> &Option<usize> {
		&self.dims[idx]
	}
}

impl From<Vec<usize>> for TensorShape {
	fn from(v: Vec<usize>) -> Self {
		Self {
			dims: v.into_iter().map(Some).collect(),
		}
	}
}

impl fmt::Display for TensorShape {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let dims: Vec<String> = self
			.dims
			.iter()
			.map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
			.collect();
		write!(f, "({})", dims.join(", "))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_dims_are_wildcards() {
		let shape = TensorShape::new(vec![None, Some(3)]);
		assert!(shape.matches(&[7, 3]));
		assert!(!shape.matches(&[7, 4]));
		assert!(!shape.matches(&[3]));
		assert_eq!(shape.dims(), None);
		assert_eq!(shape.to_string(), "(?, 3)");
	}

	#[test]
	fn fully_defined_dims_multiply() {
		let shape = TensorShape::from(vec![28, 28, 1]);
		assert!(shape.is_fully_defined());
		assert_eq!(shape.dims(), Some(784));
		assert_eq!(shape[2], Some(1));
	}
}
