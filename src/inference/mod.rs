//! Pure Rust inference
//!
//! A lightweight forward-pass engine for exported networks. It has no
//! libtorch dependency, so trained policies can be deployed and matches can
//! be played without the `training` feature.

pub mod weights;

use rand::Rng;
use serde::{Deserialize, Serialize};

pub use weights::PolicyArtifact;

/// Hidden-layer activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    ReLU,
    Tanh,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Activation::ReLU => x.max(0.0),
            Activation::Tanh => x.tanh(),
        }
    }
}

/// Weights and biases for a single layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerWeights {
    /// Weight matrix (flattened, row-major, `[out_features, in_features]`)
    pub weights: Vec<f32>,
    /// Bias vector
    pub biases: Vec<f32>,
    /// Input dimension
    pub in_features: usize,
    /// Output dimension
    pub out_features: usize,
}

impl LayerWeights {
    /// Create new layer weights
    pub fn new(weights: Vec<f32>, biases: Vec<f32>, in_features: usize, out_features: usize) -> Self {
        assert_eq!(weights.len(), in_features * out_features, "Weight matrix size mismatch");
        assert_eq!(biases.len(), out_features, "Bias vector size mismatch");

        Self { weights, biases, in_features, out_features }
    }

    /// Uniformly initialized layer scaled by fan-in
    pub fn random<R: Rng>(in_features: usize, out_features: usize, gain: f32, rng: &mut R) -> Self {
        let bound = gain / (in_features.max(1) as f32).sqrt();
        let weights = (0..in_features * out_features).map(|_| rng.gen_range(-bound..=bound)).collect();
        Self::new(weights, vec![0.0; out_features], in_features, out_features)
    }

    /// Whether the stored vectors agree with the declared shape
    pub fn is_consistent(&self) -> bool {
        self.weights.len() == self.in_features * self.out_features && self.biases.len() == self.out_features
    }

    /// Forward pass through a linear layer
    pub fn forward(&self, input: &[f32]) -> Vec<f32> {
        assert_eq!(input.len(), self.in_features, "Input size mismatch");

        self.weights
            .chunks_exact(self.in_features.max(1))
            .zip(&self.biases)
            .map(|(row, bias)| bias + row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>())
            .collect()
    }
}

/// Stack of linear layers with an activation after each
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpWeights {
    pub layers: Vec<LayerWeights>,
    pub activation: Activation,
}

impl MlpWeights {
    /// Randomly initialized trunk `input -> hidden[0] -> ... -> hidden[n-1]`
    pub fn random<R: Rng>(input: usize, hidden: &[usize], activation: Activation, rng: &mut R) -> Self {
        let mut layers = Vec::with_capacity(hidden.len());
        let mut in_features = input;
        for &width in hidden {
            layers.push(LayerWeights::random(in_features, width, 1.0, rng));
            in_features = width;
        }
        Self { layers, activation }
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, |l| l.in_features)
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(self.input_dim(), |l| l.out_features)
    }

    /// Check every layer feeds the next
    pub fn is_consistent(&self) -> bool {
        self.layers.iter().all(LayerWeights::is_consistent)
            && self.layers.windows(2).all(|w| w[0].out_features == w[1].in_features)
    }

    /// Features after the last hidden layer
    pub fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut x = input.to_vec();
        for layer in &self.layers {
            x = layer.forward(&x);
            for v in x.iter_mut() {
                *v = self.activation.apply(*v);
            }
        }
        x
    }
}

/// Logistic function
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    use super::*;

    #[test]
    fn test_layer_forward() {
        // 2D input -> 3D output
        let weights = vec![
            1.0, 2.0, // First output neuron
            3.0, 4.0, // Second output neuron
            5.0, 6.0, // Third output neuron
        ];
        let biases = vec![0.1, 0.2, 0.3];
        let layer = LayerWeights::new(weights, biases, 2, 3);

        let output = layer.forward(&[1.0, 2.0]);

        // [1*1 + 2*2 + 0.1, 1*3 + 2*4 + 0.2, 1*5 + 2*6 + 0.3]
        assert!((output[0] - 5.1).abs() < 1e-5);
        assert!((output[1] - 11.2).abs() < 1e-5);
        assert!((output[2] - 17.3).abs() < 1e-5);
    }

    #[test]
    #[should_panic(expected = "Weight matrix size mismatch")]
    fn test_layer_shape_checked() {
        LayerWeights::new(vec![1.0; 5], vec![0.0; 2], 2, 2);
    }

    #[test]
    fn test_mlp_forward_relu() {
        let mlp = MlpWeights {
            layers: vec![LayerWeights::new(vec![1.0, 0.0, 0.0, -1.0], vec![0.0, 0.0], 2, 2)],
            activation: Activation::ReLU,
        };
        assert_eq!(mlp.forward(&[3.0, 2.0]), vec![3.0, 0.0]);
    }

    #[test]
    fn test_random_mlp_shapes() {
        let mut rng = Pcg32::seed_from_u64(0);
        let mlp = MlpWeights::random(10, &[16, 8], Activation::Tanh, &mut rng);
        assert!(mlp.is_consistent());
        assert_eq!(mlp.input_dim(), 10);
        assert_eq!(mlp.output_dim(), 8);
        let out = mlp.forward(&[0.5; 10]);
        assert_eq!(out.len(), 8);
        assert!(out.iter().all(|x| x.abs() <= 1.0));
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(100.0) <= 1.0);
        assert!(sigmoid(-100.0) >= 0.0);
        assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-6);
    }
}
