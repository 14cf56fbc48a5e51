use crate::checkpoint::{Checkpoint, Tensor};
use crate::error::PolicyError;
use crate::utils::softmax_rows;
use ::rand::prelude::*;
use ndarray::{Array, Array1, Array2, ArrayView1, Axis, Dimension, Ix1, Ix2, Zip};

/// One clipped policy-gradient step worth of samples.
#[derive(Debug, Clone, Default)]
pub struct PolicyBatch {
    pub states: Vec<Vec<f32>>,
    pub actions: Vec<usize>,
    pub returns: Vec<f32>,          // Normalized discounted returns
    pub old_probabilities: Vec<f32>, // Frozen probability of each taken action
    pub clip_epsilon: f32,
}

impl PolicyBatch {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Anything that maps a feature vector to action probabilities and can be trained
/// with clipped policy-gradient steps.
pub trait PolicyModel: Send {
    fn input_dim(&self) -> usize;
    fn action_dim(&self) -> usize;
    fn action_probabilities(&self, features: &[f32]) -> Result<Vec<f32>, PolicyError>;
    /// Applies one gradient step on `-mean(min(r*G, clip(r)*G))` and returns the loss.
    fn update(&mut self, batch: &PolicyBatch) -> Result<f32, PolicyError>;
    fn export(&self) -> Checkpoint;
    fn import(&mut self, checkpoint: &Checkpoint) -> Result<(), PolicyError>;
}

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-8;

// Fully connected layer, weights shaped [outputs, inputs]
#[derive(Debug, Clone)]
struct Dense {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl Dense {
    // He-uniform weights, zero bias
    fn new<R: Rng + ?Sized>(inputs: usize, outputs: usize, rng: &mut R) -> Self {
        let limit = (6.0 / inputs.max(1) as f32).sqrt();
        Dense {
            weights: Array2::from_shape_simple_fn((outputs, inputs), || rng.gen_range(-limit..=limit)),
            bias: Array1::zeros(outputs),
        }
    }

    fn inputs(&self) -> usize {
        self.weights.ncols()
    }

    fn outputs(&self) -> usize {
        self.weights.nrows()
    }

    // One sample per row
    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weights.t()) + &self.bias
    }
}

// Adam first and second moments for one parameter array
#[derive(Debug, Clone)]
struct Moments<D: Dimension> {
    m: Array<f32, D>,
    v: Array<f32, D>,
}

impl<D: Dimension> Moments<D> {
    fn zeros_like(params: &Array<f32, D>) -> Self {
        Moments {
            m: Array::zeros(params.raw_dim()),
            v: Array::zeros(params.raw_dim()),
        }
    }

    fn step(&mut self, params: &mut Array<f32, D>, grads: &Array<f32, D>, learning_rate: f32, t: i32) {
        let correction1 = 1.0 - ADAM_BETA1.powi(t);
        let correction2 = 1.0 - ADAM_BETA2.powi(t);
        Zip::from(params)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grads)
            .for_each(|p, m, v, &g| {
                *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
                *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
                let m_hat = *m / correction1;
                let v_hat = *v / correction2;
                *p -= learning_rate * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
            });
    }
}

/// Multi-layer perceptron with ReLU hidden layers and a softmax head, trained
/// with Adam.
#[derive(Debug, Clone)]
pub struct MlpPolicy {
    layers: Vec<Dense>,
    weight_moments: Vec<Moments<Ix2>>,
    bias_moments: Vec<Moments<Ix1>>,
    learning_rate: f32,
    steps: i32,
}

impl MlpPolicy {
    pub fn new(input_dim: usize, hidden: &[usize], action_dim: usize, learning_rate: f32, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut sizes = Vec::with_capacity(hidden.len() + 2);
        sizes.push(input_dim);
        sizes.extend_from_slice(hidden);
        sizes.push(action_dim);

        let layers: Vec<Dense> = sizes
            .windows(2)
            .map(|pair| Dense::new(pair[0], pair[1], &mut rng))
            .collect();
        let weight_moments = layers.iter().map(|l| Moments::zeros_like(&l.weights)).collect();
        let bias_moments = layers.iter().map(|l| Moments::zeros_like(&l.bias)).collect();
        MlpPolicy {
            layers,
            weight_moments,
            bias_moments,
            learning_rate,
            steps: 0,
        }
    }

    fn check_width(&self, features: &[f32]) -> Result<(), PolicyError> {
        if features.len() != self.input_dim() {
            return Err(PolicyError::InputWidth {
                found: features.len(),
                expected: self.input_dim(),
            });
        }
        Ok(())
    }

    // Returns the input of every layer followed by the output probabilities,
    // one sample per row
    fn forward_trace(&self, inputs: Array2<f32>) -> (Vec<Array2<f32>>, Array2<f32>) {
        let mut activations = Vec::with_capacity(self.layers.len());
        let mut x = inputs;
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            let mut z = layer.forward(&x);
            if i < last {
                z.mapv_inplace(|v| v.max(0.0));
            }
            activations.push(x);
            x = z;
        }
        softmax_rows(&mut x);
        (activations, x)
    }

    fn stack_states(&self, states: &[Vec<f32>]) -> Result<Array2<f32>, PolicyError> {
        let mut matrix = Array2::zeros((states.len(), self.input_dim()));
        for (mut row, state) in matrix.rows_mut().into_iter().zip(states) {
            self.check_width(state)?;
            row.assign(&ArrayView1::from(state.as_slice()));
        }
        Ok(matrix)
    }

    fn tensor_names(index: usize) -> (String, String) {
        (format!("fc{}.weight", index + 1), format!("fc{}.bias", index + 1))
    }
}

impl PolicyModel for MlpPolicy {
    fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, Dense::inputs)
    }

    fn action_dim(&self) -> usize {
        self.layers.last().map_or(0, Dense::outputs)
    }

    fn action_probabilities(&self, features: &[f32]) -> Result<Vec<f32>, PolicyError> {
        self.check_width(features)?;
        let input = ArrayView1::from(features).insert_axis(Axis(0)).to_owned();
        let (_, probabilities) = self.forward_trace(input);
        Ok(probabilities.row(0).to_vec())
    }

    fn update(&mut self, batch: &PolicyBatch) -> Result<f32, PolicyError> {
        if batch.is_empty() {
            return Ok(0.0);
        }
        let n = batch.len() as f32;
        let states = self.stack_states(&batch.states)?;
        let (activations, probabilities) = self.forward_trace(states);

        // Gradient of the loss w.r.t. the output logits, zero for clipped samples
        let mut delta = Array2::<f32>::zeros(probabilities.raw_dim());
        let mut loss = 0.0;
        for (i, (p, mut d)) in probabilities.rows().into_iter().zip(delta.rows_mut()).enumerate() {
            let action = batch.actions[i];
            let advantage = batch.returns[i];
            let ratio = p[action] / batch.old_probabilities[i].max(f32::MIN_POSITIVE);
            let clipped = ratio.clamp(1.0 - batch.clip_epsilon, 1.0 + batch.clip_epsilon);
            let unclipped_term = ratio * advantage;
            let clipped_term = clipped * advantage;
            loss -= unclipped_term.min(clipped_term) / n;

            if unclipped_term > clipped_term {
                continue;
            }
            // d(-r*G/n)/dz = -(G/n) * r * (onehot - p)
            let scale = -(advantage / n) * ratio;
            d.assign(&p.mapv(|v| -scale * v));
            d[action] += scale;
        }

        let mut weight_grads = Vec::with_capacity(self.layers.len());
        let mut bias_grads = Vec::with_capacity(self.layers.len());
        for (index, layer) in self.layers.iter().enumerate().rev() {
            let input = &activations[index];
            weight_grads.push(delta.t().dot(input));
            bias_grads.push(delta.sum_axis(Axis(0)));
            if index > 0 {
                // Back through the weights, then through the ReLU of the previous layer
                let mut upstream = delta.dot(&layer.weights);
                Zip::from(&mut upstream).and(input).for_each(|u, &x| {
                    if x <= 0.0 {
                        *u = 0.0;
                    }
                });
                delta = upstream;
            }
        }
        weight_grads.reverse();
        bias_grads.reverse();

        self.steps += 1;
        for (index, layer) in self.layers.iter_mut().enumerate() {
            self.weight_moments[index].step(&mut layer.weights, &weight_grads[index], self.learning_rate, self.steps);
            self.bias_moments[index].step(&mut layer.bias, &bias_grads[index], self.learning_rate, self.steps);
        }
        Ok(loss)
    }

    fn export(&self) -> Checkpoint {
        let mut checkpoint = Checkpoint::default();
        for (index, layer) in self.layers.iter().enumerate() {
            let (weight_name, bias_name) = Self::tensor_names(index);
            checkpoint.insert(weight_name, layer.weights.clone().into_dyn());
            checkpoint.insert(bias_name, layer.bias.clone().into_dyn());
        }
        checkpoint
    }

    /// Replaces every parameter. Nothing is changed unless all tensors are present
    /// with the expected shapes.
    fn import(&mut self, checkpoint: &Checkpoint) -> Result<(), PolicyError> {
        let mut staged = Vec::with_capacity(self.layers.len());
        for (index, layer) in self.layers.iter().enumerate() {
            let (weight_name, bias_name) = Self::tensor_names(index);
            let weights: Array2<f32> = expect_tensor(checkpoint, &weight_name, &[layer.outputs(), layer.inputs()])?;
            let bias: Array1<f32> = expect_tensor(checkpoint, &bias_name, &[layer.outputs()])?;
            staged.push((weights, bias));
        }
        for (layer, (weights, bias)) in self.layers.iter_mut().zip(staged) {
            layer.weights = weights;
            layer.bias = bias;
        }
        Ok(())
    }
}

fn expect_tensor<D: Dimension>(checkpoint: &Checkpoint, name: &str, shape: &[usize]) -> Result<Array<f32, D>, PolicyError> {
    let tensor: &Tensor = checkpoint
        .get(name)
        .ok_or_else(|| PolicyError::MissingTensor(name.to_string()))?;
    let mismatch = || PolicyError::ShapeMismatch {
        name: name.to_string(),
        found: tensor.shape().to_vec(),
        expected: shape.to_vec(),
    };
    if tensor.shape() != shape {
        return Err(mismatch());
    }
    tensor.clone().into_dimensionality::<D>().map_err(|_| mismatch())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn small(seed: u64) -> MlpPolicy {
        MlpPolicy::new(6, &[8, 8], 4, 0.01, seed)
    }

    #[test]
    fn test_probabilities_form_a_distribution() {
        let policy = small(1);
        let p = policy.action_probabilities(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]).unwrap();
        assert_eq!(p.len(), 4);
        assert_approx_eq!(p.iter().sum::<f32>(), 1.0, 1e-5);
        assert!(p.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_wrong_width_is_rejected() {
        let policy = small(1);
        assert_eq!(
            policy.action_probabilities(&[1.0, 2.0]),
            Err(PolicyError::InputWidth { found: 2, expected: 6 })
        );
    }

    #[test]
    fn test_same_seed_same_parameters() {
        assert_eq!(small(5).export(), small(5).export());
        assert_ne!(small(5).export(), small(6).export());
    }

    #[test]
    fn test_export_names_and_shapes() {
        let checkpoint = MlpPolicy::new(10, &[256, 256, 128], 4, 0.001, 0).export();
        assert_eq!(checkpoint.tensors.len(), 8);
        assert_eq!(checkpoint.get("fc1.weight").unwrap().shape(), &[256, 10]);
        assert_eq!(checkpoint.get("fc4.weight").unwrap().shape(), &[4, 128]);
        assert_eq!(checkpoint.get("fc4.bias").unwrap().shape(), &[4]);
    }

    #[test]
    fn test_import_round_trips_parameters() {
        let source = small(1);
        let mut target = small(2);
        target.import(&source.export()).unwrap();
        let x = [0.3, -0.2, 0.9, 0.0, 0.5, 0.1];
        assert_eq!(
            source.action_probabilities(&x).unwrap(),
            target.action_probabilities(&x).unwrap()
        );
    }

    #[test]
    fn test_import_rejects_incompatible_checkpoint() {
        let mut policy = small(1);
        let before = policy.export();
        let other = MlpPolicy::new(7, &[8, 8], 4, 0.01, 1).export();
        assert!(matches!(policy.import(&other), Err(PolicyError::ShapeMismatch { .. })));
        assert_eq!(policy.export(), before);

        let mut partial = before.clone();
        partial.tensors.remove("fc3.bias");
        assert_eq!(policy.import(&partial), Err(PolicyError::MissingTensor("fc3.bias".to_string())));
    }

    #[test]
    fn test_positive_return_raises_action_probability() {
        let mut policy = small(3);
        let state = vec![0.5, -0.5, 0.25, 1.0, 0.0, 0.75];
        let before = policy.action_probabilities(&state).unwrap()[2];
        for _ in 0..20 {
            let frozen = policy.action_probabilities(&state).unwrap()[2];
            let batch = PolicyBatch {
                states: vec![state.clone()],
                actions: vec![2],
                returns: vec![1.0],
                old_probabilities: vec![frozen],
                clip_epsilon: 0.2,
            };
            policy.update(&batch).unwrap();
        }
        let after = policy.action_probabilities(&state).unwrap()[2];
        assert!(after > before, "{} should exceed {}", after, before);
    }

    #[test]
    fn test_clipped_samples_leave_parameters_unchanged() {
        let mut policy = small(4);
        let state = vec![0.1; 6];
        let current = policy.action_probabilities(&state).unwrap()[0];
        let before = policy.export();
        // Ratio of 2 with a positive return: the clipped term is smaller and has no gradient
        let batch = PolicyBatch {
            states: vec![state],
            actions: vec![0],
            returns: vec![1.0],
            old_probabilities: vec![current / 2.0],
            clip_epsilon: 0.2,
        };
        let loss = policy.update(&batch).unwrap();
        assert_approx_eq!(loss, -1.2, 1e-5);
        assert_eq!(policy.export(), before);
    }

    #[test]
    fn test_negative_return_clips_at_lower_bound() {
        let mut policy = small(4);
        let state = vec![0.1; 6];
        let current = policy.action_probabilities(&state).unwrap()[1];
        let before = policy.export();
        // Ratio of 0.5 with a negative return: clipped to 0.8, loss = 0.8
        let batch = PolicyBatch {
            states: vec![state],
            actions: vec![1],
            returns: vec![-1.0],
            old_probabilities: vec![current * 2.0],
            clip_epsilon: 0.2,
        };
        let loss = policy.update(&batch).unwrap();
        assert_approx_eq!(loss, 0.8, 1e-5);
        assert_eq!(policy.export(), before);
    }
}
