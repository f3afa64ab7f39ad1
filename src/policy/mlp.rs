//! Trainable actor and critic networks
//!
//! tch-rs counterparts of [`ActorModel`] and [`CriticModel`]. Each network
//! owns its own `VarStore` so actors and the critic get separate optimizers.
//!
//! # Architecture
//!
//! ```text
//!   Actor                         Critic
//!   obs                           state
//!    |                              |
//! [Dense(h)] Tanh  ...         [Dense(h)] Tanh ...
//!    |       \                      |
//! [Dense(4)] [Dense(4)]         [Dense(1)]
//!   tanh      logits                |
//!    |          |                 value
//!  mean   trigger probs
//!  + log_std
//! ```

use anyhow::{anyhow, Result};
use tch::{
    nn::{self, Init, Module, OptimizerConfig},
    Device, Kind, Tensor,
};

use super::actor::{ActorModel, CriticModel, INITIAL_LOG_STD};
use crate::{
    codec::{CONTINUOUS_DIM, TRIGGER_DIM},
    inference::{Activation, LayerWeights, MlpWeights},
};

/// `0.5 * ln(2π)`
const HALF_LN_2PI: f64 = 0.918_938_533_204_672_7;

fn linear_config(gain: f64) -> nn::LinearConfig {
    nn::LinearConfig { ws_init: Init::Orthogonal { gain }, ..Default::default() }
}

fn build_trunk(root: &nn::Path, input: i64, hidden: &[usize]) -> nn::Sequential {
    let mut trunk = nn::seq();
    let mut in_features = input;
    for (i, &width) in hidden.iter().enumerate() {
        let width = width as i64;
        trunk = trunk
            .add(nn::linear(root / "trunk" / format!("fc{}", i + 1), in_features, width, linear_config(2.0_f64.sqrt())))
            .add_fn(|x| x.tanh());
        in_features = width;
    }
    trunk
}

/// Copy a tensor into a vector on the CPU
fn tensor_to_vec(tensor: &Tensor) -> Result<Vec<f32>> {
    let flat = tensor.to_device(Device::Cpu).to_kind(Kind::Float).contiguous().view([-1]);
    Vec::<f32>::try_from(flat).map_err(|e| anyhow!("failed to read tensor {:?}: {e}", tensor.size()))
}

/// Export a linear layer; tch stores weights as `[out, in]`, which is our layout
fn export_layer(vs: &nn::VarStore, prefix: &str) -> Result<LayerWeights> {
    let variables = vs.variables();
    let weight = variables.get(&format!("{prefix}.weight")).ok_or_else(|| anyhow!("missing {prefix}.weight"))?;
    let bias = variables.get(&format!("{prefix}.bias")).ok_or_else(|| anyhow!("missing {prefix}.bias"))?;
    let size = weight.size();
    Ok(LayerWeights::new(tensor_to_vec(weight)?, tensor_to_vec(bias)?, size[1] as usize, size[0] as usize))
}

fn import_layer(vs: &nn::VarStore, prefix: &str, layer: &LayerWeights) -> Result<()> {
    let variables = vs.variables();
    let mut weight = variables.get(&format!("{prefix}.weight")).ok_or_else(|| anyhow!("missing {prefix}.weight"))?.shallow_clone();
    let mut bias = variables.get(&format!("{prefix}.bias")).ok_or_else(|| anyhow!("missing {prefix}.bias"))?.shallow_clone();
    if weight.size() != [layer.out_features as i64, layer.in_features as i64] {
        return Err(anyhow!("layer {prefix} has shape {:?}, weights are {}x{}", weight.size(), layer.out_features, layer.in_features));
    }
    let device = vs.device();
    tch::no_grad(|| {
        weight.copy_(&Tensor::from_slice(&layer.weights).view([layer.out_features as i64, layer.in_features as i64]).to_device(device));
        bias.copy_(&Tensor::from_slice(&layer.biases).to_device(device));
    });
    Ok(())
}

/// Global L2 norm of all gradients in a store
pub fn grad_norm(vs: &nn::VarStore) -> f64 {
    vs.trainable_variables()
        .iter()
        .map(|v| {
            let g = v.grad();
            if g.defined() {
                f64::try_from(g.square().sum(Kind::Float)).unwrap_or(f64::NAN)
            } else {
                0.0
            }
        })
        .sum::<f64>()
        .sqrt()
}

/// Gaussian-plus-Bernoulli actor trained with PPO
pub struct ActorNetwork {
    vs: nn::VarStore,
    trunk: nn::Sequential,
    mean_head: nn::Linear,
    trigger_head: nn::Linear,
    log_std: Tensor,
    hidden: Vec<usize>,
    device: Device,
}

impl ActorNetwork {
    pub fn new(obs_dim: usize, hidden: &[usize], device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let root = vs.root();
        let trunk = build_trunk(&root, obs_dim as i64, hidden);
        let features = hidden.last().copied().unwrap_or(obs_dim) as i64;
        let mean_head = nn::linear(&root / "mean", features, CONTINUOUS_DIM as i64, linear_config(0.01));
        let trigger_head = nn::linear(&root / "trigger", features, TRIGGER_DIM as i64, linear_config(0.01));
        let log_std = root.var("log_std", &[CONTINUOUS_DIM as i64], Init::Const(INITIAL_LOG_STD as f64));

        Self { vs, trunk, mean_head, trigger_head, log_std, hidden: hidden.to_vec(), device }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    pub fn optimizer(&self, learning_rate: f64) -> Result<nn::Optimizer> {
        Ok(nn::Adam::default().build(&self.vs, learning_rate)?)
    }

    /// Means `[B, 4]` and trigger logits `[B, 4]`
    pub fn forward(&self, obs: &Tensor) -> (Tensor, Tensor) {
        let features = self.trunk.forward(obs);
        (self.mean_head.forward(&features).tanh(), self.trigger_head.forward(&features))
    }

    /// Log-probabilities `[B]` and entropies `[B]` of stored actions
    pub fn evaluate_actions(&self, obs: &Tensor, actions: &Tensor) -> (Tensor, Tensor) {
        let (mean, logits) = self.forward(obs);
        let continuous = actions.narrow(1, 0, CONTINUOUS_DIM as i64);
        let fired = actions.narrow(1, CONTINUOUS_DIM as i64, TRIGGER_DIM as i64).gt(0.5).to_kind(Kind::Float);

        let std = self.log_std.exp();
        let z = (&continuous - &mean) / &std;
        let gaussian = (z.square() * -0.5 - &self.log_std - HALF_LN_2PI).sum_dim_intlist(-1, false, Kind::Float);

        let log_on = logits.log_sigmoid();
        let log_off = (-&logits).log_sigmoid();
        let log_ratio = &log_on - &log_off;
        let bernoulli = (&log_off + &fired * &log_ratio).sum_dim_intlist(-1, false, Kind::Float);

        let p = logits.sigmoid();
        let trigger_entropy = -(&log_off + &p * &log_ratio).sum_dim_intlist(-1, false, Kind::Float);
        let gaussian_entropy = (&self.log_std + 0.5 + HALF_LN_2PI).sum(Kind::Float);

        (gaussian + bernoulli, trigger_entropy + gaussian_entropy)
    }

    /// Extract weights into a pure-Rust actor
    pub fn export_for_inference(&self) -> Result<ActorModel> {
        let layers = (1..=self.hidden.len())
            .map(|i| export_layer(&self.vs, &format!("trunk.fc{i}")))
            .collect::<Result<Vec<_>>>()?;
        Ok(ActorModel {
            trunk: MlpWeights { layers, activation: Activation::Tanh },
            mean_head: export_layer(&self.vs, "mean")?,
            trigger_head: export_layer(&self.vs, "trigger")?,
            log_std: tensor_to_vec(&self.log_std)?,
        })
    }

    /// Overwrite the parameters with exported weights
    pub fn import_from_inference(&mut self, model: &ActorModel) -> Result<()> {
        if model.trunk.layers.len() != self.hidden.len() || model.log_std.len() != CONTINUOUS_DIM {
            return Err(anyhow!("actor weights do not match the network architecture"));
        }
        for (i, layer) in model.trunk.layers.iter().enumerate() {
            import_layer(&self.vs, &format!("trunk.fc{}", i + 1), layer)?;
        }
        import_layer(&self.vs, "mean", &model.mean_head)?;
        import_layer(&self.vs, "trigger", &model.trigger_head)?;
        let device = self.device;
        tch::no_grad(|| self.log_std.copy_(&Tensor::from_slice(&model.log_std).to_device(device)));
        Ok(())
    }
}

/// Centralized value network
pub struct CriticNetwork {
    vs: nn::VarStore,
    trunk: nn::Sequential,
    value_head: nn::Linear,
    hidden: Vec<usize>,
    device: Device,
}

impl CriticNetwork {
    pub fn new(state_dim: usize, hidden: &[usize], device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let root = vs.root();
        let trunk = build_trunk(&root, state_dim as i64, hidden);
        let features = hidden.last().copied().unwrap_or(state_dim) as i64;
        let value_head = nn::linear(&root / "value", features, 1, linear_config(1.0));
        Self { vs, trunk, value_head, hidden: hidden.to_vec(), device }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    pub fn optimizer(&self, learning_rate: f64) -> Result<nn::Optimizer> {
        Ok(nn::Adam::default().build(&self.vs, learning_rate)?)
    }

    /// Values `[B]`
    pub fn forward(&self, states: &Tensor) -> Tensor {
        self.value_head.forward(&self.trunk.forward(states)).squeeze_dim(-1)
    }

    pub fn export_for_inference(&self) -> Result<CriticModel> {
        let layers = (1..=self.hidden.len())
            .map(|i| export_layer(&self.vs, &format!("trunk.fc{i}")))
            .collect::<Result<Vec<_>>>()?;
        Ok(CriticModel {
            trunk: MlpWeights { layers, activation: Activation::Tanh },
            value_head: export_layer(&self.vs, "value")?,
        })
    }

    pub fn import_from_inference(&mut self, model: &CriticModel) -> Result<()> {
        if model.trunk.layers.len() != self.hidden.len() {
            return Err(anyhow!("critic weights do not match the network architecture"));
        }
        for (i, layer) in model.trunk.layers.iter().enumerate() {
            import_layer(&self.vs, &format!("trunk.fc{}", i + 1), layer)?;
        }
        import_layer(&self.vs, "value", &model.value_head)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    use super::*;

    #[test]
    fn test_actor_shapes() {
        let actor = ActorNetwork::new(10, &[32, 32], Device::Cpu);
        let obs = Tensor::randn([6, 10], (Kind::Float, Device::Cpu));
        let actions = Tensor::randn([6, 8], (Kind::Float, Device::Cpu));

        let (mean, logits) = actor.forward(&obs);
        assert_eq!(mean.size(), vec![6, 4]);
        assert_eq!(logits.size(), vec![6, 4]);

        let (log_probs, entropy) = actor.evaluate_actions(&obs, &actions);
        assert_eq!(log_probs.size(), vec![6]);
        assert_eq!(entropy.size(), vec![6]);
    }

    #[test]
    fn test_export_matches_network() -> Result<()> {
        let actor = ActorNetwork::new(10, &[16, 16], Device::Cpu);
        let exported = actor.export_for_inference()?;
        assert!(exported.is_consistent());

        let obs: Vec<f32> = (0..10).map(|i| i as f32 * 0.1 - 0.5).collect();
        let mut action = vec![0.2, -0.4, 0.9, 0.0];
        action.extend([1.0, 0.0, 1.0, 0.0]);

        let obs_t = Tensor::from_slice(&obs).view([1, 10]);
        let act_t = Tensor::from_slice(&action).view([1, 8]);
        let (log_prob, _) = actor.evaluate_actions(&obs_t, &act_t);
        let expected = f64::try_from(log_prob.sum(Kind::Float))? as f32;

        assert!((exported.log_prob(&obs, &action) - expected).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_import_roundtrip() -> Result<()> {
        let mut rng = Pcg32::seed_from_u64(3);
        let model = ActorModel::random(10, &[16, 16], &mut rng);
        let mut actor = ActorNetwork::new(10, &[16, 16], Device::Cpu);

        actor.import_from_inference(&model)?;
        assert_eq!(actor.export_for_inference()?, model);

        let wrong = ActorModel::random(10, &[16], &mut rng);
        assert!(actor.import_from_inference(&wrong).is_err());
        Ok(())
    }

    #[test]
    fn test_critic_roundtrip() -> Result<()> {
        let mut rng = Pcg32::seed_from_u64(5);
        let model = CriticModel::random(12, &[8, 8], &mut rng);
        let mut critic = CriticNetwork::new(12, &[8, 8], Device::Cpu);
        critic.import_from_inference(&model)?;

        let state = vec![0.25; 12];
        let value = critic.forward(&Tensor::from_slice(&state).view([1, 12]));
        let value = f64::try_from(value.sum(Kind::Float))? as f32;
        assert!((value - model.value(&state)).abs() < 1e-4);
        Ok(())
    }
}
