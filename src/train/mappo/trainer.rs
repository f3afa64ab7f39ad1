//! MAPPO trainer
//!
//! Owns the trainable actor(s) and the centralized critic, each with its own
//! Adam optimizer. [`MappoTrainer::update`] consumes one finished
//! [`RolloutBatch`]; only after it returns is a new [`PolicySnapshot`]
//! published for the next collection round.

use std::path::Path;

use anyhow::{anyhow, Result};
use rand::SeedableRng;
use rand_pcg::Pcg32;
use tch::{nn, Device, Tensor};

use super::{config::MappoConfig, loss::*, stats::TrainingStats};
use crate::{
    buffer::{rollout::generate_minibatch_indices, Minibatch, RolloutBatch},
    codec::ModelSignature,
    env::combat::Role,
    error::SkyBattleError,
    inference::PolicyArtifact,
    policy::{
        mlp::{grad_norm, ActorNetwork, CriticNetwork},
        PolicySnapshot, RolePolicies,
    },
};

/// Multi-agent PPO with decentralized actors and a centralized critic
pub struct MappoTrainer {
    config: MappoConfig,
    signature: ModelSignature,
    /// One network when shared, otherwise indexed by [`Role::index`]
    actors: Vec<ActorNetwork>,
    actor_optimizers: Vec<nn::Optimizer>,
    critic: CriticNetwork,
    critic_optimizer: nn::Optimizer,
    /// Weights after the last update that finished cleanly
    last_good: PolicySnapshot,
    rng: Pcg32,
    updates: u64,
    consecutive_divergences: usize,
}

/// Per-minibatch tensors for the samples of one actor
struct ActorGroup {
    actor: usize,
    len: usize,
    obs: Tensor,
    actions: Tensor,
    old_log_probs: Tensor,
    advantages: Tensor,
}

impl MappoTrainer {
    /// Create a trainer with freshly initialized networks
    pub fn new(config: MappoConfig, signature: ModelSignature, device: Device) -> Result<Self> {
        config.validate()?;
        tch::manual_seed(config.seed as i64);

        let num_actors = if config.share_actor { 1 } else { Role::COUNT };
        let actors: Vec<ActorNetwork> =
            (0..num_actors).map(|_| ActorNetwork::new(signature.obs_dim, &config.actor_hidden, device)).collect();
        let actor_optimizers = actors.iter().map(|a| a.optimizer(config.lr_actor)).collect::<Result<Vec<_>>>()?;
        let critic = CriticNetwork::new(signature.state_dim, &config.critic_hidden, device);
        let critic_optimizer = critic.optimizer(config.lr_critic)?;

        let last_good = export_snapshot(&actors, &critic, 0)?;
        tracing::info!(%signature, actors = num_actors, "created MAPPO trainer");

        Ok(Self {
            rng: Pcg32::seed_from_u64(config.seed),
            config,
            signature,
            actors,
            actor_optimizers,
            critic,
            critic_optimizer,
            last_good,
            updates: 0,
            consecutive_divergences: 0,
        })
    }

    pub fn config(&self) -> &MappoConfig {
        &self.config
    }

    pub fn signature(&self) -> &ModelSignature {
        &self.signature
    }

    /// Updates attempted so far, diverged ones included
    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn consecutive_divergences(&self) -> usize {
        self.consecutive_divergences
    }

    /// Whether the divergence budget is used up
    pub fn is_exhausted(&self) -> bool {
        self.consecutive_divergences >= self.config.max_consecutive_divergences
    }

    /// Weights after the last clean update
    pub fn snapshot(&self) -> PolicySnapshot {
        self.last_good.clone()
    }

    /// Artifact of the last clean weights
    pub fn artifact(&self) -> PolicyArtifact {
        PolicyArtifact::from_snapshot(self.signature, &self.last_good)
    }

    /// Write the last clean weights to `path`
    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.artifact().save(&path)?;
        tracing::info!(path = %path.as_ref().display(), version = self.last_good.version, "saved checkpoint");
        Ok(())
    }

    /// Continue from previously exported weights
    pub fn load_artifact(&mut self, artifact: &PolicyArtifact) -> Result<()> {
        self.signature.ensure_matches(&artifact.signature)?;
        artifact.validate()?;
        match (&artifact.actors, self.actors.as_mut_slice()) {
            (RolePolicies::Shared(actor), [network]) => network.import_from_inference(actor)?,
            (RolePolicies::PerRole { attacker, support }, [a, s]) => {
                a.import_from_inference(attacker)?;
                s.import_from_inference(support)?;
            }
            _ => return Err(anyhow!("artifact actor sharing does not match share_actor")),
        }
        if let Some(critic) = &artifact.critic {
            self.critic.import_from_inference(critic)?;
        }
        self.updates = artifact.version;
        self.last_good = export_snapshot(&self.actors, &self.critic, self.updates)?;
        self.rebuild_optimizers()?;
        Ok(())
    }

    /// Run `n_epochs` passes of minibatch updates over a batch
    ///
    /// On non-finite losses or gradients the weights are rolled back to the
    /// last clean snapshot and a [`SkyBattleError::TrainingDivergence`] is
    /// returned.
    pub fn update(&mut self, batch: &RolloutBatch) -> Result<TrainingStats> {
        if batch.is_empty() {
            return Err(anyhow!("cannot update on an empty batch"));
        }
        if batch.obs_dim != self.signature.obs_dim || batch.state_dim != self.signature.state_dim {
            return Err(SkyBattleError::SignatureMismatch {
                expected: self.signature.to_string(),
                found: format!("obs={} state={}", batch.obs_dim, batch.state_dim),
            }
            .into());
        }

        self.updates += 1;
        let mut stats_sum = TrainingStats::zeros();

        'epochs: for _ in 0..self.config.n_epochs {
            let minibatches = generate_minibatch_indices(batch.len(), self.config.batch_size, &mut self.rng);
            for indices in &minibatches {
                let minibatch = batch.minibatch(indices);
                let step = match self.minibatch_step(&minibatch) {
                    Ok(step) => step,
                    Err(reason) => return Err(self.diverged(reason)),
                };
                stats_sum.add(&step);

                if self.config.target_kl.is_some_and(|kl| step.approx_kl > kl) {
                    tracing::debug!(update = self.updates, approx_kl = step.approx_kl, "early stop on KL");
                    break 'epochs;
                }
            }
        }

        self.last_good = export_snapshot(&self.actors, &self.critic, self.updates)?;
        self.consecutive_divergences = 0;
        Ok(stats_sum.average())
    }

    /// One gradient step; a non-finite value aborts before any optimizer step
    fn minibatch_step(&mut self, mb: &Minibatch) -> std::result::Result<TrainingStats, String> {
        let device = self.critic.device();
        let n = mb.size();

        let groups = self.actor_groups(mb, device);
        let mut actor_total: Option<Tensor> = None;
        let (mut actor_loss, mut entropy, mut clip_fraction, mut approx_kl) = (0.0, 0.0, 0.0, 0.0);
        for group in &groups {
            let weight = group.len as f64 / n as f64;
            let (log_probs, group_entropy) = self.actors[group.actor].evaluate_actions(&group.obs, &group.actions);
            let (policy_loss, clip, kl) =
                compute_policy_loss(&log_probs, &group.old_log_probs, &group.advantages, self.config.clip_range);
            let entropy_loss = compute_entropy_loss(&group_entropy);

            actor_loss += weight * f64::try_from(&policy_loss).unwrap_or(f64::NAN);
            entropy -= weight * f64::try_from(&entropy_loss).unwrap_or(f64::NAN);
            clip_fraction += weight * clip;
            approx_kl += weight * kl;
            let term = (policy_loss + entropy_loss * self.config.ent_coef) * weight;
            actor_total = Some(match actor_total {
                Some(total) => total + term,
                None => term,
            });
        }
        let actor_total = actor_total.ok_or_else(|| "minibatch has no actor samples".to_string())?;

        let states = Tensor::from_slice(&mb.states).view([n as i64, mb.state_dim as i64]).to_device(device);
        let old_values = Tensor::from_slice(&mb.old_values).to_device(device);
        let returns = Tensor::from_slice(&mb.returns).to_device(device);
        let values = self.critic.forward(&states);
        let (value_loss, explained_var) = compute_value_loss(&values, &old_values, &returns, self.config.clip_range_vf);
        let critic_loss = f64::try_from(&value_loss).unwrap_or(f64::NAN);

        if !(actor_loss.is_finite() && critic_loss.is_finite() && entropy.is_finite()) {
            return Err(format!("non-finite loss (actor {actor_loss}, critic {critic_loss})"));
        }

        for optimizer in &mut self.actor_optimizers {
            optimizer.zero_grad();
        }
        self.critic_optimizer.zero_grad();
        actor_total.backward();
        (value_loss * self.config.vf_coef).backward();

        let norms: Vec<f64> = self
            .actors
            .iter()
            .map(|a| grad_norm(a.var_store()))
            .chain(std::iter::once(grad_norm(self.critic.var_store())))
            .collect();
        if let Some(norm) = norms.iter().find(|g| !g.is_finite()) {
            for optimizer in &mut self.actor_optimizers {
                optimizer.zero_grad();
            }
            self.critic_optimizer.zero_grad();
            return Err(format!("non-finite gradient norm {norm}"));
        }

        for optimizer in &mut self.actor_optimizers {
            optimizer.clip_grad_norm(self.config.max_grad_norm);
            optimizer.step();
        }
        self.critic_optimizer.clip_grad_norm(self.config.max_grad_norm);
        self.critic_optimizer.step();

        Ok(TrainingStats::new(actor_loss, critic_loss, entropy, clip_fraction, approx_kl, explained_var))
    }

    /// Split a minibatch by the actor that produced each sample
    fn actor_groups(&self, mb: &Minibatch, device: Device) -> Vec<ActorGroup> {
        let obs = Tensor::from_slice(&mb.observations).view([mb.size() as i64, mb.obs_dim as i64]);
        let actions = Tensor::from_slice(&mb.actions).view([mb.size() as i64, mb.action_dim as i64]);
        let old_log_probs = Tensor::from_slice(&mb.old_log_probs);
        let advantages = Tensor::from_slice(&mb.advantages);

        (0..self.actors.len())
            .filter_map(|actor| {
                let rows: Vec<i64> = mb
                    .roles
                    .iter()
                    .enumerate()
                    .filter(|(_, role)| self.actor_index(**role) == actor)
                    .map(|(i, _)| i as i64)
                    .collect();
                if rows.is_empty() {
                    return None;
                }
                let index = Tensor::from_slice(&rows);
                Some(ActorGroup {
                    actor,
                    len: rows.len(),
                    obs: obs.index_select(0, &index).to_device(device),
                    actions: actions.index_select(0, &index).to_device(device),
                    old_log_probs: old_log_probs.index_select(0, &index).to_device(device),
                    advantages: advantages.index_select(0, &index).to_device(device),
                })
            })
            .collect()
    }

    fn actor_index(&self, role: Role) -> usize {
        if self.actors.len() == 1 {
            0
        } else {
            role.index()
        }
    }

    /// Restore the last clean weights and build the error for this update
    fn diverged(&mut self, reason: String) -> anyhow::Error {
        self.consecutive_divergences += 1;
        tracing::warn!(
            update = self.updates,
            consecutive = self.consecutive_divergences,
            %reason,
            "update diverged, restoring last good weights"
        );
        if let Err(e) = self.restore_last_good() {
            return e.context(format!("failed to restore weights after divergence: {reason}"));
        }
        SkyBattleError::TrainingDivergence { update: self.updates as usize, reason }.into()
    }

    fn restore_last_good(&mut self) -> Result<()> {
        match (self.last_good.actors.as_ref(), self.actors.as_mut_slice()) {
            (RolePolicies::Shared(actor), [network]) => network.import_from_inference(actor)?,
            (RolePolicies::PerRole { attacker, support }, [a, s]) => {
                a.import_from_inference(attacker)?;
                s.import_from_inference(support)?;
            }
            _ => return Err(anyhow!("snapshot does not match the actor layout")),
        }
        if let Some(critic) = &self.last_good.critic {
            self.critic.import_from_inference(critic)?;
        }
        // Adam moments may hold non-finite values
        self.rebuild_optimizers()
    }

    fn rebuild_optimizers(&mut self) -> Result<()> {
        self.actor_optimizers =
            self.actors.iter().map(|a| a.optimizer(self.config.lr_actor)).collect::<Result<Vec<_>>>()?;
        self.critic_optimizer = self.critic.optimizer(self.config.lr_critic)?;
        Ok(())
    }
}

fn export_snapshot(actors: &[ActorNetwork], critic: &CriticNetwork, version: u64) -> Result<PolicySnapshot> {
    let policies = match actors {
        [shared] => RolePolicies::Shared(shared.export_for_inference()?),
        [attacker, support] => RolePolicies::PerRole {
            attacker: attacker.export_for_inference()?,
            support: support.export_for_inference()?,
        },
        _ => return Err(anyhow!("unexpected number of actors: {}", actors.len())),
    };
    Ok(PolicySnapshot::new(version, policies, Some(critic.export_for_inference()?)))
}
