//! Training → export → inference pipeline
//!
//! Collects real combat rollouts, runs an update, exports the weights and
//! checks the tch-free inference path reproduces the trained actor.
#![cfg(feature = "training")]

use anyhow::Result;
use skybattle::{
    codec::ModelSignature,
    env::combat::{CombatConfig, Role},
    error::SkyBattleError,
    host::{play_match, TeamController},
    inference::PolicyArtifact,
    multi_agent::{CollectTarget, MatchmakingStrategy, OpponentPool, OpponentSelector, RolloutCollector},
    train::{MappoConfig, MappoTrainer},
};
use tch::Device;

const TEAM_SIZE: usize = 2;

fn small_config() -> MappoConfig {
    MappoConfig::new().hidden(vec![32], vec![32]).n_epochs(2).batch_size(64).seed(9)
}

#[test]
fn test_train_export_load_inference() -> Result<()> {
    let combat = CombatConfig::default().symmetric(TEAM_SIZE).time_limit(40);
    let signature = ModelSignature::for_team_size(TEAM_SIZE);
    let config = small_config();

    println!("=== Step 1: Collect and train ===");
    let mut trainer = MappoTrainer::new(config.clone(), signature, Device::Cpu)?;
    let mut collector = RolloutCollector::new(combat.clone(), 2, config.seed)?;
    let pool = OpponentPool::new(config.pool_capacity, config.snapshot_interval);
    let mut selector = OpponentSelector::new(MatchmakingStrategy::Latest, 1.0);

    let collected = collector.collect(&trainer.snapshot(), &pool, &mut selector, CollectTarget::transitions(256));
    assert!(collected.buffer.len() >= 256);
    let batch = collected.buffer.into_batch(config.gamma as f32, config.gae_lambda as f32, config.normalize_advantages);
    let stats = trainer.update(&batch)?;
    assert!(stats.is_finite());
    println!("update: actor {:.4} critic {:.4} kl {:.4}", stats.actor_loss, stats.critic_loss, stats.approx_kl);

    println!("=== Step 2: Export ===");
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("policy.json");
    trainer.artifact().save(&path)?;
    assert!(path.exists());

    println!("=== Step 3: Load and compare ===");
    let loaded = PolicyArtifact::load_checked(&path, &signature)?;
    assert_eq!(loaded.version, 1);
    let snapshot = trainer.snapshot();
    let restored = loaded.into_snapshot();

    for i in (0..batch.len()).step_by(17) {
        let obs = batch.observation(i);
        let role = batch.roles[i];
        let expected = snapshot.actors.actor(role).distribution(obs);
        let actual = restored.actors.actor(role).distribution(obs);
        for (a, b) in expected.mean.iter().zip(&actual.mean) {
            assert!((a - b).abs() < 1e-5);
        }
        for (a, b) in expected.trigger_probs().iter().zip(&actual.trigger_probs()) {
            assert!((a - b).abs() < 1e-5);
        }
        assert_eq!(snapshot.act_deterministic(obs, role), restored.act_deterministic(obs, role));

        let state = batch.state(i);
        let (v1, v2) = (snapshot.value(state), restored.value(state));
        assert!((v1.unwrap_or_default() - v2.unwrap_or_default()).abs() < 1e-4);
    }

    println!("=== Step 4: Play with the exported policy ===");
    let report = play_match(combat, TeamController::Policy(restored), TeamController::Idle)?;
    assert!(report.steps > 0 && report.steps <= 40);

    Ok(())
}

#[test]
fn test_artifact_for_other_team_size_rejected() -> Result<()> {
    let trainer = MappoTrainer::new(small_config(), ModelSignature::for_team_size(3), Device::Cpu)?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("three.json");
    trainer.artifact().save(&path)?;

    let err = PolicyArtifact::load_checked(&path, &ModelSignature::for_team_size(2)).unwrap_err();
    assert!(matches!(err.downcast_ref::<SkyBattleError>(), Some(SkyBattleError::SignatureMismatch { .. })));
    Ok(())
}

#[test]
fn test_bincode_checkpoint_resumes_training() -> Result<()> {
    let signature = ModelSignature::for_team_size(1);
    let config = small_config().share_actor(false);
    let trainer = MappoTrainer::new(config.clone(), signature, Device::Cpu)?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("checkpoint.bin");
    trainer.save_checkpoint(&path)?;

    let artifact = PolicyArtifact::load_checked(&path, &signature)?;
    let mut resumed = MappoTrainer::new(config.seed(99), signature, Device::Cpu)?;
    resumed.load_artifact(&artifact)?;

    let obs = vec![0.25; signature.obs_dim];
    for role in [Role::Attacker, Role::Support] {
        assert_eq!(
            trainer.snapshot().act_deterministic(&obs, role),
            resumed.snapshot().act_deterministic(&obs, role)
        );
    }
    Ok(())
}
