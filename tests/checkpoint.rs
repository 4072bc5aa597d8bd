#![cfg(feature = "nn")]

use soccer_mappo::{CheckpointPaths, Coach, Role, ScriptedSimulation, TrainingConfig};
use tch::Device;
use tempfile::tempdir;

fn config(dir: &std::path::Path, resume: bool) -> TrainingConfig {
    TrainingConfig {
        n_step: 8,
        batch_size: 4,
        hidden_sizes: vec![16],
        checkpoint_dir: Some(dir.to_path_buf()),
        resume,
        ..TrainingConfig::default()
    }
}

#[test]
fn training_writes_four_artifacts() {
    let dir = tempdir().unwrap();
    let mut coach = Coach::new(ScriptedSimulation::new(8, 8, 1.0), config(dir.path(), false), Device::Cpu).unwrap();
    coach.train(1).unwrap();

    for name in ["goalie_actor.ot", "goalie_critic.ot", "striker_actor.ot", "striker_critic.ot"] {
        assert!(dir.path().join(name).is_file(), "missing {name}");
    }
    let paths = CheckpointPaths::new(dir.path());
    assert!(paths.exists(Role::Goalie));
    assert!(paths.exists(Role::Striker));
}

#[test]
fn resume_restores_trained_parameters() {
    let dir = tempdir().unwrap();
    let mut trained = Coach::new(ScriptedSimulation::new(8, 8, 1.0), config(dir.path(), false), Device::Cpu).unwrap();
    trained.train(2).unwrap();

    let resumed = Coach::new(ScriptedSimulation::new(8, 8, 1.0), config(dir.path(), true), Device::Cpu).unwrap();
    let fresh = Coach::new(ScriptedSimulation::new(8, 8, 1.0), config(dir.path(), false), Device::Cpu).unwrap();

    for role in Role::ALL {
        let want = trained.model(role).snapshot();
        assert_eq!(resumed.model(role).snapshot().max_abs_diff(&want), 0.0);
        assert!(fresh.model(role).snapshot().max_abs_diff(&want) > 0.0);
    }
}

#[test]
fn resume_without_checkpoint_starts_fresh() {
    let dir = tempdir().unwrap();
    let empty = dir.path().join("nothing-here");
    let coach = Coach::new(ScriptedSimulation::new(8, 8, 1.0), config(&empty, true), Device::Cpu);
    assert!(coach.is_ok());
}
