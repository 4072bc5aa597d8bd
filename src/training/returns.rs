//! Bootstrapped discounted returns and advantage normalization.
//!
//! A rollout segment is at most `n_step` long, so the return at each step is
//! an N-step return bootstrapped from the critic when the segment stops
//! mid-episode, and a plain Monte Carlo return when the episode ended inside
//! the segment.

/// Guard added to the variance before taking the square root.
pub const ADVANTAGE_EPS: f64 = 1e-8;

/// Computes discounted returns for one agent's segment.
///
/// # Arguments
///
/// * `rewards` - Per-step rewards
/// * `dones` - Per-step episode termination flags
/// * `bootstrap` - Value estimate of the state after the last step (ignored
///   when the last step is terminal)
/// * `gamma` - Discount factor
///
/// # Returns
///
/// `R_t = r_t + γ (1 - done_t) R_{t+1}` with `R_L = bootstrap`.
pub fn discounted_returns(rewards: &[f64], dones: &[bool], bootstrap: f64, gamma: f64) -> Vec<f64> {
    let n = rewards.len();
    assert_eq!(dones.len(), n);

    let mut returns = vec![0.0; n];
    let mut running = bootstrap;

    for t in (0..n).rev() {
        let next_non_terminal = if dones[t] { 0.0 } else { 1.0 };
        running = rewards[t] + gamma * next_non_terminal * running;
        returns[t] = running;
    }

    returns
}

/// Normalizes advantages to zero mean and unit variance in place.
pub fn normalize_advantages(advantages: &mut [f64]) {
    if advantages.is_empty() {
        return;
    }
    let n = advantages.len() as f64;
    let mean = advantages.iter().sum::<f64>() / n;
    let var = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
    let std = (var + ADVANTAGE_EPS).sqrt();
    for a in advantages.iter_mut() {
        *a = (*a - mean) / std;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_step_episode_end() {
        let returns = discounted_returns(&[1.0, 0.0, 1.0], &[false, false, true], 0.0, 0.5);
        assert_eq!(returns.len(), 3);
        assert!((returns[0] - 1.25).abs() < 1e-12);
        assert!((returns[1] - 0.5).abs() < 1e-12);
        assert!((returns[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bootstrap_used_mid_episode() {
        let returns = discounted_returns(&[0.0, 0.0], &[false, false], 4.0, 0.5);
        assert!((returns[1] - 2.0).abs() < 1e-12);
        assert!((returns[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bootstrap_ignored_after_terminal() {
        let returns = discounted_returns(&[1.0], &[true], 100.0, 0.99);
        assert!((returns[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn episode_boundary_inside_segment() {
        // Episode ends on step 1; step 2 starts a new one and bootstraps.
        let returns = discounted_returns(&[0.0, 1.0, 0.0], &[false, true, false], 2.0, 0.5);
        assert!((returns[2] - 1.0).abs() < 1e-12);
        assert!((returns[1] - 1.0).abs() < 1e-12);
        assert!((returns[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn matches_closed_form_sum() {
        let rewards = [0.3, -1.0, 2.0, 0.5, 0.0, 1.5];
        let dones = [false, false, false, false, false, true];
        let gamma = 0.9;
        let returns = discounted_returns(&rewards, &dones, 0.0, gamma);
        for i in 0..rewards.len() {
            let expected: f64 = (0..rewards.len() - i)
                .map(|k| gamma.powi(k as i32) * rewards[i + k])
                .sum();
            assert!((returns[i] - expected).abs() < 1e-10);
        }
    }

    #[test]
    fn normalized_advantages_have_unit_stats() {
        let mut adv = vec![1.0, 2.0, 3.0, 10.0, -4.0];
        normalize_advantages(&mut adv);
        let n = adv.len() as f64;
        let mean = adv.iter().sum::<f64>() / n;
        let var = adv.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 1e-9);
        assert!((var.sqrt() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_handles_degenerate_input() {
        let mut empty: Vec<f64> = vec![];
        normalize_advantages(&mut empty);
        assert!(empty.is_empty());

        let mut constant = vec![3.0; 4];
        normalize_advantages(&mut constant);
        assert!(constant.iter().all(|a| a.abs() < 1e-9));
    }
}
