use crate::checkpoint::Checkpoint;
use crate::config::*;
use crate::error::PolicyError;
use crate::features::FeatureEncoder;
use crate::policy::{PolicyBatch, PolicyModel};
use crate::snapshot::BattleSnapshot;
use crate::types::*;
use crate::utils::mean_and_std;
use ::rand::distributions::WeightedIndex;
use ::rand::prelude::*;

/// One decision and its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Vec<f32>,
    pub action: usize,
    pub reward: f32,
    pub next_state: Vec<f32>,
    pub done: bool,
}

// A decision whose reward is known only once the next decision (or round end) happens
#[derive(Debug, Clone)]
struct PendingDecision {
    state: Vec<f32>,
    action: usize,
    distance: f32, // Normalized tank distance when the decision was taken
}

/// Drives one tank. Owns its policy, its RNG and its trajectory buffer; refers to
/// tanks only through `TankId`.
pub struct Agent {
    pub id: TankId,
    policy: Box<dyn PolicyModel>,
    encoder: FeatureEncoder,
    rng: StdRng,
    learning: bool,
    pub gamma: f32,
    pub reward_scale: f32,
    pub memory: Vec<Transition>,
    pending: Option<PendingDecision>,
    pub last_action: Option<usize>,
    pub points: f32, // Shaping reward collected this round
}

impl Agent {
    pub fn new(id: TankId, policy: Box<dyn PolicyModel>, encoder: FeatureEncoder, seed: u64, learning: bool) -> Self {
        Agent {
            id,
            policy,
            encoder,
            rng: StdRng::seed_from_u64(seed),
            learning,
            gamma: GAMMA,
            reward_scale: REWARD_SCALE,
            memory: Vec::new(),
            pending: None,
            last_action: None,
            points: 0.0,
        }
    }

    pub fn with_discount(mut self, gamma: f32, reward_scale: f32) -> Self {
        self.gamma = gamma;
        self.reward_scale = reward_scale;
        self
    }

    /// Samples an action index from the policy's distribution.
    pub fn select_action(&mut self, features: &[f32]) -> Result<usize, PolicyError> {
        let probabilities = self.policy.action_probabilities(features)?;
        validate_distribution(&probabilities)?;
        let distribution = WeightedIndex::new(&probabilities).map_err(|_| invalid(&probabilities))?;
        Ok(distribution.sample(&mut self.rng))
    }

    /// Chooses the keys to hold until the next decision point. In learning mode the
    /// previous decision is closed with its distance-closing reward.
    pub fn decide(&mut self, snapshot: &BattleSnapshot) -> Result<HeldKeys, PolicyError> {
        let features = self.encoder.encode(snapshot, self.id);
        let action = self.select_action(&features)?;
        if self.learning {
            self.record_decision(features, action, snapshot.normalized_distance());
        }
        self.last_action = Some(action);
        crate::debug_agent!(self.id.side(), "chose action {} at {:.2}s", action, snapshot.elapsed_secs);
        Ok(map_action_to_keys(action))
    }

    pub fn record_decision(&mut self, state: Vec<f32>, action: usize, distance: f32) {
        if let Some(previous) = self.pending.take() {
            self.close(previous, state.clone(), distance, false);
        }
        self.pending = Some(PendingDecision { state, action, distance });
    }

    /// Closes the open decision with `done = true`. Returns the points of the round
    /// and resets the counter.
    pub fn finish_round(&mut self, snapshot: &BattleSnapshot) -> f32 {
        if let Some(previous) = self.pending.take() {
            let final_state = self.encoder.encode(snapshot, self.id);
            self.close(previous, final_state, snapshot.normalized_distance(), true);
        }
        std::mem::take(&mut self.points)
    }

    fn close(&mut self, decision: PendingDecision, next_state: Vec<f32>, distance: f32, done: bool) {
        let reward = (decision.distance - distance) * self.reward_scale;
        self.points += reward;
        self.memory.push(Transition {
            state: decision.state,
            action: decision.action,
            reward,
            next_state,
            done,
        });
    }

    /// Clipped policy-gradient training over the whole buffer.
    ///
    /// Returns `None` (and keeps the buffer) when fewer than `batch_size`
    /// transitions are stored. Otherwise the buffer is consumed and the last
    /// epoch's loss is returned.
    pub fn train(&mut self, batch_size: usize, clip_epsilon: f32, epochs: usize) -> Result<Option<f32>, PolicyError> {
        if self.memory.len() < batch_size {
            crate::debug_train!(self.id.side(), "{} transitions, waiting for {}", self.memory.len(), batch_size);
            return Ok(None);
        }

        let rewards: Vec<f32> = self.memory.iter().map(|t| t.reward).collect();
        let dones: Vec<bool> = self.memory.iter().map(|t| t.done).collect();
        let returns = normalize_returns(&discounted_returns(&rewards, &dones, self.gamma));

        let mut batch = PolicyBatch {
            states: self.memory.iter().map(|t| t.state.clone()).collect(),
            actions: self.memory.iter().map(|t| t.action).collect(),
            returns,
            old_probabilities: Vec::new(),
            clip_epsilon,
        };

        let mut loss = 0.0;
        for epoch in 0..epochs {
            batch.old_probabilities = batch
                .states
                .iter()
                .zip(&batch.actions)
                .map(|(state, action)| -> Result<f32, PolicyError> {
                    Ok(self.policy.action_probabilities(state)?[*action])
                })
                .collect::<Result<_, _>>()?;
            loss = self.policy.update(&batch)?;
            crate::debug_train!(self.id.side(), "epoch {} loss {:.5}", epoch, loss);
        }

        log::info!(
            target: "train",
            "agent {} trained on {} transitions, loss {:.5}",
            self.id.side(),
            self.memory.len(),
            loss
        );
        self.memory.clear();
        Ok(Some(loss))
    }

    pub fn export(&self) -> Checkpoint {
        self.policy.export()
    }
}

/// 0 UP, 1 DOWN, 2 LEFT, 3 RIGHT, 4 SHOOT. Anything else holds no key.
pub fn map_action_to_keys(action: usize) -> HeldKeys {
    let mut keys = HeldKeys::none();
    match action {
        0 => keys.up = true,
        1 => keys.down = true,
        2 => keys.left = true,
        3 => keys.right = true,
        4 => keys.shoot = true,
        _ => {}
    }
    keys
}

/// Probabilities must be finite, non-negative and sum to one within tolerance.
pub fn validate_distribution(probabilities: &[f32]) -> Result<(), PolicyError> {
    let sum: f32 = probabilities.iter().sum();
    let well_formed = probabilities.iter().all(|p| p.is_finite() && *p >= 0.0);
    if !well_formed || probabilities.is_empty() || (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(invalid(probabilities));
    }
    Ok(())
}

fn invalid(probabilities: &[f32]) -> PolicyError {
    PolicyError::InvalidDistribution {
        sum: probabilities.iter().sum(),
        probabilities: probabilities.to_vec(),
    }
}

/// Backward discounted returns; the running return restarts at each terminal.
pub fn discounted_returns(rewards: &[f32], dones: &[bool], gamma: f32) -> Vec<f32> {
    let mut returns = vec![0.0; rewards.len()];
    let mut running = 0.0;
    for i in (0..rewards.len()).rev() {
        if dones[i] {
            running = 0.0;
        }
        running = rewards[i] + gamma * running;
        returns[i] = running;
    }
    returns
}

/// `(G - mean) / (std + eps)` with the sample standard deviation.
pub fn normalize_returns(returns: &[f32]) -> Vec<f32> {
    let (mean, std) = mean_and_std(returns);
    returns
        .iter()
        .map(|g| (g - mean) / (std + RETURN_EPSILON))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::arena::fixtures::open_arena;
    use crate::policy::MlpPolicy;
    use crate::tank::Tank;
    use assert_approx_eq::assert_approx_eq;

    fn encoder() -> FeatureEncoder {
        FeatureEncoder::new(&open_arena())
    }

    fn snapshot_with_gap(gap: f32) -> BattleSnapshot {
        let arena = open_arena();
        let tanks = [
            Tank::new(TankId::ONE, Point::new(100.0, 600.0), 0),
            Tank::new(TankId::TWO, Point::new(100.0, 600.0 - gap), 1),
        ];
        BattleSnapshot::capture(&arena, &tanks, 0.0)
    }

    #[test]
    fn test_discounted_returns() {
        let returns = discounted_returns(&[1.0, 0.0, 0.0, 1.0], &[false, false, false, true], 0.99);
        assert_approx_eq!(returns[0], 1.970299, 1e-5);
        assert_approx_eq!(returns[1], 0.9801, 1e-5);
        assert_approx_eq!(returns[2], 0.99, 1e-5);
        assert_approx_eq!(returns[3], 1.0, 1e-5);
    }

    #[test]
    fn test_returns_reset_at_terminal() {
        let returns = discounted_returns(&[1.0, 1.0, 1.0], &[false, true, true], 0.5);
        assert_approx_eq!(returns[0], 1.5);
        assert_approx_eq!(returns[1], 1.0);
        assert_approx_eq!(returns[2], 1.0);
    }

    #[test]
    fn test_normalized_returns_have_zero_mean_unit_variance() {
        let returns = discounted_returns(&[1.0, 0.0, 0.0, 1.0], &[false, false, false, true], 0.99);
        let normalized = normalize_returns(&returns);
        let (mean, std) = mean_and_std(&normalized);
        assert_approx_eq!(mean, 0.0, 1e-5);
        assert_approx_eq!(std, 1.0, 1e-4);
    }

    #[test]
    fn test_action_mapping() {
        assert!(map_action_to_keys(0).up);
        assert!(map_action_to_keys(1).down);
        assert!(map_action_to_keys(2).left);
        assert!(map_action_to_keys(3).right);
        assert!(map_action_to_keys(4).shoot);
        assert!(!map_action_to_keys(5).any());
    }

    #[test]
    fn test_distribution_validation() {
        assert!(validate_distribution(&[0.25, 0.25, 0.5]).is_ok());
        assert!(validate_distribution(&[0.5, 0.6]).is_err());
        assert!(validate_distribution(&[1.2, -0.2]).is_err());
        assert!(validate_distribution(&[f32::NAN, 1.0]).is_err());
        assert!(validate_distribution(&[]).is_err());
    }

    #[test]
    fn test_invalid_policy_output_is_an_error() {
        let mut agent = fixed_agent(TankId::ONE, encoder(), vec![0.5, 0.4, 0.3, 0.2], true);
        let result = agent.decide(&snapshot_with_gap(200.0));
        assert!(matches!(result, Err(PolicyError::InvalidDistribution { .. })));
        assert!(agent.memory.is_empty());
    }

    #[test]
    fn test_sampling_follows_distribution() {
        let mut agent = fixed_agent(TankId::TWO, encoder(), vec![0.0, 0.0, 1.0, 0.0], false);
        let snap = snapshot_with_gap(200.0);
        for _ in 0..10 {
            assert!(agent.decide(&snap).unwrap().left);
        }
        assert_eq!(agent.last_action, Some(2));
    }

    #[test]
    fn test_rewards_close_on_next_decision_and_round_end() {
        let mut agent = fixed_agent(TankId::ONE, encoder(), vec![1.0, 0.0, 0.0, 0.0], true);
        agent.decide(&snapshot_with_gap(416.0)).unwrap();
        assert!(agent.memory.is_empty(), "reward is not known yet");
        agent.decide(&snapshot_with_gap(208.0)).unwrap();
        assert_eq!(agent.memory.len(), 1);
        assert_approx_eq!(agent.memory[0].reward, 2.5); // (0.5 - 0.25) * 10
        assert!(!agent.memory[0].done);

        let points = agent.finish_round(&snapshot_with_gap(416.0));
        assert_eq!(agent.memory.len(), 2);
        assert_approx_eq!(agent.memory[1].reward, -2.5);
        assert!(agent.memory[1].done);
        assert_approx_eq!(points, 0.0);
        assert_approx_eq!(agent.points, 0.0);

        // Nothing pending: a second round end adds nothing
        agent.finish_round(&snapshot_with_gap(100.0));
        assert_eq!(agent.memory.len(), 2);
    }

    #[test]
    fn test_non_learning_agent_records_nothing() {
        let mut agent = fixed_agent(TankId::ONE, encoder(), vec![1.0, 0.0, 0.0, 0.0], false);
        agent.decide(&snapshot_with_gap(416.0)).unwrap();
        agent.decide(&snapshot_with_gap(208.0)).unwrap();
        agent.finish_round(&snapshot_with_gap(100.0));
        assert!(agent.memory.is_empty());
    }

    #[test]
    fn test_train_waits_for_a_full_batch() {
        let mut agent = fixed_agent(TankId::ONE, encoder(), vec![1.0, 0.0, 0.0, 0.0], true);
        for i in 0..5 {
            agent.decide(&snapshot_with_gap(100.0 + i as f32 * 10.0)).unwrap();
        }
        assert_eq!(agent.memory.len(), 4);
        assert_eq!(agent.train(32, 0.2, 20).unwrap(), None);
        assert_eq!(agent.memory.len(), 4);
    }

    #[test]
    fn test_train_consumes_buffer() {
        let enc = encoder();
        let policy = MlpPolicy::new(enc.input_dim(), &[16], MOVEMENT_ACTIONS, 0.001, 9);
        let mut agent = Agent::new(TankId::ONE, Box::new(policy), enc, 4, true);
        for i in 0..6 {
            agent.decide(&snapshot_with_gap(100.0 + i as f32 * 30.0)).unwrap();
        }
        agent.finish_round(&snapshot_with_gap(50.0));
        assert_eq!(agent.memory.len(), 6);
        let loss = agent.train(4, 0.2, 3).unwrap();
        assert!(loss.is_some_and(f32::is_finite));
        assert!(agent.memory.is_empty());
    }
}
