//! End-to-end test of a realistic consumer: a mission-completion saga.
//!
//! The facade loads a mission execution, completes it, grants user (and,
//! for guild missions, guild) experience, updates the participant record,
//! refreshes stats and sends a notification. Experience and guild steps are
//! the compensable core; stats and notification are best-effort.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use saga_engine::{
    CompensationKey, SagaContext, SagaOrchestrator, SagaResult, SagaStatus, SagaStep, SagaStepExt,
    SagaStepResult,
};

const SAGA_TYPE: &str = "MissionCompletion";

const PREVIOUS_STATUS: CompensationKey<MissionStatus> =
    CompensationKey::new("mission.previous_status");
const GRANTED_EXP: CompensationKey<u64> = CompensationKey::new("user_exp.granted");
const GRANTED_GUILD_EXP: CompensationKey<u64> = CompensationKey::new("guild_exp.granted");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissionStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone)]
struct MissionRecord {
    guild_id: Option<Uuid>,
    exp_reward: u64,
    status: MissionStatus,
    claimed: bool,
}

#[derive(Debug, Default)]
struct PlatformInner {
    missions: HashMap<Uuid, MissionRecord>,
    user_exp: HashMap<Uuid, u64>,
    guild_exp: HashMap<Uuid, u64>,
    completions: HashMap<(Uuid, Uuid), u32>,
    stats_updates: u32,
    notifications: Vec<String>,
    /// Simulated optimistic-lock conflicts on the next exp grants.
    exp_conflicts_remaining: u32,
    fail_user_exp: bool,
    fail_stats: bool,
    calls: Vec<String>,
}

/// In-memory stand-in for the platform services the saga touches.
#[derive(Debug, Clone, Default)]
struct Platform {
    state: Arc<RwLock<PlatformInner>>,
}

impl Platform {
    fn new() -> Self {
        Self::default()
    }

    fn add_mission(&self, guild_id: Option<Uuid>, exp_reward: u64) -> Uuid {
        let mission_id = Uuid::new_v4();
        self.state.write().unwrap().missions.insert(
            mission_id,
            MissionRecord {
                guild_id,
                exp_reward,
                status: MissionStatus::InProgress,
                claimed: false,
            },
        );
        mission_id
    }

    fn set_fail_user_exp(&self, fail: bool) {
        self.state.write().unwrap().fail_user_exp = fail;
    }

    fn set_fail_stats(&self, fail: bool) {
        self.state.write().unwrap().fail_stats = fail;
    }

    fn set_exp_conflicts(&self, count: u32) {
        self.state.write().unwrap().exp_conflicts_remaining = count;
    }

    fn mission(&self, mission_id: Uuid) -> Option<MissionRecord> {
        self.state.read().unwrap().missions.get(&mission_id).cloned()
    }

    fn user_exp(&self, user_id: Uuid) -> u64 {
        *self.state.read().unwrap().user_exp.get(&user_id).unwrap_or(&0)
    }

    fn guild_exp(&self, guild_id: Uuid) -> u64 {
        *self.state.read().unwrap().guild_exp.get(&guild_id).unwrap_or(&0)
    }

    fn completions(&self, mission_id: Uuid, user_id: Uuid) -> u32 {
        *self
            .state
            .read()
            .unwrap()
            .completions
            .get(&(mission_id, user_id))
            .unwrap_or(&0)
    }

    fn stats_updates(&self) -> u32 {
        self.state.read().unwrap().stats_updates
    }

    fn notifications(&self) -> Vec<String> {
        self.state.read().unwrap().notifications.clone()
    }

    fn calls(&self) -> Vec<String> {
        self.state.read().unwrap().calls.clone()
    }

    fn record(&self, call: &str) {
        self.state.write().unwrap().calls.push(call.to_string());
    }
}

/// Saga-specific context state: inputs plus fields loaded along the way.
#[derive(Debug)]
struct MissionCompletionState {
    mission_id: Uuid,
    user_id: Uuid,
    guild_id: Option<Uuid>,
    guild_mission: bool,
    exp_reward: u64,
}

impl MissionCompletionState {
    fn new(mission_id: Uuid, user_id: Uuid) -> Self {
        Self {
            mission_id,
            user_id,
            guild_id: None,
            guild_mission: false,
            exp_reward: 0,
        }
    }
}

type Ctx = SagaContext<MissionCompletionState>;

struct LoadMission {
    platform: Platform,
}

#[async_trait]
impl SagaStep<MissionCompletionState> for LoadMission {
    fn name(&self) -> &str {
        "load_mission"
    }

    async fn execute(&self, ctx: &mut Ctx) -> SagaStepResult {
        self.platform.record("exec:load_mission");
        let mut state = self.platform.state.write().unwrap();
        let Some(mission) = state.missions.get_mut(&ctx.state.mission_id) else {
            return SagaStepResult::failure("mission not found");
        };
        if mission.status != MissionStatus::InProgress {
            return SagaStepResult::failure("mission is not in progress");
        }
        mission.claimed = true;
        ctx.state.guild_id = mission.guild_id;
        ctx.state.guild_mission = mission.guild_id.is_some();
        ctx.state.exp_reward = mission.exp_reward;
        SagaStepResult::success()
    }

    async fn compensate(&self, ctx: &mut Ctx) -> SagaStepResult {
        self.platform.record("comp:load_mission");
        let mut state = self.platform.state.write().unwrap();
        if let Some(mission) = state.missions.get_mut(&ctx.state.mission_id) {
            mission.claimed = false;
        }
        SagaStepResult::success()
    }
}

struct CompleteMission {
    platform: Platform,
}

#[async_trait]
impl SagaStep<MissionCompletionState> for CompleteMission {
    fn name(&self) -> &str {
        "complete_mission"
    }

    async fn execute(&self, ctx: &mut Ctx) -> SagaStepResult {
        self.platform.record("exec:complete_mission");
        let previous = {
            let mut state = self.platform.state.write().unwrap();
            let Some(mission) = state.missions.get_mut(&ctx.state.mission_id) else {
                return SagaStepResult::failure("mission disappeared mid-saga");
            };
            let previous = mission.status;
            mission.status = MissionStatus::Completed;
            previous
        };
        ctx.put_compensation(&PREVIOUS_STATUS, previous);
        SagaStepResult::success_with("mission execution completed")
    }

    async fn compensate(&self, ctx: &mut Ctx) -> SagaStepResult {
        self.platform.record("comp:complete_mission");
        let Some(previous) = ctx.take_compensation(&PREVIOUS_STATUS) else {
            return SagaStepResult::failure("previous mission status was not recorded");
        };
        let mut state = self.platform.state.write().unwrap();
        if let Some(mission) = state.missions.get_mut(&ctx.state.mission_id) {
            mission.status = previous;
        }
        SagaStepResult::success()
    }
}

struct GrantUserExp {
    platform: Platform,
}

#[async_trait]
impl SagaStep<MissionCompletionState> for GrantUserExp {
    fn name(&self) -> &str {
        "grant_user_exp"
    }

    // Retried to survive optimistic-lock conflicts on the experience row.
    fn max_retries(&self) -> u32 {
        2
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_millis(5)
    }

    async fn execute(&self, ctx: &mut Ctx) -> SagaStepResult {
        self.platform.record("exec:grant_user_exp");
        let mut state = self.platform.state.write().unwrap();
        if state.fail_user_exp {
            return SagaStepResult::failure("experience service unavailable");
        }
        if state.exp_conflicts_remaining > 0 {
            state.exp_conflicts_remaining -= 1;
            return SagaStepResult::failure("optimistic lock conflict on experience row");
        }
        let amount = ctx.state.exp_reward;
        *state.user_exp.entry(ctx.state.user_id).or_insert(0) += amount;
        drop(state);
        ctx.put_compensation(&GRANTED_EXP, amount);
        SagaStepResult::success_with(format!("granted {amount} exp"))
    }

    async fn compensate(&self, ctx: &mut Ctx) -> SagaStepResult {
        self.platform.record("comp:grant_user_exp");
        let Some(amount) = ctx.take_compensation(&GRANTED_EXP) else {
            return SagaStepResult::failure("granted amount was not recorded");
        };
        let mut state = self.platform.state.write().unwrap();
        if let Some(exp) = state.user_exp.get_mut(&ctx.state.user_id) {
            *exp = exp.saturating_sub(amount);
        }
        SagaStepResult::success()
    }
}

struct GrantGuildExp {
    platform: Platform,
}

#[async_trait]
impl SagaStep<MissionCompletionState> for GrantGuildExp {
    fn name(&self) -> &str {
        "grant_guild_exp"
    }

    async fn execute(&self, ctx: &mut Ctx) -> SagaStepResult {
        self.platform.record("exec:grant_guild_exp");
        let Some(guild_id) = ctx.state.guild_id else {
            return SagaStepResult::failure("mission has no guild");
        };
        // Guild share of the mission reward.
        let amount = ctx.state.exp_reward / 2;
        let mut state = self.platform.state.write().unwrap();
        *state.guild_exp.entry(guild_id).or_insert(0) += amount;
        drop(state);
        ctx.put_compensation(&GRANTED_GUILD_EXP, amount);
        SagaStepResult::success()
    }

    async fn compensate(&self, ctx: &mut Ctx) -> SagaStepResult {
        self.platform.record("comp:grant_guild_exp");
        let (Some(guild_id), Some(amount)) = (
            ctx.state.guild_id,
            ctx.take_compensation(&GRANTED_GUILD_EXP),
        ) else {
            return SagaStepResult::failure("guild grant was not recorded");
        };
        let mut state = self.platform.state.write().unwrap();
        if let Some(exp) = state.guild_exp.get_mut(&guild_id) {
            *exp = exp.saturating_sub(amount);
        }
        SagaStepResult::success()
    }
}

struct UpdateParticipant {
    platform: Platform,
}

#[async_trait]
impl SagaStep<MissionCompletionState> for UpdateParticipant {
    fn name(&self) -> &str {
        "update_participant"
    }

    async fn execute(&self, ctx: &mut Ctx) -> SagaStepResult {
        self.platform.record("exec:update_participant");
        let mut state = self.platform.state.write().unwrap();
        *state
            .completions
            .entry((ctx.state.mission_id, ctx.state.user_id))
            .or_insert(0) += 1;
        SagaStepResult::success()
    }

    async fn compensate(&self, ctx: &mut Ctx) -> SagaStepResult {
        self.platform.record("comp:update_participant");
        let mut state = self.platform.state.write().unwrap();
        if let Some(count) = state
            .completions
            .get_mut(&(ctx.state.mission_id, ctx.state.user_id))
        {
            *count = count.saturating_sub(1);
        }
        SagaStepResult::success()
    }
}

struct UpdateStats {
    platform: Platform,
}

#[async_trait]
impl SagaStep<MissionCompletionState> for UpdateStats {
    fn name(&self) -> &str {
        "update_stats"
    }

    fn is_mandatory(&self) -> bool {
        false
    }

    async fn execute(&self, _ctx: &mut Ctx) -> SagaStepResult {
        self.platform.record("exec:update_stats");
        let mut state = self.platform.state.write().unwrap();
        if state.fail_stats {
            return SagaStepResult::failure("stats service timed out");
        }
        state.stats_updates += 1;
        SagaStepResult::success()
    }
}

struct Notify {
    platform: Platform,
}

#[async_trait]
impl SagaStep<MissionCompletionState> for Notify {
    fn name(&self) -> &str {
        "notify"
    }

    fn is_mandatory(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Ctx) -> SagaStepResult {
        self.platform.record("exec:notify");
        let mut state = self.platform.state.write().unwrap();
        state
            .notifications
            .push(format!("mission completed by {}", ctx.state.user_id));
        SagaStepResult::success()
    }
}

/// The saga-specific facade the rest of the platform calls.
struct MissionCompletionSaga {
    platform: Platform,
}

impl MissionCompletionSaga {
    fn new(platform: Platform) -> Self {
        Self { platform }
    }

    async fn run(&self, mission_id: Uuid, user_id: Uuid) -> SagaResult<MissionCompletionState> {
        let platform = &self.platform;
        let orchestrator = SagaOrchestrator::new()
            .add_step(LoadMission {
                platform: platform.clone(),
            })
            .add_step(CompleteMission {
                platform: platform.clone(),
            })
            .add_step(GrantUserExp {
                platform: platform.clone(),
            })
            .add_step(
                GrantGuildExp {
                    platform: platform.clone(),
                }
                .when(|ctx: &Ctx| ctx.state.guild_mission),
            )
            .add_step(UpdateParticipant {
                platform: platform.clone(),
            })
            .add_step(UpdateStats {
                platform: platform.clone(),
            })
            .add_step(Notify {
                platform: platform.clone(),
            });

        let ctx = SagaContext::with_executor(
            SAGA_TYPE,
            user_id.to_string(),
            MissionCompletionState::new(mission_id, user_id),
        );
        orchestrator.execute(ctx).await
    }
}

#[tokio::test]
async fn test_solo_mission_happy_path() {
    let platform = Platform::new();
    let mission_id = platform.add_mission(None, 150);
    let user_id = Uuid::new_v4();

    let saga = MissionCompletionSaga::new(platform.clone());
    let result = saga.run(mission_id, user_id).await;

    assert!(result.is_success());
    assert_eq!(result.status(), SagaStatus::Completed);

    // The guild step never ran for a solo mission.
    assert!(!platform.calls().contains(&"exec:grant_guild_exp".to_string()));
    assert!(result.context().step_result("grant_guild_exp").is_none());

    assert_eq!(platform.user_exp(user_id), 150);
    assert_eq!(platform.completions(mission_id, user_id), 1);
    assert_eq!(platform.stats_updates(), 1);
    assert_eq!(platform.notifications().len(), 1);
    assert_eq!(
        platform.mission(mission_id).unwrap().status,
        MissionStatus::Completed
    );
}

#[tokio::test]
async fn test_guild_mission_grants_guild_exp() {
    let platform = Platform::new();
    let guild_id = Uuid::new_v4();
    let mission_id = platform.add_mission(Some(guild_id), 200);
    let user_id = Uuid::new_v4();

    let saga = MissionCompletionSaga::new(platform.clone());
    let result = saga.run(mission_id, user_id).await;

    assert!(result.is_success());
    assert_eq!(platform.user_exp(user_id), 200);
    assert_eq!(platform.guild_exp(guild_id), 100);
    assert!(result.context().step_result("grant_guild_exp").unwrap().is_success());
}

#[tokio::test]
async fn test_exp_failure_rolls_back_completion_and_load() {
    let platform = Platform::new();
    let mission_id = platform.add_mission(None, 150);
    let user_id = Uuid::new_v4();
    platform.set_fail_user_exp(true);

    let saga = MissionCompletionSaga::new(platform.clone());
    let result = saga.run(mission_id, user_id).await;

    assert!(!result.is_success());
    assert!(result.is_compensated());
    assert_eq!(result.status(), SagaStatus::Compensated);
    assert!(result.message().unwrap().contains("experience service unavailable"));

    // Compensation runs strictly in reverse of successful execution, and the
    // steps after the failure never start.
    let calls = platform.calls();
    assert_eq!(
        calls,
        vec![
            "exec:load_mission",
            "exec:complete_mission",
            "exec:grant_user_exp",
            "exec:grant_user_exp",
            "exec:grant_user_exp",
            "comp:complete_mission",
            "comp:load_mission",
        ]
    );

    // The mission is back in progress and unclaimed; nothing was granted.
    let mission = platform.mission(mission_id).unwrap();
    assert_eq!(mission.status, MissionStatus::InProgress);
    assert!(!mission.claimed);
    assert_eq!(platform.user_exp(user_id), 0);
    assert_eq!(platform.completions(mission_id, user_id), 0);
    assert_eq!(platform.stats_updates(), 0);
    assert!(platform.notifications().is_empty());
}

#[tokio::test]
async fn test_load_failure_compensates_nothing() {
    let platform = Platform::new();
    let user_id = Uuid::new_v4();

    let saga = MissionCompletionSaga::new(platform.clone());
    let result = saga.run(Uuid::new_v4(), user_id).await;

    assert!(!result.is_success());
    assert_eq!(result.status(), SagaStatus::Compensated);
    assert_eq!(result.message(), Some("mission not found"));
    assert_eq!(platform.calls(), vec!["exec:load_mission"]);
}

#[tokio::test]
async fn test_optimistic_lock_conflict_is_retried() {
    let platform = Platform::new();
    let mission_id = platform.add_mission(None, 150);
    let user_id = Uuid::new_v4();
    platform.set_exp_conflicts(1);

    let saga = MissionCompletionSaga::new(platform.clone());
    let result = saga.run(mission_id, user_id).await;

    assert!(result.is_success());
    // Two attempts, one grant.
    assert_eq!(
        platform
            .calls()
            .iter()
            .filter(|call| call.as_str() == "exec:grant_user_exp")
            .count(),
        2
    );
    assert_eq!(platform.user_exp(user_id), 150);
}

#[tokio::test]
async fn test_optional_stats_failure_does_not_abort() {
    let platform = Platform::new();
    let mission_id = platform.add_mission(None, 150);
    let user_id = Uuid::new_v4();
    platform.set_fail_stats(true);

    let saga = MissionCompletionSaga::new(platform.clone());
    let result = saga.run(mission_id, user_id).await;

    assert!(result.is_success());
    assert_eq!(result.status(), SagaStatus::Completed);
    assert_eq!(platform.stats_updates(), 0);
    // The notification step after the failed optional step still ran.
    assert_eq!(platform.notifications().len(), 1);
    assert!(result.context().step_result("update_stats").unwrap().is_failure());
}

#[tokio::test]
async fn test_executor_attribution_survives_the_run() {
    let platform = Platform::new();
    let mission_id = platform.add_mission(None, 10);
    let user_id = Uuid::new_v4();

    let saga = MissionCompletionSaga::new(platform.clone());
    let result = saga.run(mission_id, user_id).await;

    assert_eq!(
        result.context().executor_id(),
        Some(user_id.to_string().as_str())
    );
    assert_eq!(result.context().saga_type(), SAGA_TYPE);
}
