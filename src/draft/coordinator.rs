// Draft coordinator: lifecycle orchestration for a league's draft.
//
// State machine over Draft.status: pending -> in_progress -> completed,
// with pending|in_progress -> cancelled as the commissioner's exceptional
// exit. The atomic commits live in the persistence layer; this module owns
// permission checks, turn validation context, the pick clock, and event
// emission. A failed operation only fails that one request — the draft
// stays in its previously committed state.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{Database, PickCommit};
use crate::draft::clock::PickClocks;
use crate::error::CoreError;
use crate::events::{Event, EventBus};
use crate::model::{Draft, DraftPick, DraftStatus, League, LeagueDraftStatus};

/// Read-only draft snapshot returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct DraftStateView {
    pub draft_id: String,
    pub status: DraftStatus,
    pub current_pick: u32,
    pub total_picks: u32,
    pub paused: bool,
    pub on_clock_team: Option<String>,
    pub clock_deadline: Option<DateTime<Utc>>,
}

/// Result of removing a team from a league pre-draft.
#[derive(Debug, Clone, Serialize)]
pub struct RemovedTeam {
    pub team_id: String,
    pub league_id: String,
    pub current_teams: u32,
}

pub struct DraftCoordinator {
    db: Arc<Database>,
    events: EventBus,
    clocks: PickClocks,
    /// Handle the spawned clock tasks use to call back into the
    /// coordinator; upgrade fails once the coordinator is dropped.
    self_ref: Weak<DraftCoordinator>,
}

impl DraftCoordinator {
    pub fn new(db: Arc<Database>, events: EventBus) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| DraftCoordinator {
            db,
            events,
            clocks: PickClocks::new(),
            self_ref: self_ref.clone(),
        })
    }

    /// Schedule a draft for a league. Commissioner-only; the league must be
    /// pre-draft and cannot already have a draft.
    pub fn schedule_draft(
        &self,
        league_id: &str,
        rounds: u32,
        pick_time_limit: Option<u32>,
        actor: &str,
    ) -> Result<Draft, CoreError> {
        let league = self.require_commissioner(league_id, actor)?;
        if league.draft_status != LeagueDraftStatus::Pending {
            return Err(CoreError::InvalidState(format!(
                "league {league_id} draft is {}",
                league.draft_status.as_str()
            )));
        }
        if rounds == 0 {
            return Err(CoreError::InvalidState(
                "draft needs at least one round".into(),
            ));
        }
        if league.current_teams == 0 {
            return Err(CoreError::InvalidState(format!(
                "league {league_id} has no teams"
            )));
        }
        let draft = Draft {
            id: Database::generate_draft_id(),
            league_id: league_id.to_string(),
            status: DraftStatus::Pending,
            current_pick: 1,
            total_picks: league.current_teams * rounds,
            rounds,
            pick_time_limit,
            draft_order: None,
            paused: false,
            clock_deadline: None,
            started_at: None,
            completed_at: None,
        };
        self.db.insert_draft(&draft)?;
        info!(
            "scheduled draft {} for league {league_id} ({} rounds, {} picks)",
            draft.id, rounds, draft.total_picks
        );
        Ok(draft)
    }

    /// Start a pending draft: snapshot the order from team seats, arm the
    /// pick clock when a time limit is configured.
    pub fn start_draft(&self, draft_id: &str, actor: &str) -> Result<Draft, CoreError> {
        let draft = self.db.get_draft(draft_id)?;
        self.require_commissioner(&draft.league_id, actor)?;
        if draft.status != DraftStatus::Pending {
            return Err(CoreError::InvalidState(format!(
                "draft {draft_id} is {}, not pending",
                draft.status.as_str()
            )));
        }
        let teams = self.db.list_league_teams(&draft.league_id)?;
        if teams.is_empty() {
            return Err(CoreError::InvalidState(format!(
                "league {} has no teams to draft",
                draft.league_id
            )));
        }
        // list_league_teams sorts by draft_position, so the order falls out
        // directly once every team is seated.
        let mut order = Vec::with_capacity(teams.len());
        for team in &teams {
            if team.draft_position.is_none() {
                return Err(CoreError::InvalidState(format!(
                    "team {} has no draft position",
                    team.id
                )));
            }
            order.push(team.id.clone());
        }
        let mut started = self.db.start_draft_commit(draft_id, &order, Utc::now())?;
        if let Some(limit) = started.pick_time_limit {
            started.clock_deadline = Some(self.arm_clock(draft_id, 1, limit)?);
        }
        let on_clock = started
            .on_clock_team()
            .map(str::to_string)
            .ok_or_else(|| CoreError::InvalidState("draft started with empty order".into()))?;
        info!("draft {draft_id} started with {} teams", order.len());
        self.events.emit(Event::DraftStarted {
            draft_id: started.id.clone(),
            league_id: started.league_id.clone(),
            on_clock_team: on_clock,
            clock_deadline: started.clock_deadline,
        });
        Ok(started)
    }

    /// Submit a pick on behalf of the team on the clock.
    pub fn submit_pick(
        &self,
        draft_id: &str,
        team_id: &str,
        player_id: &str,
    ) -> Result<DraftPick, CoreError> {
        let player = self.db.get_player(player_id)?;
        let draft = self.db.get_draft(draft_id)?;
        let league = self.db.get_league(&draft.league_id)?;
        if player.sport != league.sport {
            return Err(CoreError::InvalidState(format!(
                "player {player_id} is a {} player; league {} plays {}",
                player.sport.as_str(),
                league.id,
                league.sport.as_str()
            )));
        }
        // Advisory only; custom league positions are tolerated.
        league.sport.check_position(&player.position);

        let commit = self.db.commit_submitted_pick(draft_id, team_id, player_id)?;
        self.after_pick_commit(draft_id, &commit);
        Ok(commit.pick)
    }

    /// Autopick for `expected_pick`, fired by the clock. Idempotent: a
    /// duplicate firing, a pause, or a lost commit race all return Ok(None).
    pub fn autopick(
        &self,
        draft_id: &str,
        expected_pick: u32,
    ) -> Result<Option<DraftPick>, CoreError> {
        let commit = match self.db.commit_autopick(draft_id, expected_pick) {
            Ok(Some(commit)) => commit,
            Ok(None) => return Ok(None),
            // Losing the conditioned commit means a legitimate pick beat the
            // timer; that is the no-op path, not an error, and never retried.
            Err(CoreError::StaleWrite(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        info!(
            "autopick: draft {draft_id} pick {} assigned player {} to team {}",
            commit.pick.pick_number, commit.pick.player_id, commit.pick.team_id
        );
        self.after_pick_commit(draft_id, &commit);
        Ok(Some(commit.pick))
    }

    /// Freeze the pick clock without touching the pick counter.
    pub fn pause_draft(&self, draft_id: &str, actor: &str) -> Result<Draft, CoreError> {
        let draft = self.db.get_draft(draft_id)?;
        self.require_commissioner(&draft.league_id, actor)?;
        let draft = self.db.set_paused(draft_id, true)?;
        self.clocks.disarm(draft_id);
        info!("draft {draft_id} paused at pick {}", draft.current_pick);
        self.events.emit(Event::DraftPaused {
            draft_id: draft_id.to_string(),
        });
        Ok(draft)
    }

    /// Unfreeze the draft. The clock restarts with a fresh full-length
    /// countdown — the pre-pause remainder is discarded.
    pub fn resume_draft(&self, draft_id: &str, actor: &str) -> Result<Draft, CoreError> {
        let draft = self.db.get_draft(draft_id)?;
        self.require_commissioner(&draft.league_id, actor)?;
        let mut draft = self.db.set_paused(draft_id, false)?;
        if let Some(limit) = draft.pick_time_limit {
            draft.clock_deadline = Some(self.arm_clock(draft_id, draft.current_pick, limit)?);
        }
        info!("draft {draft_id} resumed at pick {}", draft.current_pick);
        self.events.emit(Event::DraftResumed {
            draft_id: draft_id.to_string(),
            clock_deadline: draft.clock_deadline,
        });
        Ok(draft)
    }

    /// Remove a team from the league. Only legal while the league is
    /// pre-draft, so an order snapshot can never lose a member mid-draft.
    pub fn remove_team(
        &self,
        draft_id: &str,
        team_id: &str,
        actor: &str,
    ) -> Result<RemovedTeam, CoreError> {
        let draft = self.db.get_draft(draft_id)?;
        let league = self.require_commissioner(&draft.league_id, actor)?;
        if league.draft_status != LeagueDraftStatus::Pending {
            return Err(CoreError::InvalidState(format!(
                "league {} draft is {}; teams can only be removed pre-draft",
                league.id,
                league.draft_status.as_str()
            )));
        }
        let team = self.db.get_team(team_id)?;
        if team.league_id != league.id {
            return Err(CoreError::InvalidState(format!(
                "team {team_id} does not belong to league {}",
                league.id
            )));
        }
        let current_teams = self.db.remove_team_commit(&league.id, team_id)?;
        info!(
            "removed team {team_id} from league {} ({current_teams} teams remain)",
            league.id
        );
        Ok(RemovedTeam {
            team_id: team_id.to_string(),
            league_id: league.id,
            current_teams,
        })
    }

    /// Cancel a pending or in-progress draft, reverting every availability
    /// flip its picks made.
    pub fn cancel_draft(&self, draft_id: &str, actor: &str) -> Result<Draft, CoreError> {
        let draft = self.db.get_draft(draft_id)?;
        self.require_commissioner(&draft.league_id, actor)?;
        let draft = self.db.cancel_draft_commit(draft_id)?;
        self.clocks.disarm(draft_id);
        info!("draft {draft_id} cancelled");
        self.events.emit(Event::DraftCancelled {
            draft_id: draft_id.to_string(),
        });
        Ok(draft)
    }

    /// Read-only snapshot for clients.
    pub fn draft_state(&self, draft_id: &str) -> Result<DraftStateView, CoreError> {
        let draft = self.db.get_draft(draft_id)?;
        Ok(DraftStateView {
            draft_id: draft.id.clone(),
            status: draft.status,
            current_pick: draft.current_pick,
            total_picks: draft.total_picks,
            paused: draft.paused,
            on_clock_team: draft.on_clock_team().map(str::to_string),
            clock_deadline: draft.clock_deadline,
        })
    }

    /// Re-arm clocks for drafts that were mid-flight at the last shutdown.
    /// Each gets a fresh full-length countdown (same policy as resume).
    pub fn recover_clocks(&self) -> Result<usize, CoreError> {
        let mut armed = 0;
        for draft in self.db.in_progress_drafts()? {
            if draft.paused {
                continue;
            }
            if let Some(limit) = draft.pick_time_limit {
                self.arm_clock(&draft.id, draft.current_pick, limit)?;
                armed += 1;
            }
        }
        if armed > 0 {
            info!("re-armed {armed} pick clock(s) after restart");
        }
        Ok(armed)
    }

    /// Shared tail of submit and autopick: clock upkeep and notification.
    fn after_pick_commit(&self, draft_id: &str, commit: &PickCommit) {
        let mut deadline = None;
        if commit.completed {
            self.clocks.disarm(draft_id);
            info!(
                "draft {draft_id} completed at pick {}",
                commit.pick.pick_number
            );
        } else if let Some(limit) = commit.pick_time_limit {
            match self.arm_clock(draft_id, commit.pick.pick_number + 1, limit) {
                Ok(d) => deadline = Some(d),
                Err(e) => warn!("failed to record clock deadline for draft {draft_id}: {e}"),
            }
        }
        self.events.emit(Event::DraftAdvanced {
            draft_id: draft_id.to_string(),
            pick: commit.pick.clone(),
            next_team: commit.next_team.clone(),
            clock_deadline: deadline,
            completed: commit.completed,
        });
    }

    fn require_commissioner(&self, league_id: &str, actor: &str) -> Result<League, CoreError> {
        let league = self.db.get_league(league_id)?;
        if league.commissioner != actor {
            return Err(CoreError::PermissionDenied(format!(
                "user {actor} is not the commissioner of league {league_id}"
            )));
        }
        Ok(league)
    }

    /// Persist the deadline and schedule the expiry task. The task is bound
    /// to (draft_id, pick); a stale firing re-checks live state before
    /// committing anything.
    fn arm_clock(
        &self,
        draft_id: &str,
        pick: u32,
        limit_secs: u32,
    ) -> Result<DateTime<Utc>, CoreError> {
        let deadline = Utc::now() + chrono::Duration::seconds(i64::from(limit_secs));
        self.db.set_clock_deadline(draft_id, Some(deadline))?;
        let Some(this) = self.self_ref.upgrade() else {
            // Coordinator is being torn down; nothing left to fire for.
            return Ok(deadline);
        };
        let id = draft_id.to_string();
        self.clocks.arm(
            draft_id,
            pick,
            Duration::from_secs(u64::from(limit_secs)),
            async move {
                match this.autopick(&id, pick) {
                    Ok(Some(_)) => {}
                    Ok(None) => {}
                    Err(e) => warn!("autopick failed for draft {id} pick {pick}: {e}"),
                }
            },
        );
        Ok(deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Player, Sport, Team};

    fn test_db() -> Arc<Database> {
        Arc::new(Database::open(":memory:").expect("in-memory database should open"))
    }

    fn seed_league(db: &Database, team_ids: &[&str]) {
        db.create_league(&League {
            id: "lg1".into(),
            name: "Test League".into(),
            sport: Sport::Baseball,
            commissioner: "commish".into(),
            max_teams: 8,
            current_teams: 0,
            draft_status: LeagueDraftStatus::Pending,
        })
        .unwrap();
        for (i, id) in team_ids.iter().enumerate() {
            db.add_team(&Team {
                id: id.to_string(),
                league_id: "lg1".into(),
                owner: format!("owner_{id}"),
                name: format!("Team {id}"),
                draft_position: Some(i as u32 + 1),
            })
            .unwrap();
        }
        for i in 1..=12u32 {
            db.upsert_player(&Player {
                id: format!("p{i:02}"),
                name: format!("Player {i}"),
                sport: Sport::Baseball,
                position: "SS".into(),
                rank: i,
                is_available: true,
            })
            .unwrap();
        }
    }

    /// League + coordinator with a started 2-round draft over 4 teams.
    fn started(limit: Option<u32>) -> (Arc<Database>, Arc<DraftCoordinator>, String) {
        let db = test_db();
        seed_league(&db, &["team_a", "team_b", "team_c", "team_d"]);
        let coordinator = DraftCoordinator::new(Arc::clone(&db), EventBus::new(64));
        let draft = coordinator
            .schedule_draft("lg1", 2, limit, "commish")
            .unwrap();
        let started = coordinator.start_draft(&draft.id, "commish").unwrap();
        (db, coordinator, started.id)
    }

    #[test]
    fn schedule_requires_commissioner() {
        let db = test_db();
        seed_league(&db, &["team_a"]);
        let coordinator = DraftCoordinator::new(db, EventBus::new(8));
        let err = coordinator
            .schedule_draft("lg1", 2, None, "random_user")
            .unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied(_)));
    }

    #[test]
    fn start_requires_commissioner_and_pending() {
        let (_db, coordinator, draft_id) = started(None);
        let err = coordinator.start_draft(&draft_id, "commish").unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        let err = coordinator.start_draft(&draft_id, "intruder").unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied(_)));
    }

    #[test]
    fn start_requires_every_team_seated() {
        let db = test_db();
        seed_league(&db, &["team_a", "team_b"]);
        db.set_draft_position("team_b", None).unwrap();
        let coordinator = DraftCoordinator::new(db, EventBus::new(8));
        let draft = coordinator
            .schedule_draft("lg1", 1, None, "commish")
            .unwrap();
        let err = coordinator.start_draft(&draft.id, "commish").unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn full_draft_runs_snake_order_and_completes() {
        let (db, coordinator, draft_id) = started(None);
        let mut events = coordinator.events.subscribe();

        let expected = [
            "team_a", "team_b", "team_c", "team_d", "team_d", "team_c", "team_b", "team_a",
        ];
        for (i, team) in expected.iter().enumerate() {
            let view = coordinator.draft_state(&draft_id).unwrap();
            assert_eq!(view.on_clock_team.as_deref(), Some(*team));
            coordinator
                .submit_pick(&draft_id, team, &format!("p{:02}", i + 1))
                .unwrap();
        }

        let view = coordinator.draft_state(&draft_id).unwrap();
        assert_eq!(view.status, DraftStatus::Completed);
        assert_eq!(view.on_clock_team, None);
        assert_eq!(db.picks_for_draft(&draft_id).unwrap().len(), 8);

        // One DraftAdvanced event per pick; the last is flagged completed.
        let mut advanced = 0;
        let mut completed_flag = false;
        while let Ok(event) = events.try_recv() {
            if let Event::DraftAdvanced { completed, .. } = event {
                advanced += 1;
                completed_flag = completed;
            }
        }
        assert_eq!(advanced, 8);
        assert!(completed_flag);
    }

    #[test]
    fn submit_out_of_turn_is_rejected() {
        let (_db, coordinator, draft_id) = started(None);
        let err = coordinator
            .submit_pick(&draft_id, "team_c", "p01")
            .unwrap_err();
        assert!(matches!(err, CoreError::NotYourTurn { .. }));
    }

    #[test]
    fn submit_wrong_sport_player_is_rejected() {
        let (db, coordinator, draft_id) = started(None);
        db.upsert_player(&Player {
            id: "qb_1".into(),
            name: "Some Quarterback".into(),
            sport: Sport::Football,
            position: "QB".into(),
            rank: 1,
            is_available: true,
        })
        .unwrap();
        let err = coordinator
            .submit_pick(&draft_id, "team_a", "qb_1")
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn drafted_player_cannot_be_drafted_again() {
        let (_db, coordinator, draft_id) = started(None);
        coordinator.submit_pick(&draft_id, "team_a", "p01").unwrap();
        let err = coordinator
            .submit_pick(&draft_id, "team_b", "p01")
            .unwrap_err();
        assert!(matches!(err, CoreError::PlayerUnavailable(_)));
    }

    #[tokio::test]
    async fn autopick_is_idempotent() {
        let (db, coordinator, draft_id) = started(None);
        let first = coordinator.autopick(&draft_id, 1).unwrap();
        assert!(first.is_some());
        // p01 has the best rank of the seeded pool.
        assert_eq!(first.unwrap().player_id, "p01");

        let second = coordinator.autopick(&draft_id, 1).unwrap();
        assert!(second.is_none());
        assert_eq!(db.picks_for_draft(&draft_id).unwrap().len(), 1);
    }

    #[test]
    fn pause_blocks_picks_and_resume_restores() {
        let (_db, coordinator, draft_id) = started(None);
        let err = coordinator.pause_draft(&draft_id, "nobody").unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied(_)));

        let draft = coordinator.pause_draft(&draft_id, "commish").unwrap();
        assert!(draft.paused);
        assert_eq!(draft.current_pick, 1);

        let err = coordinator
            .submit_pick(&draft_id, "team_a", "p01")
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));

        coordinator.resume_draft(&draft_id, "commish").unwrap();
        coordinator.submit_pick(&draft_id, "team_a", "p01").unwrap();
    }

    #[test]
    fn remove_team_only_pre_draft() {
        let db = test_db();
        seed_league(&db, &["team_a", "team_b", "team_c"]);
        let coordinator = DraftCoordinator::new(Arc::clone(&db), EventBus::new(8));
        let draft = coordinator
            .schedule_draft("lg1", 2, None, "commish")
            .unwrap();

        let removed = coordinator
            .remove_team(&draft.id, "team_b", "commish")
            .unwrap();
        assert_eq!(removed.current_teams, 2);
        assert_eq!(removed.league_id, "lg1");

        coordinator.start_draft(&draft.id, "commish").unwrap();
        let err = coordinator
            .remove_team(&draft.id, "team_c", "commish")
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        assert_eq!(db.get_league("lg1").unwrap().current_teams, 2);
    }

    #[test]
    fn cancel_draft_reverts_picks() {
        let (db, coordinator, draft_id) = started(None);
        coordinator.submit_pick(&draft_id, "team_a", "p01").unwrap();

        let err = coordinator.cancel_draft(&draft_id, "nobody").unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied(_)));

        let draft = coordinator.cancel_draft(&draft_id, "commish").unwrap();
        assert_eq!(draft.status, DraftStatus::Cancelled);
        assert!(db.get_player("p01").unwrap().is_available);
        assert!(db.team_roster("team_a").unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clock_expiry_autopicks_and_advances() {
        let (db, coordinator, draft_id) = started(Some(30));
        let view = coordinator.draft_state(&draft_id).unwrap();
        assert!(view.clock_deadline.is_some());

        tokio::time::sleep(Duration::from_secs(31)).await;

        let view = coordinator.draft_state(&draft_id).unwrap();
        assert_eq!(view.current_pick, 2);
        assert_eq!(view.on_clock_team.as_deref(), Some("team_b"));
        let picks = db.picks_for_draft(&draft_id).unwrap();
        assert_eq!(picks.len(), 1);
        assert!(picks[0].auto);
        assert_eq!(picks[0].player_id, "p01");
    }

    #[tokio::test(start_paused = true)]
    async fn submitted_pick_rearms_clock_for_next_team() {
        let (db, coordinator, draft_id) = started(Some(30));

        tokio::time::sleep(Duration::from_secs(20)).await;
        coordinator.submit_pick(&draft_id, "team_a", "p05").unwrap();

        // The old pick-1 timer must not fire at t=30; the fresh pick-2
        // timer fires at t=50.
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(db.picks_for_draft(&draft_id).unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        let picks = db.picks_for_draft(&draft_id).unwrap();
        assert_eq!(picks.len(), 2);
        assert_eq!(picks[1].team_id, "team_b");
        assert!(picks[1].auto);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_clock_and_resume_rearms_full_duration() {
        let (db, coordinator, draft_id) = started(Some(30));

        tokio::time::sleep(Duration::from_secs(20)).await;
        coordinator.pause_draft(&draft_id, "commish").unwrap();

        // Well past the original deadline: nothing fires while paused.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(db.picks_for_draft(&draft_id).unwrap().is_empty());

        coordinator.resume_draft(&draft_id, "commish").unwrap();
        // Fresh full countdown, not the 10s remainder.
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(db.picks_for_draft(&draft_id).unwrap().is_empty());
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(db.picks_for_draft(&draft_id).unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recover_clocks_rearms_in_progress_drafts() {
        let (db, coordinator, draft_id) = started(Some(30));
        // Simulate a restart: drop the coordinator's clocks by building a
        // fresh coordinator over the same database.
        coordinator.clocks.disarm(&draft_id);
        let fresh = DraftCoordinator::new(Arc::clone(&db), EventBus::new(8));
        assert_eq!(fresh.recover_clocks().unwrap(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(db.picks_for_draft(&draft_id).unwrap().len(), 1);
    }
}
