#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use stake_core::api::{LeaseGrant, StatusReport};
    use stake_core::clock::ManualClock;
    use stake_core::config::StakeConfig;
    use stake_core::coordinator::Coordinator;
    use stake_core::error::{ConflictKind, StakeError};
    use stake_core::infrastructure_in_memory::InMemoryStore;
    use stake_core::state::ResourceState;
    use stake_core::types::{Assignment, ClaimantForm, Resource, Student};

    use crate::driver::HeartbeatDriver;
    use crate::error::{ClientError, Result};
    use crate::machine::HolderState;
    use crate::transport::{CoordinatorApi, LeaseApi};

    const HEARTBEAT: Duration = Duration::from_secs(30);

    fn setup() -> (Arc<Coordinator>, ManualClock) {
        let clock = ManualClock::new(0);
        let store = InMemoryStore::with_resources(Resource::catalog(3));
        let coord = Coordinator::with_store(Box::new(store), StakeConfig::default())
            .with_clock(Arc::new(clock.clone()));
        (Arc::new(coord), clock)
    }

    fn form(team_number: i64) -> ClaimantForm {
        ClaimantForm {
            course_group: Some(1),
            team_number: Some(team_number),
            leader_name: Some("Ada".to_string()),
            leader_email: Some("ada@example.com".to_string()),
            leader_phone: Some("555-0100".to_string()),
            students: vec![Student {
                student_id: "1001".to_string(),
                student_name: "Sam".to_string(),
            }],
        }
    }

    async fn transport_error() -> ClientError {
        let err = reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .unwrap_err();
        ClientError::Transport(err)
    }

    /// Wraps the in-process api and can make acquires fail without touching the store:
    /// unreachable, busy (store error) or never answering.
    struct FlakyApi {
        inner: CoordinatorApi,
        unreachable: AtomicBool,
        busy: AtomicBool,
        hanging: AtomicBool,
        acquires: AtomicUsize,
    }

    impl FlakyApi {
        fn new(coord: Arc<Coordinator>) -> Self {
            Self {
                inner: CoordinatorApi::new(coord),
                unreachable: AtomicBool::new(false),
                busy: AtomicBool::new(false),
                hanging: AtomicBool::new(false),
                acquires: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LeaseApi for FlakyApi {
        async fn acquire(&self, resource_key: &str, holder_token: Option<&str>) -> Result<LeaseGrant> {
            self.acquires.fetch_add(1, Ordering::SeqCst);
            if self.unreachable.load(Ordering::SeqCst) {
                return Err(transport_error().await);
            }
            if self.busy.load(Ordering::SeqCst) {
                return Err(StakeError::Store("database is locked".to_string()).into());
            }
            if self.hanging.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.inner.acquire(resource_key, holder_token).await
        }

        async fn release(&self, resource_key: &str, holder_token: &str) -> Result<bool> {
            self.inner.release(resource_key, holder_token).await
        }

        async fn commit(
            &self,
            resource_key: &str,
            holder_token: &str,
            form: &ClaimantForm,
        ) -> Result<Assignment> {
            self.inner.commit(resource_key, holder_token, form).await
        }

        async fn statuses(&self, holder_token: Option<&str>) -> Result<StatusReport> {
            self.inner.statuses(holder_token).await
        }
    }

    fn spawn(coord: &Arc<Coordinator>) -> HeartbeatDriver {
        HeartbeatDriver::spawn(Arc::new(CoordinatorApi::new(coord.clone())), HEARTBEAT)
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_renews_held_lease() {
        let (coord, clock) = setup();
        let driver = spawn(&coord);

        let grant = driver.select("drug-01", None).await.unwrap();
        assert_eq!(grant.expires_at, 600_000);

        let mut rx = driver.subscribe();
        clock.advance(30_000);
        tokio::time::advance(HEARTBEAT).await;

        let state = rx
            .wait_for(|s| s.is_held() && s.grant().is_some_and(|g| g.expires_at == 630_000))
            .await
            .unwrap()
            .clone();
        assert_eq!(state.grant().unwrap().holder_token, grant.holder_token);
        assert_eq!(coord.lease("drug-01").unwrap().unwrap().expires_at, 630_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_renewal_is_lost() {
        let (coord, clock) = setup();
        let driver = spawn(&coord);
        driver.select("drug-01", None).await.unwrap();

        // The lease lapses and someone else takes it before the next beat
        clock.set(601_000);
        coord.acquire("drug-01", Some("tok_holder_b")).unwrap();

        let mut rx = driver.subscribe();
        tokio::time::advance(HEARTBEAT).await;
        rx.wait_for(|s| matches!(s, HolderState::Lost { .. })).await.unwrap();

        assert!(coord.lease("drug-01").unwrap().unwrap().holder_token == "tok_holder_b");
        assert!(driver.commit(form(1)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_renewal_retries_next_beat() {
        let (coord, clock) = setup();
        let api = Arc::new(FlakyApi::new(coord.clone()));
        let driver = HeartbeatDriver::spawn(api.clone(), HEARTBEAT);
        driver.select("drug-01", None).await.unwrap();

        api.unreachable.store(true, Ordering::SeqCst);
        clock.advance(30_000);
        tokio::time::advance(HEARTBEAT).await;
        while api.acquires.load(Ordering::SeqCst) < 2 || !driver.state().is_held() {
            tokio::task::yield_now().await;
        }
        assert_eq!(driver.state().grant().unwrap().expires_at, 600_000);

        api.unreachable.store(false, Ordering::SeqCst);
        clock.advance(30_000);
        let mut rx = driver.subscribe();
        tokio::time::advance(HEARTBEAT).await;
        rx.wait_for(|s| s.grant().is_some_and(|g| g.expires_at == 660_000))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_error_on_renewal_keeps_lease() {
        let (coord, clock) = setup();
        let api = Arc::new(FlakyApi::new(coord.clone()));
        let driver = HeartbeatDriver::spawn(api.clone(), HEARTBEAT);
        let grant = driver.select("drug-01", None).await.unwrap();

        api.busy.store(true, Ordering::SeqCst);
        clock.advance(30_000);
        tokio::time::advance(HEARTBEAT).await;
        while api.acquires.load(Ordering::SeqCst) < 2 || !driver.state().is_held() {
            tokio::task::yield_now().await;
        }
        assert_eq!(driver.state().grant().unwrap().holder_token, grant.holder_token);
        let lease = coord.lease("drug-01").unwrap().unwrap();
        assert_eq!(lease.holder_token, grant.holder_token);

        api.busy.store(false, Ordering::SeqCst);
        let assignment = driver.commit(form(2)).await.unwrap();
        assert_eq!(assignment.resource_key, "drug-01");
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_server_times_out_and_keeps_serving() {
        let (coord, clock) = setup();
        let api = Arc::new(FlakyApi::new(coord.clone()));
        let driver = HeartbeatDriver::spawn(api.clone(), HEARTBEAT);
        driver.select("drug-01", None).await.unwrap();

        api.hanging.store(true, Ordering::SeqCst);
        clock.advance(30_000);
        tokio::time::advance(HEARTBEAT).await;
        // Past the per-call deadline but before the next beat
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(api.acquires.load(Ordering::SeqCst), 2);
        assert!(driver.state().is_held());
        assert_eq!(driver.state().grant().unwrap().expires_at, 600_000);

        driver.release().await;
        assert!(coord.lease("drug-01").unwrap().is_none());
        assert!(matches!(driver.state(), HolderState::Released { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_success() {
        let (coord, _clock) = setup();
        let driver = spawn(&coord);
        driver.select("drug-01", None).await.unwrap();

        let assignment = driver.commit(form(3)).await.unwrap();
        assert_eq!(assignment.resource_key, "drug-01");
        assert!(matches!(
            driver.state(),
            HolderState::Committed { assignment_id, .. } if assignment_id == assignment.id
        ));
        assert!(coord.lease("drug-01").unwrap().is_none());
        assert_eq!(coord.statuses(None).unwrap()[0].status, ResourceState::Assigned);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_claimant_keeps_holding() {
        let (coord, _clock) = setup();
        let other = coord.acquire("drug-02", None).unwrap();
        coord
            .commit("drug-02", Some(&other.holder_token), &form(5))
            .unwrap();

        let driver = spawn(&coord);
        driver.select("drug-01", None).await.unwrap();

        let err = driver.commit(form(5)).await.unwrap_err();
        assert_eq!(err.conflict_kind(), Some(ConflictKind::DuplicateClaimant));
        assert!(driver.state().is_held());

        let err = driver.commit(ClaimantForm::default()).await.unwrap_err();
        assert_eq!(err.reason(), Some("INVALID"));
        assert!(driver.state().is_held());

        assert!(driver.commit(form(6)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_after_expiry_is_lost() {
        let (coord, clock) = setup();
        let driver = spawn(&coord);
        driver.select("drug-01", None).await.unwrap();

        clock.set(600_000);
        let err = driver.commit(form(1)).await.unwrap_err();
        assert_eq!(err.conflict_kind(), Some(ConflictKind::ReservationMissing));
        assert!(matches!(driver.state(), HolderState::Lost { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_foreign_held_fails() {
        let (coord, _clock) = setup();
        coord.acquire("drug-01", Some("tok_holder_b")).unwrap();

        let driver = spawn(&coord);
        let err = driver.select("drug-01", None).await.unwrap_err();
        assert_eq!(err.conflict_kind(), Some(ConflictKind::ReservedByOther));
        assert_eq!(driver.state(), HolderState::Unheld);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_resumes_previous_token() {
        let (coord, _clock) = setup();
        coord.acquire("drug-01", Some("tok_resume_1")).unwrap();

        let driver = spawn(&coord);
        let grant = driver
            .select("drug-01", Some("tok_resume_1".to_string()))
            .await
            .unwrap();
        assert_eq!(grant.holder_token, "tok_resume_1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_resource_releases_previous() {
        let (coord, _clock) = setup();
        let driver = spawn(&coord);

        let first = driver.select("drug-01", None).await.unwrap();
        let again = driver.select("drug-01", None).await.unwrap();
        assert_eq!(first.holder_token, again.holder_token);

        driver.select("drug-02", None).await.unwrap();
        assert!(coord.lease("drug-01").unwrap().is_none());
        assert!(coord.lease("drug-02").unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_and_shutdown() {
        let (coord, _clock) = setup();
        let driver = spawn(&coord);
        driver.select("drug-01", None).await.unwrap();

        driver.release().await;
        assert!(coord.lease("drug-01").unwrap().is_none());
        assert!(matches!(driver.state(), HolderState::Released { .. }));

        driver.select("drug-02", None).await.unwrap();
        driver.shutdown().await;
        assert!(coord.lease("drug-02").unwrap().is_none());
    }
}
