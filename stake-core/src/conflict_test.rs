#[cfg(test)]
mod tests {
    use crate::conflict::{ConflictEngine, KeyView};
    use crate::error::{ConflictKind, StakeError};
    use crate::types::{Assignment, ClaimantId, ClaimantPayload, Lease, LeaseWrite, Resource, Student};

    const TTL: u64 = 600_000;

    fn payload(course_group: u8, team_number: u8) -> ClaimantPayload {
        ClaimantPayload {
            claimant: ClaimantId {
                course_group,
                team_number,
            },
            leader_name: "Ada".to_string(),
            leader_email: "ada@example.com".to_string(),
            leader_phone: "555-0100".to_string(),
            students: vec![Student {
                student_id: "s1".to_string(),
                student_name: "Sam".to_string(),
            }],
        }
    }

    fn view<'a>(
        resource: Option<&'a Resource>,
        assignment: Option<&'a Assignment>,
        lease: Option<&'a Lease>,
    ) -> KeyView<'a> {
        KeyView {
            key: "r1",
            resource,
            assignment,
            lease,
        }
    }

    fn conflict_kind(result: Result<impl std::fmt::Debug, StakeError>) -> ConflictKind {
        match result {
            Err(StakeError::Conflict { kind, .. }) => kind,
            other => panic!("Expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_acquire_free_resource() {
        let r = Resource::new("r1", "R1");
        let write = ConflictEngine::decide_acquire(&view(Some(&r), None, None), "tok_a", TTL, 1000)
            .unwrap();
        assert!(matches!(write, LeaseWrite::Acquired(_)));
        assert_eq!(write.lease().expires_at, 1000 + TTL);
        assert_eq!(write.lease().holder_token, "tok_a");
    }

    #[test]
    fn test_acquire_unknown_and_inactive() {
        let result = ConflictEngine::decide_acquire(&view(None, None, None), "tok_a", TTL, 0);
        assert!(matches!(result, Err(StakeError::NotFound(_))));

        let r = Resource::new("r1", "R1").inactive();
        let result = ConflictEngine::decide_acquire(&view(Some(&r), None, None), "tok_a", TTL, 0);
        assert!(matches!(result, Err(StakeError::Unavailable(_))));
    }

    #[test]
    fn test_acquire_same_token_renews_keeping_acquired_at() {
        let r = Resource::new("r1", "R1");
        let held = Lease::new("r1".into(), "tok_a".into(), TTL, 0);

        let write =
            ConflictEngine::decide_acquire(&view(Some(&r), None, Some(&held)), "tok_a", TTL, 30_000)
                .unwrap();

        assert!(write.is_renewal());
        assert_eq!(write.lease().acquired_at, 0);
        assert_eq!(write.lease().expires_at, 30_000 + TTL);
    }

    #[test]
    fn test_acquire_foreign_live_lease_is_rejected() {
        let r = Resource::new("r1", "R1");
        let held = Lease::new("r1".into(), "tok_a".into(), TTL, 0);

        let result =
            ConflictEngine::decide_acquire(&view(Some(&r), None, Some(&held)), "tok_b", TTL, 60_000);
        assert_eq!(conflict_kind(result), ConflictKind::ReservedByOther);
    }

    #[test]
    fn test_acquire_over_expired_lease() {
        let r = Resource::new("r1", "R1");
        let stale = Lease::new("r1".into(), "tok_a".into(), TTL, 0);

        // Expiry is inclusive: at exactly expires_at the lease is gone
        let write =
            ConflictEngine::decide_acquire(&view(Some(&r), None, Some(&stale)), "tok_b", TTL, TTL)
                .unwrap();
        assert!(matches!(write, LeaseWrite::Acquired(_)));
        assert_eq!(write.lease().holder_token, "tok_b");
    }

    #[test]
    fn test_acquire_assigned_resource() {
        let r = Resource::new("r1", "R1");
        let a = Assignment::new("r1".into(), "R1".into(), payload(1, 1), 0);

        let result = ConflictEngine::decide_acquire(&view(Some(&r), Some(&a), None), "tok_a", TTL, 0);
        assert_eq!(conflict_kind(result), ConflictKind::AlreadyAssigned);
    }

    #[test]
    fn test_commit_requires_live_matching_lease() {
        let r = Resource::new("r1", "R1");
        let held = Lease::new("r1".into(), "tok_a".into(), TTL, 0);
        let claimant = payload(1, 3).claimant;

        // No lease at all
        let result = ConflictEngine::check_commit(&view(Some(&r), None, None), "tok_a", claimant, None, 10);
        assert_eq!(conflict_kind(result), ConflictKind::ReservationMissing);

        // Foreign token
        let result =
            ConflictEngine::check_commit(&view(Some(&r), None, Some(&held)), "tok_x", claimant, None, 10);
        assert_eq!(conflict_kind(result), ConflictKind::ReservationMissing);

        // Expired
        let result =
            ConflictEngine::check_commit(&view(Some(&r), None, Some(&held)), "tok_a", claimant, None, TTL + 1);
        assert_eq!(conflict_kind(result), ConflictKind::ReservationMissing);

        // Live and matching
        assert!(
            ConflictEngine::check_commit(&view(Some(&r), None, Some(&held)), "tok_a", claimant, None, 10)
                .is_ok()
        );
    }

    #[test]
    fn test_commit_ledger_dominates_lease_check() {
        let r = Resource::new("r1", "R1");
        let a = Assignment::new("r1".into(), "R1".into(), payload(1, 1), 0);
        let claimant = payload(1, 2).claimant;

        let result = ConflictEngine::check_commit(&view(Some(&r), Some(&a), None), "tok_b", claimant, None, 10);
        assert_eq!(conflict_kind(result), ConflictKind::AlreadyAssigned);
    }

    #[test]
    fn test_commit_duplicate_claimant() {
        let r = Resource::new("r1", "R1");
        let held = Lease::new("r1".into(), "tok_a".into(), TTL, 0);
        let elsewhere = Assignment::new("r2".into(), "R2".into(), payload(2, 7), 0);

        let result = ConflictEngine::check_commit(
            &view(Some(&r), None, Some(&held)),
            "tok_a",
            payload(2, 7).claimant,
            Some(&elsewhere),
            10,
        );
        assert_eq!(conflict_kind(result), ConflictKind::DuplicateClaimant);
    }

    #[test]
    fn test_should_release() {
        let held = Lease::new("r1".into(), "tok_a".into(), TTL, 0);
        assert!(ConflictEngine::should_release(Some(&held), "tok_a", 10));
        assert!(!ConflictEngine::should_release(Some(&held), "tok_b", 10));
        assert!(!ConflictEngine::should_release(Some(&held), "tok_a", TTL));
        assert!(!ConflictEngine::should_release(None, "tok_a", 10));
    }
}
