#[cfg(test)]
mod tests {
    use crate::error::StakeError;
    use crate::types::*;

    fn form() -> ClaimantForm {
        ClaimantForm {
            course_group: Some(2),
            team_number: Some(7),
            leader_name: Some("  Ada Lovelace ".to_string()),
            leader_email: Some("Ada@Example.com".to_string()),
            leader_phone: Some("555-0100".to_string()),
            students: vec![
                Student {
                    student_id: " 1001 ".to_string(),
                    student_name: "Sam".to_string(),
                },
                Student {
                    student_id: "".to_string(),
                    student_name: "dropped".to_string(),
                },
            ],
        }
    }

    fn invalid_message(result: crate::error::Result<ClaimantPayload>) -> String {
        match result {
            Err(StakeError::Invalid(msg)) => msg,
            other => panic!("Expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_form_validates_and_cleans() {
        let payload = form().validate().unwrap();
        assert_eq!(payload.claimant, ClaimantId { course_group: 2, team_number: 7 });
        assert_eq!(payload.leader_name, "Ada Lovelace");
        assert_eq!(payload.leader_email, "ada@example.com");
        assert_eq!(payload.students.len(), 1);
        assert_eq!(payload.students[0].student_id, "1001");
    }

    #[test]
    fn test_form_defaults_course_group() {
        let mut f = form();
        f.course_group = None;
        assert_eq!(f.validate().unwrap().claimant.course_group, 1);
    }

    #[test]
    fn test_form_reports_every_problem() {
        let f = ClaimantForm {
            course_group: Some(9),
            ..ClaimantForm::default()
        };
        let msg = invalid_message(f.validate());
        assert!(msg.contains("Course group"));
        assert!(msg.contains("Team number"));
        assert!(msg.contains("Leader name"));
        assert!(msg.contains("leader email"));
        assert!(msg.contains("Leader phone"));
        assert!(msg.contains("at least one student"));
    }

    #[test]
    fn test_form_caps_students() {
        let mut f = form();
        f.students = (0..26)
            .map(|i| Student {
                student_id: format!("{}", i),
                student_name: format!("Student {}", i),
            })
            .collect();
        assert!(invalid_message(f.validate()).contains("Maximum 25"));
    }

    #[test]
    fn test_form_accepts_camel_case() {
        let json = r#"{"courseGroup":3,"teamNumber":4,"leaderName":"Bo","leaderEmail":"bo@x.io",
            "leaderPhone":"1","students":[{"studentId":"9","studentName":"Jo"}]}"#;
        let f: ClaimantForm = serde_json::from_str(json).unwrap();
        let payload = f.validate().unwrap();
        assert_eq!(payload.claimant, ClaimantId { course_group: 3, team_number: 4 });
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Drug-07 ").unwrap(), "drug-07");
        assert!(matches!(normalize_key("   "), Err(StakeError::Invalid(_))));
        assert!(matches!(normalize_key("drug 07"), Err(StakeError::Invalid(_))));
        assert!(matches!(normalize_key(&"x".repeat(MAX_KEY_LEN + 1)), Err(StakeError::Invalid(_))));
    }

    #[test]
    fn test_normalize_token() {
        assert_eq!(normalize_token(None).unwrap(), None);
        assert_eq!(normalize_token(Some("")).unwrap(), None);
        assert_eq!(normalize_token(Some("tok_abcdef")).unwrap().as_deref(), Some("tok_abcdef"));
        assert!(normalize_token(Some("short")).is_err());
        assert!(normalize_token(Some("has spaces inside")).is_err());
        assert!(require_token(None).is_err());
        assert!(normalize_token(Some(&generate_token())).unwrap().is_some());
    }

    #[test]
    fn test_catalog() {
        let catalog = Resource::catalog(20);
        assert_eq!(catalog.len(), 20);
        assert_eq!(catalog[0].key, "drug-01");
        assert_eq!(catalog[19].name, "Drug 20");
        assert!(catalog.iter().all(|r| r.is_active));
    }

    #[test]
    fn test_assignment_serializes_flat() {
        let payload = form().validate().unwrap();
        let a = Assignment::new("drug-01".into(), "Drug 01".into(), payload, 42);
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["resource_key"], "drug-01");
        assert_eq!(v["team_number"], 7);
        assert_eq!(v["course_group"], 2);
        assert_eq!(v["created_at"], 42);
    }

    #[test]
    fn test_lease_expiry_saturates() {
        let lease = Lease::new("drug-01".to_string(), "tok_a".to_string(), 600_000, u64::MAX - 10);
        assert_eq!(lease.expires_at, u64::MAX);
        assert_eq!(lease.renewed(600_000, u64::MAX - 1).expires_at, u64::MAX);
    }

    fn parse_envelope<T: serde::de::DeserializeOwned>(body: &str) -> crate::api::ApiResponse<T> {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_envelope_without_data_parses_generically() {
        let envelope: crate::api::ApiResponse<crate::api::LeaseGrant> = parse_envelope(
            r#"{"success":false,"error":"conflict on drug-01","reason":"RESERVED_BY_OTHER"}"#,
        );
        assert!(!envelope.success);
        assert!(envelope.data.is_none());
        assert_eq!(envelope.reason.as_deref(), Some("RESERVED_BY_OTHER"));
    }
}
