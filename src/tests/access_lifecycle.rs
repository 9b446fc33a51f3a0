#[cfg(test)]
mod test {
    use chrono::Duration as ChronoDuration;

    use crate::access::service::AccessTokenService;
    use crate::access::store::FilePasswordStore;
    use crate::config::settings::AccessSettings;
    use crate::error::AccessError;
    use crate::helpers::time::{Clock, ManualClock};

    #[tokio::test]
    async fn issued_token_lives_exactly_its_ttl() {
        let clock = ManualClock::starting_now();
        let service: AccessTokenService<FilePasswordStore> =
            AccessTokenService::new(None, clock.clone());

        let issued = service.issue_token("story-7", Some(3600)).await;
        assert_eq!(issued.expires_at, clock.now() + ChronoDuration::seconds(3600));

        clock.advance(ChronoDuration::seconds(3599));
        assert!(service.validate_token(&issued.token, "story-7").await);
        assert!(!service.validate_token(&issued.token, "story-8").await);

        clock.advance(ChronoDuration::seconds(2));
        assert!(!service.validate_token(&issued.token, "story-7").await);
    }

    #[tokio::test]
    async fn configured_default_ttl_applies() {
        let clock = ManualClock::starting_now();
        let settings = AccessSettings { token_ttl_seconds: 60, ..AccessSettings::default() };
        let service: AccessTokenService<FilePasswordStore> =
            AccessTokenService::from_settings(None, &settings, clock.clone());

        let issued = service.issue_token("r", None).await;
        clock.advance(ChronoDuration::seconds(61));
        assert!(!service.validate_token(&issued.token, "r").await);
    }

    #[tokio::test]
    async fn passwords_survive_restart_but_tokens_do_not() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passwords.json");
        let clock = ManualClock::starting_now();

        let before = AccessTokenService::new(Some(FilePasswordStore::new(&path)), clock.clone());
        before
            .set_password("story-7", "open sesame", Some("cave".into()))
            .await
            .unwrap();
        let token = before.unlock("story-7", "open sesame").await.unwrap().unwrap();
        assert!(before.validate_token(&token.token, "story-7").await);

        let after = AccessTokenService::new(Some(FilePasswordStore::new(&path)), clock);
        assert!(after.requires_password("story-7").await);
        assert_eq!(after.get_hint("story-7").await.unwrap().as_deref(), Some("cave"));
        assert!(after.verify_password("story-7", "open sesame").await.unwrap());
        assert!(!after.validate_token(&token.token, "story-7").await);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("open sesame"));
    }

    #[tokio::test]
    async fn removal_revokes_outstanding_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::starting_now();
        let service = AccessTokenService::new(
            Some(FilePasswordStore::new(dir.path().join("passwords.json"))),
            clock,
        );

        service.set_password("r1", "pw", None).await.unwrap();
        let first = service.issue_token("r1", None).await;
        let second = service.issue_token("r1", None).await;

        assert!(service.remove_password("r1").await.unwrap());
        assert!(!service.validate_token(&first.token, "r1").await);
        assert!(!service.validate_token(&second.token, "r1").await);
        assert!(!service.has_password("r1").await.unwrap());
        assert!(!service.remove_password("r1").await.unwrap());
    }

    #[tokio::test]
    async fn unconfigured_storage_fails_explicitly() {
        let service: AccessTokenService<FilePasswordStore> =
            AccessTokenService::new(None, ManualClock::starting_now());

        assert!(matches!(
            service.verify_password("r1", "pw").await,
            Err(AccessError::StorageUnavailable)
        ));
        assert!(matches!(
            service.remove_password("r1").await,
            Err(AccessError::StorageUnavailable)
        ));
        assert!(matches!(service.get_hint("r1").await, Err(AccessError::StorageUnavailable)));
        assert!(!service.requires_password("r1").await);
    }

    #[tokio::test]
    async fn unreadable_store_reads_as_open_resource() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passwords.json");
        std::fs::write(&path, "garbage").unwrap();
        let service = AccessTokenService::new(Some(FilePasswordStore::new(&path)), ManualClock::starting_now());

        assert!(matches!(service.has_password("r1").await, Err(AccessError::Store(_))));
        assert!(!service.requires_password("r1").await);
    }
}
