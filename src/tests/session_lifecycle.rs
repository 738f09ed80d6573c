// Session lifecycle: client memoization, sign-out invalidation, and the
// persisted session anchor.

#[cfg(test)]
mod test {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::error::AgentError;
    use crate::tests::common::{build_session, FakeDiscovery, FakeProvider};

    #[tokio::test]
    async fn clients_are_memoized_per_session() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(FakeProvider::succeeding("user-a"));
        let discovery = Arc::new(FakeDiscovery::with_defaults());
        let session = build_session(dir.path(), provider, discovery.clone());

        let first = session.ensure_mail_client().await.unwrap();
        let second = session.ensure_mail_client().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sign_out_drops_every_cached_client() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(FakeProvider::succeeding("user-a"));
        let discovery = Arc::new(FakeDiscovery::with_defaults());
        let session = build_session(dir.path(), provider.clone(), discovery);

        let mail_before = session.ensure_mail_client().await.unwrap();
        let files_before = session.ensure_files_client().await.unwrap();
        let directory_before = session.ensure_directory_client().await.unwrap();

        session.sign_out().await.unwrap();
        assert_eq!(provider.logout_calls.load(Ordering::SeqCst), 1);
        assert!(provider.cache_clears.load(Ordering::SeqCst) >= 1);

        let mail_after = session.ensure_mail_client().await.unwrap();
        let files_after = session.ensure_files_client().await.unwrap();
        let directory_after = session.ensure_directory_client().await.unwrap();

        assert!(!Arc::ptr_eq(&mail_before, &mail_after));
        assert!(!Arc::ptr_eq(&files_before, &files_after));
        assert!(!Arc::ptr_eq(&directory_before, &directory_after));
    }

    #[tokio::test]
    async fn sign_out_clears_anchor_but_keeps_user() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(FakeProvider::succeeding("user-a"));
        let discovery = Arc::new(FakeDiscovery::with_defaults());
        let session = build_session(dir.path(), provider, discovery);

        session.ensure_directory_client().await.unwrap();
        let auth = session.auth_session();
        assert_eq!(auth.logged_in_user().await, "user-a");
        assert_eq!(auth.tenant_id().await, "tenant-1");
        assert_eq!(auth.last_authority().await, "https://login.test/Common");

        session.sign_out().await.unwrap();

        // user id stays so a failed logout can be retried
        assert_eq!(auth.logged_in_user().await, "user-a");
        assert_eq!(auth.tenant_id().await, "");
        assert_eq!(auth.last_authority().await, "");
    }

    #[tokio::test]
    async fn sign_out_is_a_noop_when_nobody_is_signed_in() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(FakeProvider::succeeding("user-a"));
        let discovery = Arc::new(FakeDiscovery::with_defaults());
        let session = build_session(dir.path(), provider.clone(), discovery);

        session.sign_out().await.unwrap();
        assert_eq!(provider.logout_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_sign_in_fails_construction_and_clears_tokens() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(FakeProvider::cancelling());
        let discovery = Arc::new(FakeDiscovery::with_defaults());
        let session = build_session(dir.path(), provider.clone(), discovery);

        let err = session
            .ensure_directory_client()
            .await
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, AgentError::AuthFailed(_)));
        assert_eq!(provider.cache_clears.load(Ordering::SeqCst), 1);

        // cancellation must not anchor a session
        let auth = session.auth_session();
        assert_eq!(auth.logged_in_user().await, "");
        assert_eq!(auth.last_authority().await, "");
    }

    #[tokio::test]
    async fn failed_acquisition_resolves_to_none() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(FakeProvider::failing());
        let discovery = Arc::new(FakeDiscovery::with_defaults());
        let session = build_session(dir.path(), provider, discovery);

        let token = session
            .resolver()
            .acquire_token("https://resource.test/")
            .await;
        assert!(token.is_none());

        let auth = session.auth_session();
        assert_eq!(auth.logged_in_user().await, "");
    }

    #[tokio::test]
    async fn successful_acquisition_anchors_the_session() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(FakeProvider::succeeding("user-a"));
        let discovery = Arc::new(FakeDiscovery::with_defaults());
        let session = build_session(dir.path(), provider, discovery);

        let token = session
            .resolver()
            .acquire_token("https://resource.test/")
            .await
            .unwrap();
        assert_eq!(token.value, "tok-https://resource.test/");

        let auth = session.auth_session();
        assert_eq!(auth.logged_in_user().await, "user-a");
        assert_eq!(auth.tenant_id().await, "tenant-1");
    }
}
