#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::routing::post;
    use axum::Json;
    use futures::future::join_all;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::Value;

    use crate::error::{ExecutorError, TokenRefreshError};
    use crate::executor::request::{BoundedExecutor, ExecutorOptions, UpstreamCall};
    use crate::resilience::retry::RetrySettings;
    use crate::tests::common::*;
    use crate::token::pair::TokenPair;

    /// Refresh endpoint that counts hits, answers slowly and hands out `token`.
    async fn slow_refresh_server(token: String, delay: Duration) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/auth/refresh",
            post(move || {
                let counter = counter.clone();
                let token = token.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    Json(json!({"accessToken": token, "refreshToken": "refresh-2"}))
                }
            }),
        );
        let (_handle, addr) = spawn_axum(router).await;
        (format!("http://{}/auth/refresh", addr), hits)
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let new_token = fresh_jwt();
        let (url, hits) = slow_refresh_server(new_token.clone(), Duration::from_millis(200)).await;
        let manager = token_manager(expired_jwt(), Some(url));

        let callers = (0..10).map(|_| {
            let manager = manager.clone();
            async move { manager.get_valid_access_token().await }
        });
        let results = join_all(callers).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), new_token);
        }
        let pair = manager.current_pair().await;
        assert_eq!(pair.access_token, new_token);
        assert_eq!(pair.refresh_token, "refresh-2");
    }

    #[tokio::test]
    async fn spawned_callers_share_one_refresh() {
        let new_token = fresh_jwt();
        let (url, hits) = slow_refresh_server(new_token.clone(), Duration::from_millis(200)).await;
        let manager = token_manager(expired_jwt(), Some(url));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_valid_access_token().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), new_token);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // the token is fresh now, no further refresh
        manager.get_valid_access_token().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fresh_token_never_hits_refresh_endpoint() {
        let (url, hits) = slow_refresh_server(fresh_jwt(), Duration::ZERO).await;
        let current = fresh_jwt();
        let manager = token_manager(current.clone(), Some(url));

        assert_eq!(manager.get_valid_access_token().await.unwrap(), current);
        assert!(!manager.needs_refresh().await);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn explicit_refresh_always_calls_upstream() {
        let (url, hits) = slow_refresh_server(fresh_jwt(), Duration::ZERO).await;
        let manager = token_manager(fresh_jwt(), Some(url));

        manager.refresh().await.unwrap();
        manager.refresh().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_sends_current_refresh_token() {
        let server = MockServer::start_async().await;
        let new_token = fresh_jwt();
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/auth/refresh")
                    .json_body(json!({"refreshToken": "refresh-1"}));
                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(json!({"accessToken": new_token}));
            })
            .await;

        let manager = token_manager("opaque-token".into(), Some(server.url("/auth/refresh")));
        assert_eq!(manager.get_valid_access_token().await.unwrap(), new_token);
        mock.assert_async().await;

        // refresh token kept when upstream omits a new one
        assert_eq!(manager.current_pair().await.refresh_token, "refresh-1");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_stale_pair() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth/refresh");
                then.status(401).body("refresh token revoked");
            })
            .await;

        let stale = expired_jwt();
        let manager = token_manager(stale.clone(), Some(server.url("/auth/refresh")));
        let err = manager.get_valid_access_token().await.unwrap_err();
        match err {
            TokenRefreshError::Rejected { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "refresh token revoked");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(manager.current_pair().await.access_token, stale);
    }

    #[tokio::test]
    async fn malformed_refresh_reply_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth/refresh");
                then.status(200).body("<html>login</html>");
            })
            .await;

        let manager = token_manager(expired_jwt(), Some(server.url("/auth/refresh")));
        assert!(matches!(
            manager.get_valid_access_token().await,
            Err(TokenRefreshError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn missing_refresh_endpoint_is_not_configured() {
        let manager = token_manager(expired_jwt(), None);
        assert!(matches!(
            manager.refresh().await,
            Err(TokenRefreshError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn refresh_failure_surfaces_as_auth_error_on_calls() {
        let addr = closed_addr().await;
        let tokens = token_manager(expired_jwt(), Some(format!("http://{}/auth/refresh", addr)));
        let executor = BoundedExecutor::new(
            build_reqwest_client(),
            tokens,
            ExecutorOptions {
                base_url: format!("http://{}", addr),
                timeout: Duration::from_secs(1),
                max_response_bytes: 1024,
            },
        );

        let err = executor
            .execute(UpstreamCall::get("config", "/genie/config/abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Auth(TokenRefreshError::Transport(_))));
    }

    #[tokio::test]
    async fn observer_sees_rotated_pair() {
        let new_token = fresh_jwt();
        let (url, _) = slow_refresh_server(new_token.clone(), Duration::ZERO).await;
        let manager = token_manager(expired_jwt(), Some(url));

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager.on_refresh(Arc::new(move |pair: &TokenPair| {
            sink.lock().unwrap().push(pair.access_token.clone());
        }));

        manager.get_valid_access_token().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![new_token]);
    }

    #[tokio::test]
    async fn background_loop_refreshes_stale_token_once() {
        let new_token = fresh_jwt();
        let (url, hits) = slow_refresh_server(new_token.clone(), Duration::ZERO).await;
        let manager = token_manager(expired_jwt(), Some(url));

        let task = manager.start_background_refresh(Duration::from_millis(50), RetrySettings::default());
        tokio::time::sleep(Duration::from_millis(400)).await;
        task.stop().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(manager.current_pair().await.access_token, new_token);
    }

    #[tokio::test]
    async fn background_loop_retries_failed_refresh() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let new_token = fresh_jwt();
        let router = Router::new().route(
            "/auth/refresh",
            post(move |Json(_body): Json<Value>| {
                let counter = counter.clone();
                let token = new_token.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        return (http::StatusCode::BAD_GATEWAY, Json(json!({"error": "busy"})));
                    }
                    (http::StatusCode::OK, Json(json!({"accessToken": token})))
                }
            }),
        );
        let (_handle, addr) = spawn_axum(router).await;
        let manager = token_manager(expired_jwt(), Some(format!("http://{}/auth/refresh", addr)));

        let retry = RetrySettings { attempts: 3, base_delay_ms: 10, max_delay_ms: 20 };
        let task = manager.start_background_refresh(Duration::from_millis(50), retry);
        tokio::time::sleep(Duration::from_millis(400)).await;
        task.stop().await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(!manager.needs_refresh().await);
    }
}
