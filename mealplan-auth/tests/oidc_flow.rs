//! End-to-end sign-in tests against a mock authority.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use mealplan_auth::{
    AuthPhase, GuardView, IdentityProvider, MemoryStore, OidcClient, RecordingNavigator,
    SessionSynchronizer,
};
use mealplan_core::errors::{CallbackError, SilentRenewError};
use mealplan_core::{AuthConfig, IdentityProviderHint, ProviderMetadata, Session};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

struct Harness {
    server: MockServer,
    navigator: Arc<RecordingNavigator>,
    client: Arc<OidcClient>,
}

async fn harness(load_user_info: bool) -> Harness {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": server.uri(),
            "authorization_endpoint": format!("{}/authorize", server.uri()),
            "token_endpoint": format!("{}/token", server.uri()),
            "userinfo_endpoint": format!("{}/userinfo", server.uri()),
            "end_session_endpoint": format!("{}/logout", server.uri()),
        })))
        .mount(&server)
        .await;

    let config = AuthConfig::new(
        server.uri().parse().unwrap(),
        "meal-client",
        "http://localhost:3000/auth/callback".parse().unwrap(),
    )
    .with_load_user_info(load_user_info);

    let navigator = Arc::new(RecordingNavigator::new());
    let client = OidcClient::new(config, Arc::new(MemoryStore::new()), navigator.clone()).unwrap();

    Harness {
        server,
        navigator,
        client: Arc::new(client),
    }
}

fn query(url: &url::Url) -> HashMap<String, String> {
    url.query_pairs().into_owned().collect()
}

/// Run `login` and return the state and nonce the authority would echo.
async fn start_login(h: &Harness) -> (String, String) {
    h.client.login(None).await.unwrap();
    let params = query(&h.navigator.last().unwrap());
    (params["state"].clone(), params["nonce"].clone())
}

async fn mount_code_exchange(h: &Harness, nonce: &str) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .and(body_string_contains("code_verifier="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "token_type": "Bearer",
            "id_token": jwt(json!({
                "sub": "user123",
                "nonce": nonce,
                "email": "user@example.com",
                "preferred_username": "testuser",
            })),
            "refresh_token": "refresh-1",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&h.server)
        .await;
}

#[tokio::test]
async fn test_full_sign_in() {
    let h = harness(true).await;
    let (state, nonce) = start_login(&h).await;
    assert_eq!(h.client.phase(), AuthPhase::PendingRedirect);
    mount_code_exchange(&h, &nonce).await;

    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "user123",
            "name": "Test User",
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let sync = SessionSynchronizer::new(h.client.clone());
    let user = sync
        .complete_login(&format!(
            "http://localhost:3000/auth/callback?code=auth-code&state={state}"
        ))
        .await
        .unwrap();

    assert_eq!(user.profile.username, "testuser");
    assert_eq!(user.profile.full_name.as_deref(), Some("Test User"));

    let session = sync.snapshot();
    assert!(session.is_authenticated);
    assert!(!session.loading);
    assert_eq!(h.client.phase(), AuthPhase::Authenticated);
    assert!(h.client.is_authenticated().await.unwrap());

    // The pending authorization is single use.
    let replay = h
        .client
        .handle_login_callback(&format!(
            "http://localhost:3000/auth/callback?code=auth-code&state={state}"
        ))
        .await;
    assert!(matches!(replay, Err(CallbackError::UnknownState(_))));
}

#[tokio::test]
async fn test_authorization_url_carries_hint() {
    let h = harness(false).await;
    h.client
        .login(Some(IdentityProviderHint::Google))
        .await
        .unwrap();

    let url = h.navigator.last().unwrap();
    let params = query(&url);
    assert_eq!(url.path(), "/authorize");
    assert_eq!(params["identity_provider"], "google");
    assert_eq!(params["prompt"], "login");
    assert_eq!(params["code_challenge_method"], "S256");
}

#[tokio::test]
async fn test_nonce_mismatch_rejected() {
    let h = harness(false).await;
    let (state, _) = start_login(&h).await;
    mount_code_exchange(&h, "some-other-nonce").await;

    let err = h
        .client
        .handle_login_callback(&format!(
            "http://localhost:3000/auth/callback?code=auth-code&state={state}"
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, CallbackError::NonceMismatch));
    assert!(h.client.get_user().await.is_none());
}

#[tokio::test]
async fn test_token_endpoint_rejection() {
    let h = harness(false).await;
    let (state, _) = start_login(&h).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&h.server)
        .await;

    let err = h
        .client
        .handle_login_callback(&format!(
            "http://localhost:3000/auth/callback?code=auth-code&state={state}"
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, CallbackError::Rejected { status: 400, .. }));
}

#[tokio::test]
async fn test_no_credential_redirects_to_login() {
    let h = harness(false).await;
    let sync = SessionSynchronizer::new(h.client.clone());
    assert_eq!(sync.boot().await, Session::new());

    assert_eq!(
        sync.guard().evaluate("/meal-plans").await,
        GuardView::Redirect {
            to: "/login".into(),
            from: "/meal-plans".into(),
        }
    );
}

#[tokio::test]
async fn test_stored_credential_renders() {
    let h = harness(false).await;
    let (state, nonce) = start_login(&h).await;
    mount_code_exchange(&h, &nonce).await;
    h.client
        .handle_login_callback(&format!(
            "http://localhost:3000/auth/callback?code=auth-code&state={state}"
        ))
        .await
        .unwrap();

    // A fresh synchronizer, as after an application restart.
    let sync = SessionSynchronizer::new(h.client.clone());
    let first = sync.boot().await;
    assert!(first.is_authenticated);
    assert!(h.client.is_authenticated().await.unwrap());
    assert_eq!(sync.guard().evaluate("/meals").await, GuardView::Render);

    assert_eq!(sync.boot().await, first);
}

#[tokio::test]
async fn test_callback_without_code() {
    let h = harness(false).await;
    let (state, _) = start_login(&h).await;
    let sync = SessionSynchronizer::new(h.client.clone());

    let err = sync
        .complete_login(&format!("http://localhost:3000/auth/callback?state={state}"))
        .await
        .unwrap_err();
    assert!(matches!(err, CallbackError::MissingCode));

    let session = sync.snapshot();
    assert!(!session.is_authenticated);
    assert!(!session.loading);
    assert_eq!(session.user, None);
    assert!(session
        .last_error
        .as_deref()
        .is_some_and(|e| e.starts_with("authentication failed")));
    assert_eq!(h.client.phase(), AuthPhase::Anonymous);
    assert!(h.client.get_user().await.is_none());
}

#[tokio::test]
async fn test_callback_without_code_or_known_state() {
    let h = harness(false).await;
    let sync = SessionSynchronizer::new(h.client.clone());

    let err = sync
        .complete_login("http://localhost:3000/auth/callback?state=x")
        .await
        .unwrap_err();
    assert!(matches!(err, CallbackError::MissingCode));

    let session = sync.snapshot();
    assert!(!session.is_authenticated);
    assert!(!session.loading);
    assert!(session.last_error.is_some());
    assert!(!h.client.is_authenticated().await.unwrap());
}

#[tokio::test]
async fn test_callback_state_naming_credential_is_unknown() {
    let h = harness(false).await;
    let (state, nonce) = start_login(&h).await;
    mount_code_exchange(&h, &nonce).await;
    h.client
        .handle_login_callback(&format!(
            "http://localhost:3000/auth/callback?code=auth-code&state={state}"
        ))
        .await
        .unwrap();

    let key = format!("oidc.user:{}:meal-client", h.server.uri());
    let forged = key.trim_start_matches("oidc.");
    let err = h
        .client
        .handle_login_callback(&format!(
            "http://localhost:3000/auth/callback?code=x&state={forged}"
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, CallbackError::UnknownState(_)));
    assert_eq!(h.client.get_user().await.unwrap().access_token, "access-1");
}

#[tokio::test]
async fn test_silent_renewal_supersedes_credential() {
    let h = harness(false).await;
    let (state, nonce) = start_login(&h).await;
    mount_code_exchange(&h, &nonce).await;
    h.client
        .handle_login_callback(&format!(
            "http://localhost:3000/auth/callback?code=auth-code&state={state}"
        ))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let renewed = h.client.renew_token().await.unwrap();
    assert_eq!(renewed.access_token, "access-2");
    assert_eq!(renewed.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(renewed.profile.sub, "user123");

    let stored = h.client.get_user().await.unwrap();
    assert_eq!(stored.access_token, "access-2");
}

#[tokio::test]
async fn test_out_of_range_lifetime_renews_without_expiry() {
    let h = harness(false).await;
    let (state, nonce) = start_login(&h).await;
    mount_code_exchange(&h, &nonce).await;
    h.client
        .handle_login_callback(&format!(
            "http://localhost:3000/auth/callback?code=auth-code&state={state}"
        ))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "expires_in": 10_000_000_000_000_u64,
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let renewed = h.client.renew_token().await.unwrap();
    assert_eq!(renewed.access_token, "access-2");
    assert_eq!(renewed.expires_at, None);
    assert!(h.client.is_authenticated().await.unwrap());
}

#[tokio::test]
async fn test_silent_renewal_rejected_keeps_credential() {
    let h = harness(false).await;
    let (state, nonce) = start_login(&h).await;
    mount_code_exchange(&h, &nonce).await;
    h.client
        .handle_login_callback(&format!(
            "http://localhost:3000/auth/callback?code=auth-code&state={state}"
        ))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&h.server)
        .await;

    let err = h.client.renew_token().await.unwrap_err();
    assert!(matches!(err, SilentRenewError::Rejected { status: 400, .. }));
    assert_eq!(h.client.phase(), AuthPhase::Anonymous);
    assert!(h.client.get_user().await.is_some());
}

#[tokio::test]
async fn test_logout_uses_end_session() {
    let h = harness(false).await;
    let (state, nonce) = start_login(&h).await;
    mount_code_exchange(&h, &nonce).await;
    let sync = SessionSynchronizer::new(h.client.clone());
    sync.complete_login(&format!(
        "http://localhost:3000/auth/callback?code=auth-code&state={state}"
    ))
    .await
    .unwrap();

    sync.logout().await.unwrap();

    let url = h.navigator.last().unwrap();
    let params = query(&url);
    assert_eq!(url.path(), "/logout");
    assert!(params.contains_key("id_token_hint"));
    assert_eq!(params["post_logout_redirect_uri"], "http://localhost:3000/");
    assert_eq!(sync.snapshot(), Session::new());
    assert!(!h.client.is_authenticated().await.unwrap());
}

#[tokio::test]
async fn test_static_metadata_without_discovery() {
    let server = MockServer::start().await;
    let config = AuthConfig::new(
        "https://unreachable.invalid".parse().unwrap(),
        "meal-client",
        "http://localhost:3000/auth/callback".parse().unwrap(),
    )
    .with_metadata(ProviderMetadata {
        authorization_endpoint: Some(format!("{}/authorize", server.uri()).parse().unwrap()),
        token_endpoint: Some(format!("{}/token", server.uri()).parse().unwrap()),
        ..Default::default()
    });
    let navigator = Arc::new(RecordingNavigator::new());
    let client = OidcClient::new(config, Arc::new(MemoryStore::new()), navigator.clone()).unwrap();

    client.login(None).await.unwrap();
    assert!(navigator
        .last()
        .unwrap()
        .as_str()
        .starts_with(&format!("{}/authorize?", server.uri())));
}
