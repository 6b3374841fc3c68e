//! End-to-end flows over the public API: the local account lifecycle, the
//! enterprise redirect round trip across a simulated reload, startup
//! priority when two providers can both recover, and per-call bearer
//! resolution.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use iot_portal_auth::config::{DirectoryConfig, EnterpriseConfig};
use iot_portal_auth::providers::{DirectoryAdapter, EnterpriseAdapter};
use iot_portal_auth::store::{FileStore, KeyValueStore, SessionStore};
use iot_portal_auth::{
    AuthError, AuthResult, CredentialPrompt, Navigator, Provider, RedirectResponse, Route,
    SessionBroker, SignUpOutcome,
};

#[derive(Default)]
struct TestNavigator {
    replaced: Mutex<Vec<Route>>,
    external: Mutex<Vec<Url>>,
}

impl TestNavigator {
    fn last_external(&self) -> Option<Url> {
        self.external.lock().unwrap().last().cloned()
    }
}

impl Navigator for TestNavigator {
    fn replace(&self, route: Route) {
        self.replaced.lock().unwrap().push(route);
    }

    fn external(&self, url: Url) {
        self.external.lock().unwrap().push(url);
    }
}

struct NoPrompt;

#[async_trait]
impl CredentialPrompt for NoPrompt {
    fn is_ready(&self) -> bool {
        false
    }

    async fn request_credential(&self, _client_id: &str) -> AuthResult<String> {
        Err(AuthError::MissingCredential)
    }

    fn dismiss(&self) {}
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iot_portal_auth=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn unsigned_token(payload: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.sig")
}

fn directory_target(name: &str) -> String {
    format!("AWSCognitoIdentityProviderService.{name}")
}

fn build_broker(
    kv: Arc<dyn KeyValueStore>,
    navigator: Arc<TestNavigator>,
    enterprise_authority: String,
    directory_endpoint: String,
) -> SessionBroker {
    let enterprise = Arc::new(EnterpriseAdapter::new(
        EnterpriseConfig {
            client_id: "portal-client".into(),
            authority: enterprise_authority,
            redirect_uri: "https://portal.example/auth/callback".into(),
        },
        kv.clone(),
        navigator,
    ));
    let directory = Arc::new(DirectoryAdapter::new(
        DirectoryConfig {
            user_pool_id: "eu-west-1_Portal".into(),
            client_id: "pool-client".into(),
            endpoint: Some(directory_endpoint),
        },
        kv.clone(),
    ));
    SessionBroker::new(
        SessionStore::new(kv),
        Ok(enterprise),
        Err(AuthError::MissingConfiguration("PORTAL_ONETAP_CLIENT_ID".into())),
        Ok(directory),
    )
}

async fn mount_directory_account(server: &MockServer, id_token: &str) {
    Mock::given(method("POST"))
        .and(header("x-amz-target", directory_target("SignUp").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "UserConfirmed": false,
            "UserSub": "sub-42",
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(header("x-amz-target", directory_target("ConfirmSignUp").as_str()))
        .and(body_string_contains("999999"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "__type": "CodeMismatchException",
            "message": "Invalid verification code provided, please try again.",
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(header("x-amz-target", directory_target("ConfirmSignUp").as_str()))
        .and(body_string_contains("123456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(header("x-amz-target", directory_target("InitiateAuth").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "AuthenticationResult": {
                "IdToken": id_token,
                "AccessToken": "pool-access-token",
                "TokenType": "Bearer",
            },
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(header("x-amz-target", directory_target("GetUser").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Username": "cafebabe-user",
            "UserAttributes": [
                {"Name": "sub", "Value": "sub-42"},
                {"Name": "email", "Value": "new@example.com"},
            ],
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn local_account_lifecycle_from_sign_up_to_bearer_resolution() {
    init_tracing();
    let local_id_token = unsigned_token(serde_json::json!({
        "sub": "sub-42",
        "email": "new@example.com",
        "exp": 4_102_444_800i64,
    }));

    let directory = MockServer::start().await;
    mount_directory_account(&directory, &local_id_token).await;

    let dir = tempfile::tempdir().unwrap();
    let kv: Arc<FileStore> =
        Arc::new(FileStore::open(dir.path().join("portal-state.json")).unwrap());
    let navigator = Arc::new(TestNavigator::default());
    let broker = build_broker(
        kv,
        navigator,
        "https://login.example".into(),
        directory.uri(),
    );
    broker.start(None).await;
    assert_eq!(broker.session(), None);

    // sign-up requires confirmation; a wrong code is rejected verbatim
    let outcome = broker.sign_up("new@example.com", "correct-horse-battery").await.unwrap();
    assert_eq!(outcome, SignUpOutcome::ConfirmationRequired);

    let err = broker.confirm("new@example.com", "999999").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCode(_)));

    broker.confirm("new@example.com", "123456").await.unwrap();

    let session = broker
        .sign_in_local("new@example.com", "correct-horse-battery")
        .await
        .unwrap();
    assert_eq!(session.provider, Provider::Local);
    assert_eq!(session.user_id, "sub-42");
    assert_eq!(session.email.as_deref(), Some("new@example.com"));
    assert_eq!(session.user_key(), "local:sub-42");

    // the identity token captured at sign-in is the bearer credential
    let resolver = broker.token_resolver();
    let bearer = resolver.resolve(&session).await.unwrap();
    assert_eq!(bearer, local_id_token);
    assert!(!bearer.is_empty());
}

#[tokio::test]
async fn enterprise_redirect_round_trip_wins_priority_after_reload() {
    init_tracing();
    let enterprise_id_token = unsigned_token(serde_json::json!({
        "sub": "subject-1",
        "oid": "oid-1",
        "tid": "tid-1",
        "preferred_username": "user@corp.example",
        "name": "Corp User",
        "exp": 4_102_444_800i64,
    }));
    let refreshed_id_token = unsigned_token(serde_json::json!({
        "sub": "subject-1",
        "oid": "oid-1",
        "tid": "tid-1",
        "exp": 4_102_444_800i64,
    }));
    let local_id_token = unsigned_token(serde_json::json!({
        "sub": "sub-42",
        "exp": 4_102_444_800i64,
    }));

    let directory = MockServer::start().await;
    mount_directory_account(&directory, &local_id_token).await;

    let idp = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id_token": enterprise_id_token,
            "refresh_token": "refresh-1",
        })))
        .mount(&idp)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id_token": refreshed_id_token,
            "refresh_token": "refresh-2",
        })))
        .mount(&idp)
        .await;

    let state_file = tempfile::tempdir().unwrap();
    let state_path = state_file.path().join("portal-state.json");

    // ── first tab: local sign-in, then the enterprise redirect leaves ──
    let navigator = Arc::new(TestNavigator::default());
    let broker = build_broker(
        Arc::new(FileStore::open(&state_path).unwrap()),
        navigator.clone(),
        idp.uri(),
        directory.uri(),
    );
    broker.start(None).await;

    broker
        .sign_in_local("new@example.com", "correct-horse-battery")
        .await
        .unwrap();
    assert_eq!(broker.session().unwrap().provider, Provider::Local);

    broker.sign_in_enterprise().unwrap();
    let authorize_url = navigator.last_external().unwrap();
    assert_eq!(authorize_url.path(), "/oauth2/v2.0/authorize");
    let state = authorize_url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    // ── return from the provider: a fresh page load on the callback URL ──
    let navigator2 = Arc::new(TestNavigator::default());
    let broker2 = build_broker(
        Arc::new(FileStore::open(&state_path).unwrap()),
        navigator2,
        idp.uri(),
        directory.uri(),
    );

    // the optimistic paint still shows the persisted local session
    assert_eq!(broker2.session().unwrap().provider, Provider::Local);

    broker2
        .start(Some(RedirectResponse {
            code: "auth-code".into(),
            state,
        }))
        .await;

    // both providers could recover here; the enterprise account wins
    let session = broker2.session().unwrap();
    assert_eq!(session.provider, Provider::Enterprise);
    assert_eq!(session.user_id, "oid-1.tid-1");
    assert_eq!(session.email.as_deref(), Some("user@corp.example"));

    // bearer resolution reacquires silently on every call
    let resolver = broker2.token_resolver();
    let bearer = resolver.resolve(&session).await.unwrap();
    assert_eq!(bearer, refreshed_id_token);

    // ── sign-out clears the session but leaves other providers alone ──
    broker2.sign_out().await;
    assert_eq!(broker2.session(), None);

    let broker3 = build_broker(
        Arc::new(FileStore::open(&state_path).unwrap()),
        Arc::new(TestNavigator::default()),
        idp.uri(),
        directory.uri(),
    );
    assert_eq!(broker3.session(), None);
    broker3.start(None).await;
    // the directory's own credential state was provider-owned and survives
    assert_eq!(broker3.session().unwrap().provider, Provider::Local);
}

// paused time: the seven-second script wait auto-advances
#[tokio::test(start_paused = true)]
async fn consumer_prompt_timeout_fails_the_attempt() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let kv: Arc<FileStore> =
        Arc::new(FileStore::open(dir.path().join("portal-state.json")).unwrap());

    let broker = SessionBroker::new(
        SessionStore::new(kv),
        Err(AuthError::MissingConfiguration("PORTAL_ENTERPRISE_CLIENT_ID".into())),
        Ok(Arc::new(iot_portal_auth::providers::ConsumerAdapter::new(
            iot_portal_auth::config::ConsumerConfig {
                client_id: "onetap-client".into(),
            },
            Arc::new(NoPrompt),
        ))),
        Err(AuthError::MissingConfiguration("PORTAL_DIRECTORY_POOL_ID".into())),
    );
    broker.start(None).await;

    let err = broker.sign_in_consumer().await.unwrap_err();
    assert!(matches!(err, AuthError::ScriptNotLoaded(_)));
    assert_eq!(broker.session(), None);
}
