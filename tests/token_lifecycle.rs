use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::Algorithm;
use tokenmint::auth::{
    decode_handle, derive_record_id, encode_handle, sign_claims, verify_token, AccessClaims,
    IdentityProfile, KeyRing, ResolvedKey, Validity,
};
use tokenmint::telemetry::init_telemetry;
use tokenmint::{
    MemoryTokenStore, RenewalRecord, RequestContext, SigningIdentity, StoreError, TokenClaims,
    TokenError, TokenService, TokenStore, VerifyError,
};

const SECRET: &str = "test-secret-key-at-least-32-characters-long";
const PRIVATE_PEM: &[u8] = include_bytes!("fixtures/rsa_private.pem");
const PUBLIC_PEM: &[u8] = include_bytes!("fixtures/rsa_public.pem");

pub struct TestApp {
    pub store: Arc<MemoryTokenStore>,
    pub service: TokenService,
    pub ctx: RequestContext,
}

async fn spawn_app() -> TestApp {
    let _ = init_telemetry("debug");

    let store = Arc::new(MemoryTokenStore::new());
    let ctx = RequestContext::new();
    store.create(&ctx).await.expect("Failed to create store");

    TestApp {
        service: TokenService::new(store.clone()),
        store,
        ctx,
    }
}

fn hmac_identity() -> SigningIdentity {
    SigningIdentity::hmac("key1", SECRET, Algorithm::HS256).with_validity(Validity::new(900, 3600))
}

fn rsa_identity() -> SigningIdentity {
    SigningIdentity::rsa("rsa1", PRIVATE_PEM, PUBLIC_PEM, Algorithm::RS256)
        .with_validity(Validity::new(900, 3600))
}

fn alice_claims() -> TokenClaims {
    TokenClaims::new(AccessClaims::new(
        "alice",
        "https://auth.example.com",
        "web-client",
        "read",
        Some(vec!["reader".to_string(), "writer".to_string()]),
        900,
    ))
}

/// Plant a record whose access token expired `age` seconds ago and whose
/// renewal window ends at `window_end`.
async fn plant_record(
    app: &TestApp,
    identity: &SigningIdentity,
    age: i64,
    window_end: chrono::DateTime<Utc>,
    with_identity_token: bool,
) -> (String, String, i64) {
    let key = identity.resolve().unwrap();
    let mut access = alice_claims().access;
    access.standard.iat -= 900 + age;
    access.standard.exp -= 900 + age;
    let access_token = sign_claims(&key, &access).unwrap();

    let id_token = with_identity_token.then(|| {
        let claims = TokenClaims::new(access.clone()).with_identity(IdentityProfile {
            email: Some("alice@example.com".to_string()),
            ..Default::default()
        });
        sign_claims(&key, claims.identity.as_ref().unwrap()).unwrap()
    });

    let record_id = derive_record_id(&access_token);
    app.store
        .store(
            &app.ctx,
            &RenewalRecord {
                record_id: record_id.clone(),
                access_token: access_token.clone(),
                id_token,
                expiry: window_end,
            },
        )
        .await
        .unwrap();

    (encode_handle(&record_id), access_token, access.standard.iat)
}

// --- Issuance ---

#[tokio::test]
async fn issue_then_verify_round_trips_standard_claims() {
    let app = spawn_app().await;

    for identity in [hmac_identity(), rsa_identity()] {
        let bundle = app
            .service
            .issue(&app.ctx, &identity, &alice_claims())
            .await
            .expect("Failed to issue");

        let claims = verify_token(&bundle.access_token, &identity.resolve().unwrap())
            .expect("Failed to verify");

        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["iss"], "https://auth.example.com");
        assert_eq!(claims["aud"], "web-client");
        assert!(claims["iat"].as_i64().unwrap() < claims["exp"].as_i64().unwrap());
    }
}

#[tokio::test]
async fn issued_bundle_matches_stored_record() {
    let app = spawn_app().await;
    let claims = TokenClaims::new(AccessClaims::new("alice", "iss", "aud", "read", None, 900));

    let bundle = app
        .service
        .issue(&app.ctx, &hmac_identity(), &claims)
        .await
        .unwrap();

    assert_eq!(bundle.expires_in, 900);
    assert_eq!(bundle.token_type, "Bearer");

    let record_id = decode_handle(bundle.refresh_token.as_deref().unwrap()).unwrap();
    let record = app.store.get(&app.ctx, &record_id).await.unwrap();
    assert_eq!(record.access_token, bundle.access_token);
    assert!(record.expiry > Utc::now() + Duration::seconds(3500));
}

// --- Renewal ---

#[tokio::test]
async fn renewal_of_expired_access_token_succeeds() {
    let app = spawn_app().await;

    for identity in [hmac_identity(), rsa_identity()] {
        let (handle, previous, previous_iat) =
            plant_record(&app, &identity, 60, Utc::now() + Duration::hours(1), false).await;

        let renewed = app
            .service
            .renew(&app.ctx, &identity, &handle)
            .await
            .expect("Renewal should tolerate an expired access token");

        assert_eq!(renewed.refresh_token.as_deref(), Some(handle.as_str()));
        assert_ne!(renewed.access_token, previous);

        let claims = verify_token(&renewed.access_token, &identity.resolve().unwrap()).unwrap();
        assert!(claims["iat"].as_i64().unwrap() > previous_iat);
        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["scope"], "read");
        assert_eq!(claims["roles"], serde_json::json!(["reader", "writer"]));
    }
}

#[tokio::test]
async fn renewal_keeps_the_renewal_window_fixed() {
    let app = spawn_app().await;
    let window_end = Utc::now() + Duration::minutes(30);
    let (handle, _, _) = plant_record(&app, &hmac_identity(), 60, window_end, false).await;

    app.service
        .renew(&app.ctx, &hmac_identity(), &handle)
        .await
        .unwrap();
    app.service
        .renew(&app.ctx, &hmac_identity(), &handle)
        .await
        .unwrap();

    let record = app
        .store
        .get(&app.ctx, &decode_handle(&handle).unwrap())
        .await
        .unwrap();
    assert_eq!(record.expiry, window_end);
}

#[tokio::test]
async fn renewal_reissues_identity_token() {
    let app = spawn_app().await;
    let identity = rsa_identity();
    let (handle, _, previous_iat) =
        plant_record(&app, &identity, 60, Utc::now() + Duration::hours(1), true).await;

    let renewed = app.service.renew(&app.ctx, &identity, &handle).await.unwrap();

    let id_claims = verify_token(renewed.id_token.as_deref().unwrap(), &identity.resolve().unwrap())
        .expect("Renewed identity token should be valid");
    assert_eq!(id_claims["email"], "alice@example.com");
    assert!(id_claims["iat"].as_i64().unwrap() > previous_iat);

    let record = app
        .store
        .get(&app.ctx, &decode_handle(&handle).unwrap())
        .await
        .unwrap();
    assert_eq!(record.id_token, renewed.id_token);
}

#[tokio::test]
async fn renewal_after_window_fails_and_leaves_record() {
    let app = spawn_app().await;
    let (handle, previous, _) =
        plant_record(&app, &hmac_identity(), 60, Utc::now() - Duration::seconds(5), false).await;

    let result = app.service.renew(&app.ctx, &hmac_identity(), &handle).await;
    assert!(matches!(result, Err(TokenError::RenewalExpired)));

    // Terminal: a second attempt fails the same way.
    let again = app.service.renew(&app.ctx, &hmac_identity(), &handle).await;
    assert!(matches!(again, Err(TokenError::RenewalExpired)));

    let record = app
        .store
        .get(&app.ctx, &decode_handle(&handle).unwrap())
        .await
        .unwrap();
    assert_eq!(record.access_token, previous);
}

#[tokio::test]
async fn renewal_with_tampered_stored_token_fails() {
    let app = spawn_app().await;
    let (handle, previous, _) =
        plant_record(&app, &hmac_identity(), 60, Utc::now() + Duration::hours(1), false).await;
    let record_id = decode_handle(&handle).unwrap();

    // Flip the signature of the stored token.
    let tampered = format!("{}X", previous);
    app.store
        .update(&app.ctx, &record_id, &tampered, None)
        .await
        .unwrap();

    let result = app.service.renew(&app.ctx, &hmac_identity(), &handle).await;
    assert!(matches!(result, Err(TokenError::TokenInvalid(_))));

    let record = app.store.get(&app.ctx, &record_id).await.unwrap();
    assert_eq!(record.access_token, tampered);
}

#[tokio::test]
async fn renewal_with_other_family_fails() {
    let app = spawn_app().await;
    let (handle, _, _) =
        plant_record(&app, &hmac_identity(), 60, Utc::now() + Duration::hours(1), false).await;

    let result = app.service.renew(&app.ctx, &rsa_identity(), &handle).await;

    assert!(matches!(result, Err(TokenError::TokenInvalid(_))));
}

#[tokio::test]
async fn renewal_with_unknown_or_malformed_handle_fails() {
    let app = spawn_app().await;

    let unknown = encode_handle(&derive_record_id("no.such.token"));
    let result = app.service.renew(&app.ctx, &hmac_identity(), &unknown).await;
    assert!(matches!(result, Err(TokenError::Store(StoreError::NotFound(_)))));

    let result = app.service.renew(&app.ctx, &hmac_identity(), "!!!").await;
    assert!(matches!(result, Err(TokenError::HandleDecode(_))));
}

// --- Verification ---

#[tokio::test]
async fn symmetric_token_rejected_by_asymmetric_verifier() {
    let app = spawn_app().await;
    let bundle = app
        .service
        .issue(&app.ctx, &hmac_identity(), &alice_claims())
        .await
        .unwrap();

    let result = verify_token(&bundle.access_token, &rsa_identity().resolve().unwrap());

    assert!(matches!(result, Err(VerifyError::Invalid(_))));
}

#[tokio::test]
async fn resource_server_verifies_with_public_key_only() {
    let app = spawn_app().await;
    let bundle = app
        .service
        .issue(&app.ctx, &rsa_identity(), &alice_claims())
        .await
        .unwrap();

    let public_only = ResolvedKey::rsa_public("rsa1", Algorithm::RS256, PUBLIC_PEM).unwrap();
    let claims = verify_token(&bundle.access_token, &public_only).expect("Failed to verify");

    assert_eq!(claims["sub"], "alice");
    assert_eq!(claims["aud"], "web-client");
}

#[tokio::test]
async fn oversized_refresh_lifetime_is_an_error() {
    let app = spawn_app().await;
    let identity =
        SigningIdentity::hmac("key1", SECRET, Algorithm::HS256).with_validity(Validity::new(900, i64::MAX));

    let result = app.service.issue(&app.ctx, &identity, &alice_claims()).await;

    assert!(matches!(result, Err(TokenError::InvalidLifetime(_))));
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn key_ring_verifies_tokens_from_several_keys() {
    let app = spawn_app().await;
    let ring = KeyRing::new();
    ring.add_hmac_key("key1", SECRET).unwrap();
    ring.add_rsa_key("rsa1", PRIVATE_PEM, PUBLIC_PEM).unwrap();

    for key_id in ["key1", "rsa1"] {
        let identity = ring.identity(key_id, Validity::new(300, 0)).unwrap();
        let bundle = app
            .service
            .issue(&app.ctx, &identity, &alice_claims())
            .await
            .unwrap();

        assert!(bundle.refresh_token.is_none());
        assert_eq!(ring.verify(&bundle.access_token).unwrap()["sub"], "alice");
    }
}

// --- Concurrency ---

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_issuance_for_distinct_subjects() {
    let app = spawn_app().await;

    let mut handles = Vec::new();
    for i in 0..32 {
        let service = app.service.clone();
        handles.push(tokio::spawn(async move {
            let claims = TokenClaims::new(AccessClaims::new(
                &format!("user-{}", i),
                "iss",
                "aud",
                "",
                None,
                900,
            ));
            service
                .issue(&RequestContext::new(), &hmac_identity(), &claims)
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().expect("Concurrent issuance failed");
    }
    assert_eq!(app.store.len(), 32);
}
