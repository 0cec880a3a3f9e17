//! TOTP enrollment and login against the in-memory backend.

mod common;

use std::sync::Arc;

use common::{Harness, test_now, totp_code, wrong_code};
use time::Duration;
use tokio::sync::Barrier;
use warden_auth::{AuthConfig, AuthError, Principal, RoleHierarchy, SecondFactor};

fn alice() -> Principal {
    Principal::new("alice", ["ROLE_EDITOR"]).with_email("alice@example.com")
}

#[tokio::test]
async fn enrollment_and_login() {
    let harness = Harness::new();
    let now = test_now();

    let secret = harness
        .two_factor
        .generate_secret_at("alice", now)
        .await
        .unwrap();
    let uri = harness.two_factor.provisioning_uri(&secret, &alice()).unwrap();
    assert!(uri.starts_with("otpauth://totp/"));
    assert!(!harness.two_factor.is_two_factor_enabled("alice").await.unwrap());

    let backup_codes = harness
        .two_factor
        .enable_two_factor_at("alice", &totp_code(&secret, now), now)
        .await
        .unwrap()
        .expect("first code confirms the secret");
    assert_eq!(backup_codes.len(), 10);
    assert!(harness.two_factor.is_two_factor_enabled("alice").await.unwrap());

    let pending = harness
        .two_factor
        .begin_login_at(alice(), "main", now)
        .unwrap();
    let hierarchy = RoleHierarchy::new(
        [("ROLE_EDITOR".to_string(), vec!["ROLE_USER".to_string()])]
            .into_iter()
            .collect(),
    );
    assert!(hierarchy.reachable_roles_for(&pending).is_empty());

    let at = now + Duration::minutes(2);
    let token = harness
        .two_factor
        .complete_login_at(&pending, SecondFactor::Totp(&totp_code(&secret, at)), at)
        .await
        .unwrap()
        .expect("valid code completes the login");

    assert!(token.is_fully_authenticated());
    assert!(hierarchy.is_granted(&token, "ROLE_USER"));
}

#[tokio::test]
async fn lockout_then_time_based_reset() {
    let harness = Harness::new();
    let now = test_now();
    let secret = harness
        .two_factor
        .generate_secret_at("alice", now)
        .await
        .unwrap();
    let wrong = wrong_code(&secret, now);

    for _ in 0..5 {
        assert!(
            !harness
                .two_factor
                .verify_code_at("alice", &wrong, now)
                .await
                .unwrap()
        );
    }

    // Even a correct code is refused while locked.
    let err = harness
        .two_factor
        .verify_code_at("alice", &totp_code(&secret, now), now)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TwoFactorLocked { .. }));
    assert!(err.is_policy_violation());

    let later = now + Duration::minutes(15) + Duration::seconds(1);
    assert!(
        harness
            .two_factor
            .verify_code_at("alice", &totp_code(&secret, later), later)
            .await
            .unwrap()
    );
    assert_eq!(harness.totp_storage.get("alice").unwrap().failed_attempts, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_guesses_stop_at_the_attempt_limit() {
    let harness = Arc::new(Harness::new());
    let now = test_now();
    let secret = harness
        .two_factor
        .generate_secret_at("alice", now)
        .await
        .unwrap();
    let wrong = Arc::new(wrong_code(&secret, now));
    let barrier = Arc::new(Barrier::new(64));

    let tasks: Vec<_> = (0..64)
        .map(|_| {
            let harness = harness.clone();
            let wrong = wrong.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                harness.two_factor.verify_code_at("alice", &wrong, now).await
            })
        })
        .collect();

    let mut evaluated = 0;
    let mut locked = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(accepted) => {
                assert!(!accepted);
                evaluated += 1;
            }
            Err(AuthError::TwoFactorLocked { .. }) => locked += 1,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    assert_eq!(evaluated, 5);
    assert_eq!(locked, 59);
    assert_eq!(harness.totp_storage.get("alice").unwrap().failed_attempts, 5);
}

#[tokio::test]
async fn custom_lockout_threshold() {
    let config = AuthConfig::from_toml_str(
        r#"
        [two_factor]
        max_failed_attempts = 2
        lockout_duration = "1m"
        "#,
    )
    .unwrap();
    let harness = Harness::with_config(config);
    let now = test_now();
    let secret = harness
        .two_factor
        .generate_secret_at("alice", now)
        .await
        .unwrap();
    let wrong = wrong_code(&secret, now);

    harness.two_factor.verify_code_at("alice", &wrong, now).await.unwrap();
    harness.two_factor.verify_code_at("alice", &wrong, now).await.unwrap();

    let err = harness
        .two_factor
        .verify_code_at("alice", &wrong, now)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuthError::TwoFactorLocked {
            retry_after_secs: 60
        }
    ));
}

#[tokio::test]
async fn backup_codes_are_single_use_and_regenerable() {
    let harness = Harness::new();
    let now = test_now();
    let secret = harness
        .two_factor
        .generate_secret_at("alice", now)
        .await
        .unwrap();
    let codes = harness
        .two_factor
        .enable_two_factor_at("alice", &totp_code(&secret, now), now)
        .await
        .unwrap()
        .unwrap();

    assert!(harness.two_factor.verify_backup_code("alice", &codes[0]).await.unwrap());
    assert!(!harness.two_factor.verify_backup_code("alice", &codes[0]).await.unwrap());

    let fresh = harness.two_factor.regenerate_backup_codes("alice").await.unwrap();
    assert!(!harness.two_factor.verify_backup_code("alice", &codes[1]).await.unwrap());
    assert!(harness.two_factor.verify_backup_code("alice", &fresh[1]).await.unwrap());
    assert_eq!(
        harness
            .totp_storage
            .get("alice")
            .unwrap()
            .remaining_backup_codes(),
        9
    );
}

#[tokio::test]
async fn disable_requires_fresh_enrollment() {
    let harness = Harness::new();
    let now = test_now();
    let secret = harness
        .two_factor
        .generate_secret_at("alice", now)
        .await
        .unwrap();
    harness
        .two_factor
        .enable_two_factor_at("alice", &totp_code(&secret, now), now)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        harness.two_factor.generate_secret("alice").await.unwrap_err(),
        AuthError::TwoFactorAlreadyEnabled
    ));

    assert!(harness.two_factor.disable_two_factor("alice").await.unwrap());
    assert!(harness.totp_storage.get("alice").is_none());
    assert!(matches!(
        harness
            .two_factor
            .regenerate_backup_codes("alice")
            .await
            .unwrap_err(),
        AuthError::TwoFactorNotEnabled
    ));

    let again = harness.two_factor.generate_secret("alice").await.unwrap();
    assert_ne!(again.secret, secret.secret);
}

#[tokio::test]
async fn pending_login_expires() {
    let harness = Harness::new();
    let now = test_now();
    let secret = harness
        .two_factor
        .generate_secret_at("alice", now)
        .await
        .unwrap();
    harness
        .two_factor
        .enable_two_factor_at("alice", &totp_code(&secret, now), now)
        .await
        .unwrap()
        .unwrap();

    let pending = harness
        .two_factor
        .begin_login_at(alice(), "main", now)
        .unwrap();
    assert!(!pending.is_expired_at(now + Duration::seconds(599)));
    assert!(pending.is_expired_at(now + Duration::seconds(601)));

    let at = now + Duration::seconds(601);
    let result = harness
        .two_factor
        .complete_login_at(&pending, SecondFactor::Totp(&totp_code(&secret, at)), at)
        .await
        .unwrap();
    assert!(result.is_none());
}
