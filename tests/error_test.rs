use std::time::Duration;

use hifadhi::{HifadhiError, Result};

#[test]
fn test_error_display() {
    let err = HifadhiError::InstallAssetFetch {
        url: "https://harambee.example/app.js".into(),
        reason: "server answered 404 Not Found".into(),
    };
    assert!(err.to_string().contains("/app.js"));
    assert!(err.to_string().contains("404"));
}

#[test]
fn test_invalid_state() {
    let err = HifadhiError::InvalidState("activate");
    assert!(err.to_string().contains("activate"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(HifadhiError::Store("gone".into()))
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(HifadhiError::Network("connection refused".into()).is_transient());
    assert!(HifadhiError::Http("connection reset".into()).is_transient());
    assert!(HifadhiError::RateLimited { retry_after: None }.is_transient());
    for status in [408, 429, 500, 502, 503] {
        assert!(
            HifadhiError::Api {
                status,
                message: String::new()
            }
            .is_transient(),
            "{status}"
        );
    }
}

#[test]
fn permanent_errors() {
    for status in [400, 401, 404, 409] {
        assert!(
            !HifadhiError::Api {
                status,
                message: String::new()
            }
            .is_transient(),
            "{status}"
        );
    }
    assert!(!HifadhiError::Store("disk full".into()).is_transient());
    assert!(!HifadhiError::InvalidRequest("bad url".into()).is_transient());
    assert!(!HifadhiError::Configuration("bad".into()).is_transient());
    assert!(!HifadhiError::InvalidState("install").is_transient());
}

#[test]
fn retry_after_hint() {
    let err = HifadhiError::RateLimited {
        retry_after: Some(Duration::from_secs(3)),
    };
    assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    assert_eq!(HifadhiError::Network("x".into()).retry_after(), None);
}

#[test]
fn offline_classification() {
    assert!(HifadhiError::Network("dns".into()).is_offline());
    assert!(
        !HifadhiError::Api {
            status: 503,
            message: String::new()
        }
        .is_offline()
    );
}

#[tokio::test]
async fn connection_refused_maps_to_network() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let err = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{port}/"))
        .send()
        .await
        .unwrap_err();
    let err = HifadhiError::from(err);
    assert!(matches!(err, HifadhiError::Network(_)), "{err:?}");
    assert!(err.is_offline());
}
