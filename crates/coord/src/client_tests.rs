// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn backoff_doubles_to_the_cap() {
    let mut backoff = Backoff::default();
    assert_eq!(backoff.next_delay(), Duration::from_millis(250));
    assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    for _ in 0..10 {
        backoff.next_delay();
    }
    assert_eq!(backoff.next_delay(), BACKOFF_CAP);

    backoff.reset();
    assert_eq!(backoff.next_delay(), BACKOFF_INITIAL);
}

#[test]
fn transient_classification() {
    assert!(CoordError::NoEndpoints.is_transient());
    assert!(CoordError::Unreachable("x".into()).is_transient());
    assert!(!CoordError::Remote("refused".into()).is_transient());
    assert!(!CoordError::UnexpectedResponse("poll").is_transient());
}

#[tokio::test]
async fn empty_endpoint_source_fails_fast() {
    let client = CoordinatorClient::new(
        Arc::new(crate::endpoints::StaticEndpoints::new(vec![])),
        &TlsConfig::default(),
    )
    .unwrap();
    let err = client
        .request(&Request::Heartbeat, DEFAULT_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::NoEndpoints));
}

#[tokio::test]
async fn unreachable_endpoint_is_transient() {
    // Reserved port on localhost that nothing listens on
    let client = CoordinatorClient::new(
        Arc::new(crate::endpoints::StaticEndpoints::new(vec![
            "127.0.0.1:9".into()
        ])),
        &TlsConfig::default(),
    )
    .unwrap();
    let err = client
        .request(&Request::Heartbeat, DEFAULT_TIMEOUT)
        .await
        .unwrap_err();
    assert!(err.is_transient());
}
