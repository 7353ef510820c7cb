// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::proto::{Request, Response};
use std::collections::BTreeMap;

#[tokio::test]
async fn round_trip_over_a_duplex_pipe() {
    let (mut client, mut server) = tokio::io::duplex(64 * 1024);

    let request = Request::Poll {
        worker_id: "host@1".into(),
        poller_id: "p1".into(),
        labels: BTreeMap::from([("gpu".to_string(), "a100".to_string())]),
        timeout_secs: 30,
    };
    let data = encode(&request).unwrap();
    write_message(&mut client, &data).await.unwrap();

    let bytes = read_message(&mut server).await.unwrap();
    let decoded: Request = decode(&bytes).unwrap();
    match decoded {
        Request::Poll {
            worker_id, labels, ..
        } => {
            assert_eq!(worker_id, "host@1");
            assert_eq!(labels["gpu"], "a100");
        }
        other => panic!("unexpected request: {other:?}"),
    }
}

#[tokio::test]
async fn closed_pipe_reads_as_connection_closed() {
    let (client, mut server) = tokio::io::duplex(1024);
    drop(client);
    assert!(matches!(
        read_message(&mut server).await,
        Err(WireError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn oversized_length_prefix_is_rejected() {
    let (mut client, mut server) = tokio::io::duplex(1024);
    tokio::io::AsyncWriteExt::write_all(&mut client, &u32::MAX.to_be_bytes())
        .await
        .unwrap();
    assert!(matches!(
        read_message(&mut server).await,
        Err(WireError::MessageTooLarge { .. })
    ));
}

#[tokio::test]
async fn read_with_timeout_times_out() {
    let (_client, mut server) = tokio::io::duplex(1024);
    let result: Result<Response, WireError> =
        read_with_timeout(&mut server, std::time::Duration::from_millis(50)).await;
    assert!(matches!(result, Err(WireError::Timeout)));
}
