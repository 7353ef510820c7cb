// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn unconfigured_is_plaintext() {
    let cfg = TlsConfig::default();
    assert!(!cfg.server_enabled());
    assert!(!cfg.client_enabled());
    assert!(cfg.acceptor().unwrap().is_none());
    assert!(cfg.connector().unwrap().is_none());
}

#[test]
fn skip_verify_enables_the_client_side_only() {
    let cfg = TlsConfig {
        skip_tls_verify: true,
        ..Default::default()
    };
    assert!(!cfg.server_enabled());
    assert!(cfg.client_enabled());
    assert!(cfg.connector().unwrap().is_some());
}

#[test]
fn missing_cert_file_is_an_io_error() {
    let cfg = TlsConfig {
        cert_file: Some(PathBuf::from("/nonexistent/server.crt")),
        key_file: Some(PathBuf::from("/nonexistent/server.key")),
        ..Default::default()
    };
    assert!(matches!(cfg.acceptor(), Err(TlsError::Io { .. })));
}

#[test]
fn empty_pem_has_no_certs() {
    let tmp = tempfile::tempdir().unwrap();
    let cert = tmp.path().join("empty.crt");
    std::fs::write(&cert, "").unwrap();
    let key = tmp.path().join("empty.key");
    std::fs::write(&key, "").unwrap();

    let cfg = TlsConfig {
        cert_file: Some(cert),
        key_file: Some(key),
        ..Default::default()
    };
    assert!(matches!(cfg.acceptor(), Err(TlsError::NoCerts(_))));
}

#[test]
fn server_name_accepts_dns_and_rejects_garbage() {
    assert!(server_name("coordinator.internal").is_ok());
    assert!(server_name("not a hostname").is_err());
}

#[test]
fn config_deserializes_from_toml_fragment() {
    let cfg: TlsConfig = toml::from_str(
        r#"
            cert_file = "/etc/dagrun/server.crt"
            key_file = "/etc/dagrun/server.key"
            skip_tls_verify = false
        "#,
    )
    .unwrap();
    assert!(cfg.server_enabled());
    assert!(!cfg.skip_tls_verify);
}
