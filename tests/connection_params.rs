use std::path::PathBuf;
use table_properties::connection::{ConnectionParams, DEFAULT_HOST, DEFAULT_NATIVE_CQL_PORT};
use table_properties::error::{ConfigFileError, Error};

fn setup_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("setup")
        .join(name)
}

#[test]
fn defaults() {
    let cp = ConnectionParams::new();
    assert_eq!(cp.hosts(), [DEFAULT_HOST.to_string()]);
    assert_eq!(cp.port(), DEFAULT_NATIVE_CQL_PORT);
    assert_eq!(cp.port(), 9042);
    assert!(cp.auth_provider().is_none());
    assert!(!cp.is_ssl_required());
    assert!(cp.ssl_context().is_none());
    assert_eq!(cp.known_nodes(), ["localhost:9042"]);
}

#[test]
fn username_password_update() {
    let mut cp = ConnectionParams::new();
    cp.set_username(Some("cassandra".into()));
    assert_eq!(cp.username(), Some("cassandra"));
    assert!(cp.auth_provider().is_none());

    cp.set_password(Some("cassandra".into()));
    assert_eq!(cp.password(), Some("cassandra"));
    let auth = cp.auth_provider().expect("auth provider after both credentials");
    assert_eq!(auth.username(), "cassandra");
    assert_eq!(auth.password(), "cassandra");

    cp.set_password(None);
    assert!(cp.auth_provider().is_none());
}

#[test]
fn password_first_then_username() {
    let mut cp = ConnectionParams::new();
    cp.set_password(Some("secret".into()));
    assert!(cp.auth_provider().is_none());
    cp.set_username(Some("reader".into()));
    assert!(cp.auth_provider().is_some());
    cp.set_username(Some(String::new()));
    assert!(cp.auth_provider().is_none());
}

#[test]
fn debug_output_redacts_password() {
    let mut cp = ConnectionParams::new();
    cp.set_username(Some("reader".into()));
    cp.set_password(Some("hunter2".into()));
    let rendered = format!("{cp:?} {:?}", cp.auth_provider());
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("reader"));
}

#[test]
fn security_context() {
    let mut cp = ConnectionParams::new();
    assert!(cp.ssl_context().is_none());
    cp.set_ssl_required(true).expect("default TLS context");
    assert!(cp.is_ssl_required());
    assert!(cp.ssl_context().is_some());

    cp.set_ssl_validate(false).expect("rebuild TLS context");
    assert!(cp.ssl_context().is_some());

    cp.set_ssl_required(false).expect("clear TLS context");
    assert!(cp.ssl_context().is_none());
}

#[test]
fn missing_ca_file_leaves_params_unchanged() {
    let mut cp = ConnectionParams::new();
    cp.set_ssl_required(true).expect("default TLS context");
    let err = cp
        .set_ssl_ca_file(Some(setup_file("no-such-ca.pem")))
        .unwrap_err();
    assert!(matches!(err, Error::Tls(_)));
    assert!(cp.ssl_ca_file().is_none());
    assert!(cp.ssl_context().is_some());
}

#[test]
fn ipv6_hosts_are_bracketed() {
    let mut cp = ConnectionParams::new();
    cp.set_hosts(["::1", "10.0.0.5"]);
    cp.set_port(19042);
    assert_eq!(cp.known_nodes(), ["[::1]:19042", "10.0.0.5:19042"]);
}

#[test]
fn load_rc() {
    let cp = ConnectionParams::load_from_rcfile(setup_file("cqlshrc")).expect("load cqlshrc");
    assert_eq!(cp.hosts(), ["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
    assert_eq!(cp.port(), 9142);
    assert_eq!(cp.username(), Some("cassandra"));
    assert_eq!(cp.password(), Some("cassandra"));
    assert!(cp.auth_provider().is_some());
    assert!(!cp.is_ssl_required());
    assert!(cp.ssl_context().is_none());
}

#[test]
fn load_rc_with_credentials_in_connection_section() {
    let cp = ConnectionParams::load_from_rcfile(setup_file("cqlshrc_inline_credentials"))
        .expect("load cqlshrc");
    assert_eq!(cp.hosts(), ["db.internal".to_string()]);
    assert_eq!(cp.port(), DEFAULT_NATIVE_CQL_PORT);
    assert_eq!(cp.username(), Some("reader"));
    assert!(cp.auth_provider().is_some());
}

#[test]
fn load_nonexisting_rc() {
    let err = ConnectionParams::load_from_rcfile(setup_file("cqlshrc1234")).unwrap_err();
    assert!(matches!(
        err,
        Error::ConfigFile(ConfigFileError::NotFound(_))
    ));
}

#[test]
fn load_malformed_rc() {
    let err = ConnectionParams::load_from_rcfile(setup_file("cqlshrc_malformed")).unwrap_err();
    assert!(matches!(err, Error::ConfigFile(ConfigFileError::Parse { .. })));
}

#[test]
fn load_rc_without_connection_section() {
    let err =
        ConnectionParams::load_from_rcfile(setup_file("cqlshrc_no_connection")).unwrap_err();
    assert!(matches!(err, Error::ConfigFile(ConfigFileError::Parse { .. })));
}

#[test]
fn load_rc_with_bad_port() {
    let err = ConnectionParams::load_from_rcfile(setup_file("cqlshrc_bad_port")).unwrap_err();
    match err {
        Error::ConfigFile(ConfigFileError::InvalidValue { key, value }) => {
            assert_eq!(key, "connection.port");
            assert_eq!(value, "ninety");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn load_rc_with_ssl_section() {
    let cp = ConnectionParams::load_from_rcfile(setup_file("cqlshrc_ssl")).expect("load cqlshrc");
    assert!(cp.is_ssl_required());
    assert!(!cp.ssl_validate());
    assert!(cp.ssl_ca_file().is_none());
    assert!(cp.ssl_context().is_some());
}

#[test]
fn load_rc_with_missing_certfile() {
    let err = ConnectionParams::load_from_rcfile(setup_file("cqlshrc_ssl_missing_certfile"))
        .unwrap_err();
    assert!(matches!(err, Error::Tls(_)));
}

#[test]
fn load_rc_with_bad_bool() {
    let err = ConnectionParams::load_from_rcfile(setup_file("cqlshrc_bad_bool")).unwrap_err();
    match err {
        Error::ConfigFile(ConfigFileError::InvalidValue { key, value }) => {
            assert_eq!(key, "connection.ssl");
            assert_eq!(value, "maybe");
        }
        other => panic!("unexpected error: {other}"),
    }
}
