pub mod error {
    use std::path::PathBuf;

    #[derive(Debug, thiserror::Error)]
    pub enum ConfigFileError {
        #[error("config file not found: {}", .0.display())]
        NotFound(PathBuf),
        #[error("failed to read config file {}: {source}", path.display())]
        Io {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("malformed config file {}: {message}", path.display())]
        Parse { path: PathBuf, message: String },
        #[error("invalid value {value:?} for {key}")]
        InvalidValue { key: String, value: String },
    }

    #[derive(Debug, thiserror::Error)]
    pub enum Error {
        /// No contact point accepted a connection. The driver error is logged,
        /// not carried, so nothing about the cluster leaks to the caller.
        #[error("failed to connect to the cluster, see log for details")]
        Connectivity,
        #[error(transparent)]
        ConfigFile(#[from] ConfigFileError),
        #[error(transparent)]
        Execution(#[from] scylla::transport::errors::QueryError),
        #[error("failed to build TLS context: {0}")]
        Tls(#[from] openssl::error::ErrorStack),
        #[error("catalog row is missing column {0:?}")]
        MissingColumn(&'static str),
    }

    pub type Result<T, E = Error> = std::result::Result<T, E>;
}

pub mod schema {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as B64;
    use scylla_cql::frame::response::result::CqlValue;
    use serde_json::{Map, Number, Value};
    use uuid::Uuid;

    /// Catalog column value, decoded once from the driver's `CqlValue` so the
    /// reshaping code can match on shape instead of probing types per field.
    #[derive(Debug, Clone, PartialEq)]
    pub enum CatalogValue {
        Null,
        Bool(bool),
        Int(i64),
        Float(f64),
        Text(String),
        Uuid(Uuid),
        Blob(Vec<u8>),
        List(Vec<CatalogValue>),
        Set(Vec<CatalogValue>),
        Map(Vec<(String, CatalogValue)>),
    }

    impl CatalogValue {
        pub fn type_name(&self) -> &'static str {
            match self {
                CatalogValue::Null => "null",
                CatalogValue::Bool(_) => "bool",
                CatalogValue::Int(_) => "int",
                CatalogValue::Float(_) => "float",
                CatalogValue::Text(_) => "text",
                CatalogValue::Uuid(_) => "uuid",
                CatalogValue::Blob(_) => "blob",
                CatalogValue::List(_) => "list",
                CatalogValue::Set(_) => "set",
                CatalogValue::Map(_) => "map",
            }
        }

        pub fn as_text(&self) -> Option<&str> {
            match self {
                CatalogValue::Text(s) => Some(s),
                _ => None,
            }
        }

        pub fn from_cql(v: &CqlValue) -> Self {
            match v {
                CqlValue::Empty => CatalogValue::Null,
                CqlValue::Boolean(b) => CatalogValue::Bool(*b),
                CqlValue::TinyInt(i) => CatalogValue::Int(i64::from(*i)),
                CqlValue::SmallInt(i) => CatalogValue::Int(i64::from(*i)),
                CqlValue::Int(i) => CatalogValue::Int(i64::from(*i)),
                CqlValue::BigInt(i) => CatalogValue::Int(*i),
                CqlValue::Float(f) => CatalogValue::Float(f64::from(*f)),
                CqlValue::Double(f) => CatalogValue::Float(*f),
                CqlValue::Ascii(s) | CqlValue::Text(s) => CatalogValue::Text(s.clone()),
                CqlValue::Uuid(u) => CatalogValue::Uuid(*u),
                CqlValue::Inet(addr) => CatalogValue::Text(addr.to_string()),
                CqlValue::Blob(bytes) => CatalogValue::Blob(bytes.clone()),
                CqlValue::List(items) => {
                    CatalogValue::List(items.iter().map(CatalogValue::from_cql).collect())
                }
                CqlValue::Set(items) => {
                    CatalogValue::Set(items.iter().map(CatalogValue::from_cql).collect())
                }
                CqlValue::Map(entries) => CatalogValue::Map(
                    entries
                        .iter()
                        .map(|(k, v)| (cql_map_key_to_string(k), CatalogValue::from_cql(v)))
                        .collect(),
                ),
                CqlValue::Tuple(values) => CatalogValue::List(
                    values
                        .iter()
                        .map(|opt| {
                            opt.as_ref()
                                .map(CatalogValue::from_cql)
                                .unwrap_or(CatalogValue::Null)
                        })
                        .collect(),
                ),
                _ => CatalogValue::Text(format!("{:?}", v)),
            }
        }

        pub fn to_json(&self) -> Value {
            match self {
                CatalogValue::Null => Value::Null,
                CatalogValue::Bool(b) => Value::Bool(*b),
                CatalogValue::Int(i) => Value::from(*i),
                CatalogValue::Float(f) => {
                    Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null)
                }
                CatalogValue::Text(s) => Value::from(s.clone()),
                CatalogValue::Uuid(u) => Value::from(u.to_string()),
                CatalogValue::Blob(bytes) => Value::from(B64.encode(bytes)),
                CatalogValue::List(items) | CatalogValue::Set(items) => {
                    Value::Array(items.iter().map(CatalogValue::to_json).collect())
                }
                CatalogValue::Map(entries) => Value::Object(
                    entries
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_json()))
                        .collect::<Map<String, Value>>(),
                ),
            }
        }
    }

    fn cql_map_key_to_string(k: &CqlValue) -> String {
        match k {
            CqlValue::Ascii(s) | CqlValue::Text(s) => s.clone(),
            CqlValue::Uuid(u) => u.to_string(),
            CqlValue::Int(i) => i.to_string(),
            CqlValue::BigInt(i) => i.to_string(),
            _ => format!("{:?}", k),
        }
    }

    /// One catalog row: column names paired with decoded values, in the order
    /// the driver returned the columns.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Row {
        columns: Vec<(String, CatalogValue)>,
    }

    impl Row {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, name: impl Into<String>, value: CatalogValue) -> Self {
            self.columns.push((name.into(), value));
            self
        }

        pub fn from_cql(names: &[String], row: &scylla_cql::frame::response::result::Row) -> Self {
            names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let value = row
                        .columns
                        .get(i)
                        .and_then(|o| o.as_ref())
                        .map(CatalogValue::from_cql)
                        .unwrap_or(CatalogValue::Null);
                    (name.clone(), value)
                })
                .collect()
        }

        pub fn get(&self, name: &str) -> Option<&CatalogValue> {
            self.columns
                .iter()
                .find(|(column, _)| column == name)
                .map(|(_, value)| value)
        }

        pub fn iter(&self) -> impl Iterator<Item = (&str, &CatalogValue)> {
            self.columns.iter().map(|(k, v)| (k.as_str(), v))
        }

        pub fn len(&self) -> usize {
            self.columns.len()
        }

        pub fn is_empty(&self) -> bool {
            self.columns.is_empty()
        }
    }

    impl FromIterator<(String, CatalogValue)> for Row {
        fn from_iter<I: IntoIterator<Item = (String, CatalogValue)>>(iter: I) -> Self {
            Self {
                columns: iter.into_iter().collect(),
            }
        }
    }

    impl IntoIterator for Row {
        type Item = (String, CatalogValue);
        type IntoIter = std::vec::IntoIter<(String, CatalogValue)>;

        fn into_iter(self) -> Self::IntoIter {
            self.columns.into_iter()
        }
    }
}

pub mod normalize {
    //! Reshaping of catalog values into the exported document form.

    use crate::schema::CatalogValue;
    use serde_json::{Map, Number, Value, json};

    /// Strips the Java package from a fully qualified class name.
    ///
    /// `org.apache.cassandra.locator.NetworkTopologyStrategy` becomes
    /// `NetworkTopologyStrategy`.
    pub fn class_name(full_class_name: &str) -> &str {
        full_class_name
            .rsplit('.')
            .next()
            .unwrap_or(full_class_name)
    }

    /// Integer if the text parses as one, then float, otherwise the text itself.
    pub fn convert_text(text: &str) -> Value {
        let trimmed = text.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return Value::from(n);
        }
        if let Ok(n) = trimmed.parse::<u64>() {
            return Value::from(n);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            // NaN and infinities have no JSON form.
            if let Some(n) = Number::from_f64(f) {
                return Value::Number(n);
            }
        }
        Value::String(text.to_string())
    }

    /// Text values go through [`convert_text`]; everything else is emitted as is.
    pub fn convert_value(value: &CatalogValue) -> Value {
        match value {
            CatalogValue::Text(s) => convert_text(s),
            other => other.to_json(),
        }
    }

    pub fn key_name(column: &str) -> &str {
        match column {
            "keyspace_name" | "table_name" => "name",
            other => other,
        }
    }

    /// Reshapes a replication map into `{class, replication_factor, data_centers}`.
    ///
    /// Keys other than `class` and `replication_factor` are data center names.
    /// `replication_factor` is only emitted when the map carries it. Anything
    /// that is not a map yields an empty object.
    pub fn replication_settings(value: &CatalogValue) -> Map<String, Value> {
        let CatalogValue::Map(entries) = value else {
            return Map::new();
        };

        let mut settings = Map::new();
        let mut data_centers = Vec::new();
        for (key, val) in entries {
            match key.as_str() {
                "class" => {
                    let class = match val {
                        CatalogValue::Text(s) => Value::from(class_name(s)),
                        other => other.to_json(),
                    };
                    settings.insert("class".into(), class);
                }
                "replication_factor" => {
                    settings.insert("replication_factor".into(), convert_value(val));
                }
                data_center => data_centers.push(json!({
                    "name": data_center,
                    "replication_factor": convert_value(val),
                })),
            }
        }
        settings.insert("data_centers".into(), Value::Array(data_centers));
        settings
    }

    /// Flat reshaping for compaction, compression, caching and similar maps.
    pub fn subconfig_settings(value: &CatalogValue) -> Map<String, Value> {
        let CatalogValue::Map(entries) = value else {
            return Map::new();
        };

        entries
            .iter()
            .map(|(key, val)| {
                let converted = match (key.as_str(), val) {
                    ("class", CatalogValue::Text(s)) => convert_text(class_name(s)),
                    _ => convert_value(val),
                };
                (key.clone(), converted)
            })
            .collect()
    }

    /// Table flags come back as a set; export them as a list of strings.
    pub fn flag_list(value: &CatalogValue) -> Value {
        match value {
            CatalogValue::Set(items) | CatalogValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        CatalogValue::Text(s) => Value::from(s.clone()),
                        other => Value::from(other.to_json().to_string()),
                    })
                    .collect(),
            ),
            other => other.to_json(),
        }
    }

    pub fn identifier(value: &CatalogValue) -> Value {
        match value {
            CatalogValue::Uuid(u) => Value::from(u.hyphenated().to_string()),
            other => other.to_json(),
        }
    }
}

pub mod connection {
    use crate::error::{ConfigFileError, Result};
    use ini::{Ini, Properties};
    use openssl::ssl::{SslContext, SslMethod, SslVerifyMode};
    use scylla::SessionBuilder;
    use std::fmt;
    use std::path::{Path, PathBuf};
    use tracing::debug;

    pub const DEFAULT_HOST: &str = "localhost";
    pub const DEFAULT_NATIVE_CQL_PORT: u16 = 9042;
    pub const CATALOG_KEYSPACE: &str = "system_schema";

    /// Plain-text credentials handed to the driver's SASL authenticator.
    #[derive(Clone, PartialEq, Eq)]
    pub struct PlainTextAuthProvider {
        username: String,
        password: String,
    }

    impl PlainTextAuthProvider {
        pub fn username(&self) -> &str {
            &self.username
        }

        pub fn password(&self) -> &str {
            &self.password
        }
    }

    impl fmt::Debug for PlainTextAuthProvider {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("PlainTextAuthProvider")
                .field("username", &self.username)
                .field("password", &"<redacted>")
                .finish()
        }
    }

    /// Where and how to reach the cluster.
    ///
    /// `auth_provider` and `ssl_context` are derived. Every setter that touches
    /// their inputs re-derives them, so `auth_provider` is present exactly when
    /// both username and password are set and non-empty, and `ssl_context` is
    /// present exactly when TLS is required.
    #[derive(Clone)]
    pub struct ConnectionParams {
        hosts: Vec<String>,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        ssl_required: bool,
        ssl_ca_file: Option<PathBuf>,
        ssl_validate: bool,
        auth_provider: Option<PlainTextAuthProvider>,
        ssl_context: Option<SslContext>,
    }

    impl Default for ConnectionParams {
        fn default() -> Self {
            Self {
                hosts: vec![DEFAULT_HOST.to_string()],
                port: DEFAULT_NATIVE_CQL_PORT,
                username: None,
                password: None,
                ssl_required: false,
                ssl_ca_file: None,
                ssl_validate: true,
                auth_provider: None,
                ssl_context: None,
            }
        }
    }

    impl fmt::Debug for ConnectionParams {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ConnectionParams")
                .field("hosts", &self.hosts)
                .field("port", &self.port)
                .field("username", &self.username)
                .field("password", &self.password.as_ref().map(|_| "<redacted>"))
                .field("ssl_required", &self.ssl_required)
                .field("ssl_ca_file", &self.ssl_ca_file)
                .field("ssl_validate", &self.ssl_validate)
                .field("auth_provider", &self.auth_provider.is_some())
                .field("ssl_context", &self.ssl_context.is_some())
                .finish()
        }
    }

    impl ConnectionParams {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn hosts(&self) -> &[String] {
            &self.hosts
        }

        pub fn set_hosts<I, S>(&mut self, hosts: I)
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            self.hosts = hosts.into_iter().map(Into::into).collect();
        }

        pub fn port(&self) -> u16 {
            self.port
        }

        pub fn set_port(&mut self, port: u16) {
            self.port = port;
        }

        pub fn username(&self) -> Option<&str> {
            self.username.as_deref()
        }

        pub fn set_username(&mut self, username: Option<String>) {
            self.username = username;
            self.refresh_auth_provider();
        }

        pub fn password(&self) -> Option<&str> {
            self.password.as_deref()
        }

        pub fn set_password(&mut self, password: Option<String>) {
            self.password = password;
            self.refresh_auth_provider();
        }

        pub fn auth_provider(&self) -> Option<&PlainTextAuthProvider> {
            self.auth_provider.as_ref()
        }

        pub fn is_ssl_required(&self) -> bool {
            self.ssl_required
        }

        /// Turning TLS on builds a context from the current CA file and
        /// validation settings. On failure nothing changes.
        pub fn set_ssl_required(&mut self, required: bool) -> Result<()> {
            self.ssl_context = derive_ssl_context(
                required,
                self.ssl_ca_file.as_deref(),
                self.ssl_validate,
            )?;
            self.ssl_required = required;
            Ok(())
        }

        pub fn ssl_ca_file(&self) -> Option<&Path> {
            self.ssl_ca_file.as_deref()
        }

        pub fn set_ssl_ca_file(&mut self, ca_file: Option<PathBuf>) -> Result<()> {
            self.ssl_context =
                derive_ssl_context(self.ssl_required, ca_file.as_deref(), self.ssl_validate)?;
            self.ssl_ca_file = ca_file;
            Ok(())
        }

        pub fn ssl_validate(&self) -> bool {
            self.ssl_validate
        }

        pub fn set_ssl_validate(&mut self, validate: bool) -> Result<()> {
            self.ssl_context =
                derive_ssl_context(self.ssl_required, self.ssl_ca_file.as_deref(), validate)?;
            self.ssl_validate = validate;
            Ok(())
        }

        pub fn ssl_context(&self) -> Option<&SslContext> {
            self.ssl_context.as_ref()
        }

        fn refresh_auth_provider(&mut self) {
            self.auth_provider = match (self.username.as_deref(), self.password.as_deref()) {
                (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                    Some(PlainTextAuthProvider {
                        username: user.to_string(),
                        password: pass.to_string(),
                    })
                }
                _ => None,
            };
        }

        /// Contact points in `host:port` form, bracketing bare IPv6 addresses.
        pub fn known_nodes(&self) -> Vec<String> {
            self.hosts
                .iter()
                .map(|host| {
                    if host.contains(':') && !host.starts_with('[') {
                        format!("[{}]:{}", host, self.port)
                    } else {
                        format!("{}:{}", host, self.port)
                    }
                })
                .collect()
        }

        /// Session builder scoped to the catalog keyspace.
        pub fn session_builder(&self) -> SessionBuilder {
            let mut sb = SessionBuilder::new()
                .known_nodes(self.known_nodes())
                .use_keyspace(CATALOG_KEYSPACE, false);
            if let Some(auth) = &self.auth_provider {
                sb = sb.user(auth.username(), auth.password());
            }
            if let Some(ctx) = &self.ssl_context {
                sb = sb.ssl_context(Some(ctx.clone()));
            }
            sb
        }

        /// Loads connection settings from a cqlshrc-style ini file.
        ///
        /// Reads `[connection]` (`hostname`, `port`, `ssl`), `[authentication]`
        /// (`username`, `password`, falling back to the same keys under
        /// `[connection]`) and `[ssl]` (`certfile`, `validate`).
        pub fn load_from_rcfile(path: impl AsRef<Path>) -> Result<Self> {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path).map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    ConfigFileError::NotFound(path.to_path_buf())
                } else {
                    ConfigFileError::Io {
                        path: path.to_path_buf(),
                        source,
                    }
                }
            })?;
            let ini = Ini::load_from_str(&text).map_err(|err| ConfigFileError::Parse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
            debug!(path = %path.display(), "loaded rc file");
            Self::from_ini(&ini, path)
        }

        fn from_ini(ini: &Ini, path: &Path) -> Result<Self> {
            let Some(connection) = ini.section(Some("connection")) else {
                return Err(ConfigFileError::Parse {
                    path: path.to_path_buf(),
                    message: "missing [connection] section".into(),
                }
                .into());
            };
            let authentication = ini.section(Some("authentication"));
            let ssl = ini.section(Some("ssl"));

            let mut params = Self::default();
            if let Some(hosts) = connection.get("hostname").or_else(|| connection.get("host")) {
                let hosts: Vec<&str> = hosts
                    .split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .collect();
                if hosts.is_empty() {
                    return Err(invalid_value("connection.hostname", "").into());
                }
                params.set_hosts(hosts);
            }
            if let Some(port) = connection.get("port") {
                let port = port
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| invalid_value("connection.port", port))?;
                params.set_port(port);
            }

            params.username = credential(authentication, connection, "username");
            params.password = credential(authentication, connection, "password");
            params.refresh_auth_provider();

            if let Some(certfile) = ssl.and_then(|s| s.get("certfile")) {
                params.ssl_ca_file = Some(PathBuf::from(certfile.trim()));
            }
            if let Some(validate) = ssl.and_then(|s| s.get("validate")) {
                params.ssl_validate = parse_bool("ssl.validate", validate)?;
            }
            let ssl_required = match connection.get("ssl") {
                Some(value) => parse_bool("connection.ssl", value)?,
                None => false,
            };
            params.set_ssl_required(ssl_required)?;
            Ok(params)
        }
    }

    fn derive_ssl_context(
        required: bool,
        ca_file: Option<&Path>,
        validate: bool,
    ) -> Result<Option<SslContext>> {
        if !required {
            return Ok(None);
        }
        let mut ctx = SslContext::builder(SslMethod::tls())?;
        ctx.set_default_verify_paths()?;
        if let Some(ca_file) = ca_file {
            ctx.set_ca_file(ca_file)?;
        }
        ctx.set_verify(if validate {
            SslVerifyMode::PEER
        } else {
            SslVerifyMode::NONE
        });
        Ok(Some(ctx.build()))
    }

    fn credential(
        authentication: Option<&Properties>,
        connection: &Properties,
        key: &str,
    ) -> Option<String> {
        authentication
            .and_then(|s| s.get(key))
            .or_else(|| connection.get(key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_bool(key: &str, value: &str) -> std::result::Result<bool, ConfigFileError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid_value(key, value)),
        }
    }

    fn invalid_value(key: &str, value: &str) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

pub mod executor {
    use crate::connection::ConnectionParams;
    use crate::error::{Error, Result};
    use crate::schema::Row;
    use tracing::{error, info};

    /// Runs one read-only statement against the catalog keyspace.
    #[async_trait::async_trait]
    pub trait QueryExecutor: Send + Sync {
        async fn execute(&self, statement: &str) -> Result<Vec<Row>>;
    }

    #[async_trait::async_trait]
    impl QueryExecutor for ConnectionParams {
        async fn execute(&self, statement: &str) -> Result<Vec<Row>> {
            crate::executor::execute(self, statement).await
        }
    }

    async fn connect(params: &ConnectionParams) -> Result<scylla::Session> {
        let nodes = params.known_nodes();
        info!(?nodes, "connecting to cluster");
        params.session_builder().build().await.map_err(|err| {
            error!(error = %err, ?nodes, "no host available");
            Error::Connectivity
        })
    }

    /// Opens a session, runs `statement`, and materializes every row.
    ///
    /// The session lives only for this call and is dropped on every return
    /// path. Unreachable clusters map to [`Error::Connectivity`]; any other
    /// driver error is logged and handed back unchanged.
    pub async fn execute(params: &ConnectionParams, statement: &str) -> Result<Vec<Row>> {
        let session = connect(params).await?;
        info!(%statement, "executing catalog query");
        let result = session.query_unpaged(statement, &[]).await.map_err(|err| {
            error!(error = %err, %statement, "catalog query failed");
            Error::Execution(err)
        })?;
        let names: Vec<String> = result
            .col_specs()
            .iter()
            .map(|spec| spec.name.clone())
            .collect();
        let rows = result
            .rows_or_empty()
            .iter()
            .map(|row| Row::from_cql(&names, row))
            .collect();
        Ok(rows)
    }

    pub async fn check_connection(params: &ConnectionParams) -> Result<()> {
        execute(params, "SELECT keyspace_name FROM keyspaces LIMIT 1").await?;
        Ok(())
    }
}

pub mod document {
    use serde::{Deserialize, Serialize};
    use serde_json::{Map, Value};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct ConfigDocument {
        pub keyspaces: Vec<KeyspaceConfig>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct KeyspaceConfig {
        pub name: String,
        /// `durable_writes`, the normalized `replication` object and any other
        /// catalog column, in catalog order.
        #[serde(flatten)]
        pub properties: Map<String, Value>,
        #[serde(default)]
        pub tables: Vec<TableConfig>,
    }

    impl KeyspaceConfig {
        pub fn durable_writes(&self) -> Option<bool> {
            self.properties.get("durable_writes").and_then(Value::as_bool)
        }

        pub fn replication_class(&self) -> Option<&str> {
            self.properties
                .get("replication")
                .and_then(|r| r.get("class"))
                .and_then(Value::as_str)
        }

        pub fn table(&self, name: &str) -> Option<&TableConfig> {
            self.tables.iter().find(|t| t.name == name)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TableConfig {
        pub name: String,
        #[serde(flatten)]
        pub properties: Map<String, Value>,
    }

    impl ConfigDocument {
        pub fn keyspace(&self, name: &str) -> Option<&KeyspaceConfig> {
            self.keyspaces.iter().find(|k| k.name == name)
        }
    }
}

pub mod extract {
    use crate::document::{ConfigDocument, KeyspaceConfig, TableConfig};
    use crate::error::{Error, Result};
    use crate::executor::QueryExecutor;
    use crate::normalize::{
        flag_list, identifier, key_name, replication_settings, subconfig_settings,
    };
    use crate::schema::CatalogValue;
    use serde_json::{Map, Value};
    use tracing::{debug, info};

    const KEYSPACES_QUERY: &str = "SELECT * FROM keyspaces";

    pub fn is_system_keyspace(name: &str) -> bool {
        let name = name.to_lowercase();
        name == "system" || name.starts_with("system_")
    }

    /// Single-quoted CQL literal. Keyspace names only ever come from a prior
    /// catalog read; quoting keeps the statement well formed regardless.
    fn cql_literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    pub fn tables_query(keyspace: &str) -> String {
        format!(
            "SELECT * FROM tables WHERE keyspace_name = {}",
            cql_literal(keyspace)
        )
    }

    /// User keyspaces with normalized replication. `tables` is left empty.
    pub async fn list_keyspaces<E>(executor: &E) -> Result<Vec<KeyspaceConfig>>
    where
        E: QueryExecutor + ?Sized,
    {
        let rows = executor.execute(KEYSPACES_QUERY).await?;
        let mut keyspaces = Vec::new();
        for row in rows {
            let Some(name) = row
                .get("keyspace_name")
                .and_then(CatalogValue::as_text)
                .map(str::to_string)
            else {
                return Err(Error::MissingColumn("keyspace_name"));
            };
            if is_system_keyspace(&name) {
                debug!(keyspace = %name, "skipping system keyspace");
                continue;
            }

            let mut properties = Map::new();
            for (column, value) in row {
                if column == "keyspace_name" {
                    continue;
                }
                let value = match column.as_str() {
                    "replication" => Value::Object(replication_settings(&value)),
                    _ => value.to_json(),
                };
                properties.insert(key_name(&column).to_string(), value);
            }
            keyspaces.push(KeyspaceConfig {
                name,
                properties,
                tables: Vec::new(),
            });
        }
        info!(count = keyspaces.len(), "listed keyspaces");
        Ok(keyspaces)
    }

    pub async fn list_tables<E>(executor: &E, keyspace: &str) -> Result<Vec<TableConfig>>
    where
        E: QueryExecutor + ?Sized,
    {
        let rows = executor.execute(&tables_query(keyspace)).await?;
        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(name) = row
                .get("table_name")
                .and_then(CatalogValue::as_text)
                .map(str::to_string)
            else {
                return Err(Error::MissingColumn("table_name"));
            };

            let mut properties = Map::new();
            for (column, value) in row {
                let value = match (column.as_str(), &value) {
                    ("keyspace_name" | "table_name", _) => continue,
                    ("replication", CatalogValue::Map(_)) => {
                        Value::Object(replication_settings(&value))
                    }
                    (_, CatalogValue::Map(_)) => Value::Object(subconfig_settings(&value)),
                    ("flags", _) => flag_list(&value),
                    ("id", _) => identifier(&value),
                    _ => value.to_json(),
                };
                properties.insert(key_name(&column).to_string(), value);
            }
            tables.push(TableConfig { name, properties });
        }
        debug!(%keyspace, count = tables.len(), "listed tables");
        Ok(tables)
    }

    /// Every user keyspace with its tables attached. Any failed query aborts
    /// the whole extraction.
    pub async fn get_current_config<E>(executor: &E) -> Result<ConfigDocument>
    where
        E: QueryExecutor + ?Sized,
    {
        let mut keyspaces = list_keyspaces(executor).await?;
        for keyspace in &mut keyspaces {
            keyspace.tables = list_tables(executor, &keyspace.name).await?;
        }
        Ok(ConfigDocument { keyspaces })
    }
}

pub mod diff {
    use crate::document::ConfigDocument;
    use serde_json::{Map, Value};
    use std::fmt;

    /// Table properties that identify a table within one cluster only.
    const IGNORED_TABLE_PROPERTIES: &[&str] = &["id"];

    #[derive(Debug, Clone, PartialEq)]
    pub enum ConfigChange {
        KeyspaceAdded {
            keyspace: String,
        },
        KeyspaceRemoved {
            keyspace: String,
        },
        TableAdded {
            keyspace: String,
            table: String,
        },
        TableRemoved {
            keyspace: String,
            table: String,
        },
        PropertyChanged {
            keyspace: String,
            table: Option<String>,
            property: String,
            baseline: Option<Value>,
            current: Option<Value>,
        },
    }

    impl fmt::Display for ConfigChange {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                ConfigChange::KeyspaceAdded { keyspace } => write!(f, "+ keyspace {keyspace}"),
                ConfigChange::KeyspaceRemoved { keyspace } => write!(f, "- keyspace {keyspace}"),
                ConfigChange::TableAdded { keyspace, table } => {
                    write!(f, "+ table {keyspace}.{table}")
                }
                ConfigChange::TableRemoved { keyspace, table } => {
                    write!(f, "- table {keyspace}.{table}")
                }
                ConfigChange::PropertyChanged {
                    keyspace,
                    table,
                    property,
                    baseline,
                    current,
                } => {
                    let owner = match table {
                        Some(table) => format!("{keyspace}.{table}"),
                        None => keyspace.clone(),
                    };
                    write!(
                        f,
                        "~ {owner} {property}: {} -> {}",
                        display_value(baseline),
                        display_value(current)
                    )
                }
            }
        }
    }

    fn display_value(value: &Option<Value>) -> String {
        match value {
            Some(v) => v.to_string(),
            None => "<absent>".into(),
        }
    }

    /// Differences from `baseline` to `current`, in baseline document order
    /// followed by anything only `current` has.
    pub fn diff_configs(baseline: &ConfigDocument, current: &ConfigDocument) -> Vec<ConfigChange> {
        let mut changes = Vec::new();
        for ks in &baseline.keyspaces {
            let Some(live) = current.keyspace(&ks.name) else {
                changes.push(ConfigChange::KeyspaceRemoved {
                    keyspace: ks.name.clone(),
                });
                continue;
            };

            let mut props = Vec::new();
            diff_properties("", &ks.properties, &live.properties, &[], &mut props);
            changes.extend(props.into_iter().map(|(property, baseline, current)| {
                ConfigChange::PropertyChanged {
                    keyspace: ks.name.clone(),
                    table: None,
                    property,
                    baseline,
                    current,
                }
            }));

            for table in &ks.tables {
                let Some(live_table) = live.table(&table.name) else {
                    changes.push(ConfigChange::TableRemoved {
                        keyspace: ks.name.clone(),
                        table: table.name.clone(),
                    });
                    continue;
                };
                let mut props = Vec::new();
                diff_properties(
                    "",
                    &table.properties,
                    &live_table.properties,
                    IGNORED_TABLE_PROPERTIES,
                    &mut props,
                );
                changes.extend(props.into_iter().map(|(property, baseline, current)| {
                    ConfigChange::PropertyChanged {
                        keyspace: ks.name.clone(),
                        table: Some(table.name.clone()),
                        property,
                        baseline,
                        current,
                    }
                }));
            }
            for table in &live.tables {
                if ks.table(&table.name).is_none() {
                    changes.push(ConfigChange::TableAdded {
                        keyspace: ks.name.clone(),
                        table: table.name.clone(),
                    });
                }
            }
        }
        for ks in &current.keyspaces {
            if baseline.keyspace(&ks.name).is_none() {
                changes.push(ConfigChange::KeyspaceAdded {
                    keyspace: ks.name.clone(),
                });
            }
        }
        changes
    }

    type PropertyDelta = (String, Option<Value>, Option<Value>);

    fn diff_properties(
        prefix: &str,
        baseline: &Map<String, Value>,
        current: &Map<String, Value>,
        ignored: &[&str],
        out: &mut Vec<PropertyDelta>,
    ) {
        let keys = baseline
            .keys()
            .chain(current.keys().filter(|k| !baseline.contains_key(*k)));
        for key in keys {
            if ignored.contains(&key.as_str()) {
                continue;
            }
            let path = format!("{prefix}{key}");
            match (baseline.get(key), current.get(key)) {
                (Some(Value::Object(b)), Some(Value::Object(c))) => {
                    diff_properties(&format!("{path}."), b, c, &[], out);
                }
                (b, c) if b != c => out.push((path, b.cloned(), c.cloned())),
                _ => {}
            }
        }
    }
}

pub mod report {
    use crate::document::ConfigDocument;
    use serde_json::Value;
    use std::io::{self, Write};

    /// Human-readable listing of keyspaces and their tables.
    pub fn write_summary(doc: &ConfigDocument, out: &mut impl Write) -> io::Result<()> {
        for ks in &doc.keyspaces {
            writeln!(out)?;
            writeln!(out, "Keyspace : {}", ks.name)?;
            match ks.durable_writes() {
                Some(durable) => writeln!(out, "- durable_writes : {durable}")?,
                None => writeln!(out, "- durable_writes : unknown")?,
            }
            if let Some(class) = ks.replication_class() {
                let factor = ks
                    .properties
                    .get("replication")
                    .and_then(|r| r.get("replication_factor"))
                    .map(Value::to_string);
                match factor {
                    Some(rf) => writeln!(out, "- replication : {class} (replication_factor {rf})")?,
                    None => writeln!(out, "- replication : {class}")?,
                }
            }
            writeln!(out, "- Tables")?;
            for table in &ks.tables {
                writeln!(out, "\t\t- {}", table.name)?;
            }
        }
        Ok(())
    }
}
