use std::{
    collections::HashMap,
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use envconfig::Envconfig;
use factstream::catalog::FieldBounds;
use serde::Deserialize;
use thiserror::Error;

/// Location of the properties file in a deployment
pub const DEPLOYED_PROPERTIES_PATH: &str = "/etc/factstream/application_properties.json";
/// Location of the properties file when running locally
pub const LOCAL_PROPERTIES_PATH: &str = "application_properties.json";

const DEFAULT_TABLE: &str = "random_numbers";

/// Settings taken from the process environment
#[derive(Envconfig, Debug)]
pub struct RuntimeEnv {
    /// Any non-empty value marks a local run
    #[envconfig(from = "IS_LOCAL")]
    pub is_local: Option<String>,

    /// Explicit location of the properties file
    #[envconfig(from = "FACTSTREAM_PROPERTIES_PATH")]
    pub properties_path: Option<PathBuf>,

    /// API key for the model endpoint, sent as bearer token
    #[envconfig(from = "AWS_BEARER_TOKEN_BEDROCK")]
    pub bedrock_api_key: Option<String>,
}

impl RuntimeEnv {
    /// True if running outside a deployment
    pub fn is_local(&self) -> bool {
        self.is_local.as_deref().is_some_and(|v| !v.is_empty())
    }

    /// Where to read properties from. An explicitly given path wins over the environment.
    pub fn resolve_properties_path(&self, explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| self.properties_path.clone())
            .unwrap_or_else(|| {
                if self.is_local() {
                    PathBuf::from(LOCAL_PROPERTIES_PATH)
                } else {
                    PathBuf::from(DEPLOYED_PROPERTIES_PATH)
                }
            })
    }
}

#[derive(Deserialize)]
struct RawPropertyGroup {
    #[serde(rename = "PropertyGroupId")]
    id: String,
    #[serde(rename = "PropertyMap", default)]
    map: HashMap<String, String>,
}

/// Groups of string key-value pairs, as read from an application-properties file:
///
/// ```json
/// [{"PropertyGroupId": "Bedrock", "PropertyMap": {"model.id": "..."}}]
/// ```
#[derive(Debug, Default)]
pub struct ApplicationProperties {
    groups: HashMap<String, HashMap<String, String>>,
}

impl ApplicationProperties {
    /// Read and parse a properties file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse the JSON text of a properties file
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: Vec<RawPropertyGroup> = serde_json::from_str(text)?;
        let groups = raw.into_iter().map(|g| (g.id, g.map)).collect();
        Ok(Self { groups })
    }

    /// Get a group which must exist
    pub fn group<'a>(&'a self, id: &'a str) -> Result<PropertyGroup<'a>, ConfigError> {
        self.optional_group(id)
            .ok_or_else(|| ConfigError::MissingGroup(id.to_owned()))
    }

    /// Get a group which may be absent
    pub fn optional_group<'a>(&'a self, id: &'a str) -> Option<PropertyGroup<'a>> {
        self.groups.get(id).map(|map| PropertyGroup { id, map })
    }
}

/// A single property group
#[derive(Debug, Clone, Copy)]
pub struct PropertyGroup<'a> {
    id: &'a str,
    map: &'a HashMap<String, String>,
}

impl<'a> PropertyGroup<'a> {
    /// A value which must be present
    pub fn required(&self, key: &str) -> Result<&'a str, ConfigError> {
        self.optional(key).ok_or_else(|| ConfigError::MissingKey {
            group: self.id.to_owned(),
            key: key.to_owned(),
        })
    }

    /// A value which may be absent
    pub fn optional(&self, key: &str) -> Option<&'a str> {
        self.map.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// Parse a value if it is present
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.optional(key)
            .map(|raw| {
                raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                    group: self.id.to_owned(),
                    key: key.to_owned(),
                    value: raw.to_owned(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Parse a value, falling back to a default if it is absent
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    /// All keys of this group
    pub fn keys(&self) -> impl Iterator<Item = &'a str> {
        self.map.keys().map(String::as_str)
    }
}

/// Where enriched records are written to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Connector {
    /// Changelog lines on stdout
    #[default]
    Print,
    /// A Kinesis data stream in `aws.region`
    Kinesis,
    /// A Kafka topic
    Kafka,
}

impl FromStr for Connector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "print" => Ok(Self::Print),
            "kinesis" => Ok(Self::Kinesis),
            "kafka" => Ok(Self::Kafka),
            other => Err(format!(
                "unknown connector `{other}`, expected `print`, `kinesis` or `kafka`"
            )),
        }
    }
}

impl Display for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let matched = match self {
            Connector::Print => "print",
            Connector::Kinesis => "kinesis",
            Connector::Kafka => "kafka",
        };
        f.write_str(matched)
    }
}

/// `OutputStream0`: the stream enriched records are written to
#[derive(Debug, Clone, PartialEq)]
pub struct OutputStreamConfig {
    pub stream_name: String,
    pub region: String,
    /// Overrides the regional Kinesis endpoint
    pub endpoint: Option<String>,
    pub connector: Connector,
    /// Only required for [Connector::Kafka]
    pub bootstrap_servers: Vec<String>,
    pub batch_max_size: usize,
    pub partition_field: String,
}

impl OutputStreamConfig {
    const GROUP: &'static str = "OutputStream0";

    fn from_properties(properties: &ApplicationProperties) -> Result<Self, ConfigError> {
        let group = properties.group(Self::GROUP)?;
        let connector = group.parse_or("connector", Connector::default())?;
        let bootstrap_servers = match connector {
            Connector::Kafka => group
                .required("bootstrap.servers")?
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
            Connector::Print | Connector::Kinesis => Vec::new(),
        };
        Ok(Self {
            stream_name: group.required("stream.name")?.to_owned(),
            region: group.required("aws.region")?.to_owned(),
            endpoint: group.optional("endpoint").map(str::to_owned),
            connector,
            bootstrap_servers,
            batch_max_size: group.parse_or("sink.batch.max-size", 5)?,
            partition_field: group
                .optional("sink.partition-field")
                .unwrap_or("a_number")
                .to_owned(),
        })
    }
}

/// `Bedrock`: the model used for enrichment
#[derive(Debug, Clone, PartialEq)]
pub struct BedrockConfig {
    pub model_id: String,
    pub region: String,
    pub endpoint: Option<String>,
}

impl BedrockConfig {
    const GROUP: &'static str = "Bedrock";

    fn from_properties(properties: &ApplicationProperties) -> Result<Self, ConfigError> {
        let group = properties.group(Self::GROUP)?;
        Ok(Self {
            model_id: group.required("model.id")?.to_owned(),
            region: group.required("aws.region")?.to_owned(),
            endpoint: group.optional("endpoint").map(str::to_owned),
        })
    }
}

/// `SchemaCatalog`: where the record schema is looked up
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogConfig {
    pub database: String,
    pub table: String,
    pub region: String,
    pub endpoint: Option<String>,
    /// Bounds pinned via `fields.<name>.minimum` and `fields.<name>.maximum`
    pub bounds: HashMap<String, FieldBounds>,
}

impl CatalogConfig {
    const GROUP: &'static str = "SchemaCatalog";

    fn from_properties(properties: &ApplicationProperties) -> Result<Self, ConfigError> {
        let group = properties.group(Self::GROUP)?;
        let mut bounds: HashMap<String, FieldBounds> = HashMap::new();
        for key in group.keys() {
            let Some((field, side)) = key
                .strip_prefix("fields.")
                .and_then(|rest| rest.rsplit_once('.'))
            else {
                continue;
            };
            if !matches!(side, "minimum" | "maximum") {
                continue;
            }
            let value = group.parse::<f64>(key)?;
            let entry = bounds.entry(field.to_owned()).or_default();
            if side == "minimum" {
                entry.minimum = value;
            } else {
                entry.maximum = value;
            }
        }
        Ok(Self {
            database: group.required("database.name")?.to_owned(),
            table: group
                .optional("table.name")
                .unwrap_or(DEFAULT_TABLE)
                .to_owned(),
            region: group.required("aws.region")?.to_owned(),
            endpoint: group.optional("endpoint").map(str::to_owned),
            bounds,
        })
    }
}

/// `DataGen`: settings of the synthetic source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataGenConfig {
    pub rows_per_second: u32,
    pub min: i32,
    pub max: i32,
    pub number_of_rows: Option<u64>,
}

impl Default for DataGenConfig {
    fn default() -> Self {
        Self {
            rows_per_second: 1,
            min: 0,
            max: 100,
            number_of_rows: None,
        }
    }
}

impl DataGenConfig {
    const GROUP: &'static str = "DataGen";

    fn from_properties(properties: &ApplicationProperties) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let Some(group) = properties.optional_group(Self::GROUP) else {
            return Ok(defaults);
        };
        Ok(Self {
            rows_per_second: group.parse_or("rows-per-second", defaults.rows_per_second)?,
            min: group.parse_or("fields.a_number.min", defaults.min)?,
            max: group.parse_or("fields.a_number.max", defaults.max)?,
            number_of_rows: group.parse("number-of-rows")?,
        })
    }
}

/// Everything needed to run the job
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    pub output: OutputStreamConfig,
    pub bedrock: BedrockConfig,
    pub catalog: CatalogConfig,
    pub datagen: DataGenConfig,
    /// Number of records enriched concurrently, from `Pipeline.parallelism`
    pub parallelism: usize,
}

impl JobConfig {
    /// Build the typed configuration, failing on the first missing or invalid value
    pub fn from_properties(properties: &ApplicationProperties) -> Result<Self, ConfigError> {
        let parallelism = match properties.optional_group("Pipeline") {
            Some(group) => group.parse_or("parallelism", 4)?,
            None => 4,
        };
        Ok(Self {
            output: OutputStreamConfig::from_properties(properties)?,
            bedrock: BedrockConfig::from_properties(properties)?,
            catalog: CatalogConfig::from_properties(properties)?,
            datagen: DataGenConfig::from_properties(properties)?,
            parallelism,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read properties from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Properties file is not valid")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to read environment")]
    Env(#[from] envconfig::Error),
    #[error("Missing property group `{0}`")]
    MissingGroup(String),
    #[error("Missing property `{key}` in group `{group}`")]
    MissingKey { group: String, key: String },
    #[error("Invalid value `{value}` for `{group}.{key}`: {reason}")]
    InvalidValue {
        group: String,
        key: String,
        value: String,
        reason: String,
    },
}
