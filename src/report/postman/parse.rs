//! Streaming top-level parse of a Newman report.
//!
//! Reports can embed large binary response bodies, so the top object is
//! consumed as a token stream instead of being buffered whole: hand-written
//! visitors walk `collection`, `run.executions` and `run.failures`, and
//! each `response.stream.data` byte array is written straight to a
//! temporary spill file as it is deserialized. Unknown fields are skipped,
//! not errors.

use std::fmt;
use std::fs;
use std::io::{BufWriter, Read, Write};

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::error::{QualensError, Result};

/// Fully parsed Newman report, response bodies spilled to disk.
#[derive(Debug, Default)]
pub struct NewmanReport {
    pub collection: Collection,
    pub executions: Vec<NewmanExecution>,
    pub failures: Vec<NewmanFailure>,
}

/// Parses a Newman report from a byte stream.
pub fn parse_newman(reader: impl Read) -> Result<NewmanReport> {
    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    NewmanReport::deserialize(&mut deserializer).map_err(QualensError::Json)
}

// ---------------------------------------------------------------------------
// Collection tree (buffered: scripts and names are small)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub info: CollectionInfo,
    #[serde(default)]
    pub item: Vec<CollectionItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CollectionInfo {
    #[serde(default)]
    pub name: String,
}

/// Nested named item: a folder when it has sub-items, a request leaf
/// otherwise.
#[derive(Debug, Default, Deserialize)]
pub struct CollectionItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub request: Option<ItemRequest>,
    #[serde(default)]
    pub event: Vec<ItemEvent>,
    #[serde(default)]
    pub item: Vec<CollectionItem>,
}

impl CollectionItem {
    pub fn is_folder(&self) -> bool {
        self.request.is_none()
    }

    /// The first script bound to the given lifecycle event, joined into one
    /// source text.
    pub fn script_for(&self, listen: &str) -> Option<String> {
        self.event
            .iter()
            .find(|e| e.listen == listen)
            .map(|e| e.script.exec.join("\n"))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemRequest {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: Option<RequestUrl>,
    #[serde(default)]
    pub description: Option<Description>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemEvent {
    #[serde(default)]
    pub listen: String,
    #[serde(default)]
    pub script: Script,
}

#[derive(Debug, Default, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub exec: Vec<String>,
}

/// Request URL, either raw text or split into parts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RequestUrl {
    Raw(String),
    Parts {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        host: Vec<String>,
        #[serde(default)]
        path: Vec<String>,
    },
}

impl RequestUrl {
    pub fn display(&self) -> String {
        match self {
            RequestUrl::Raw(raw) => raw.clone(),
            RequestUrl::Parts {
                protocol,
                host,
                path,
            } => {
                let scheme = protocol.as_deref().unwrap_or("http");
                format!("{scheme}://{}/{}", host.join("."), path.join("/"))
            }
        }
    }
}

/// Item/request description, plain or wrapped.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Description {
    Text(String),
    Wrapped {
        #[serde(default)]
        content: String,
    },
}

impl Description {
    pub fn text(&self) -> &str {
        match self {
            Description::Text(t) => t,
            Description::Wrapped { content } => content,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

// ---------------------------------------------------------------------------
// run.failures (buffered: small records)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct NewmanFailure {
    #[serde(default)]
    pub error: FailureError,
    #[serde(default)]
    pub at: Option<String>,
    #[serde(default)]
    pub source: Option<FailureSource>,
}

impl NewmanFailure {
    pub fn source_id(&self) -> Option<&str> {
        self.source.as_ref().and_then(|s| s.id.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FailureError {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub index: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FailureSource {
    #[serde(default)]
    pub id: Option<String>,
}

// ---------------------------------------------------------------------------
// run.executions (streamed: response bodies spill to disk)
// ---------------------------------------------------------------------------

/// Per-request outcome with its raw HTTP exchange.
#[derive(Debug, Default)]
pub struct NewmanExecution {
    pub item_id: Option<String>,
    pub request: Option<ExecRequest>,
    pub response: Option<ExecResponse>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecRequest {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: Option<RequestUrl>,
    #[serde(default)]
    pub header: Vec<Header>,
    #[serde(default)]
    pub body: Option<RequestBody>,
    #[serde(default)]
    pub description: Option<Description>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub raw: Option<String>,
}

#[derive(Debug, Default)]
pub struct ExecResponse {
    pub code: Option<i64>,
    pub status: String,
    pub response_time: Option<i64>,
    pub header: Vec<Header>,
    pub body: Option<BodySpill>,
}

/// A response body spilled to a temporary file during parsing.
///
/// The file is removed when the spill is dropped, so every exit path of the
/// parser and of the HTTP-log renderer releases it; `discard` deletes it
/// eagerly once the log is uploaded.
#[derive(Debug)]
pub struct BodySpill {
    file: NamedTempFile,
    pub len: u64,
}

impl BodySpill {
    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }

    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        fs::read(self.file.path())
    }

    pub fn discard(self) -> std::io::Result<()> {
        self.file.close()
    }
}

#[derive(Deserialize)]
struct ItemRef {
    #[serde(default)]
    id: Option<String>,
}

impl<'de> Deserialize<'de> for NewmanReport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ReportVisitor;

        impl<'de> Visitor<'de> for ReportVisitor {
            type Value = NewmanReport;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a Newman report object")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut report = NewmanReport::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "collection" => report.collection = map.next_value()?,
                        "run" => {
                            let run: RunSection = map.next_value()?;
                            report.executions = run.executions;
                            report.failures = run.failures;
                        }
                        _ => {
                            map.next_value::<IgnoredAny>()?;
                        }
                    }
                }
                Ok(report)
            }
        }

        deserializer.deserialize_map(ReportVisitor)
    }
}

#[derive(Default)]
struct RunSection {
    executions: Vec<NewmanExecution>,
    failures: Vec<NewmanFailure>,
}

impl<'de> Deserialize<'de> for RunSection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RunVisitor;

        impl<'de> Visitor<'de> for RunVisitor {
            type Value = RunSection;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a Newman run section")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut run = RunSection::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "executions" => run.executions = map.next_value()?,
                        "failures" => run.failures = map.next_value()?,
                        _ => {
                            map.next_value::<IgnoredAny>()?;
                        }
                    }
                }
                Ok(run)
            }
        }

        deserializer.deserialize_map(RunVisitor)
    }
}

impl<'de> Deserialize<'de> for NewmanExecution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ExecutionVisitor;

        impl<'de> Visitor<'de> for ExecutionVisitor {
            type Value = NewmanExecution;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a Newman execution")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut execution = NewmanExecution::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "item" => execution.item_id = map.next_value::<ItemRef>()?.id,
                        "request" => execution.request = map.next_value()?,
                        "response" => execution.response = map.next_value()?,
                        _ => {
                            map.next_value::<IgnoredAny>()?;
                        }
                    }
                }
                Ok(execution)
            }
        }

        deserializer.deserialize_map(ExecutionVisitor)
    }
}

impl<'de> Deserialize<'de> for ExecResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ResponseVisitor;

        impl<'de> Visitor<'de> for ResponseVisitor {
            type Value = ExecResponse;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a Newman response")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut response = ExecResponse::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "code" => response.code = map.next_value()?,
                        "status" => response.status = map.next_value::<Option<String>>()?.unwrap_or_default(),
                        "responseTime" => response.response_time = map.next_value()?,
                        "header" => response.header = map.next_value::<Option<Vec<Header>>>()?.unwrap_or_default(),
                        "stream" => response.body = map.next_value::<ResponseStream>()?.0,
                        _ => {
                            map.next_value::<IgnoredAny>()?;
                        }
                    }
                }
                Ok(response)
            }
        }

        deserializer.deserialize_map(ResponseVisitor)
    }
}

/// `response.stream`: a serialized buffer whose `data` byte array goes
/// straight to a spill file.
struct ResponseStream(Option<BodySpill>);

impl<'de> Deserialize<'de> for ResponseStream {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct StreamVisitor;

        impl<'de> Visitor<'de> for StreamVisitor {
            type Value = ResponseStream;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a serialized response buffer")
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(ResponseStream(None))
            }

            fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(ResponseStream(None))
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut spill = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "data" => spill = map.next_value_seed(SpillSeed)?,
                        _ => {
                            map.next_value::<IgnoredAny>()?;
                        }
                    }
                }
                Ok(ResponseStream(spill))
            }
        }

        deserializer.deserialize_any(StreamVisitor)
    }
}

/// Writes the byte array element-by-element into a fresh temp file.
struct SpillSeed;

impl<'de> de::DeserializeSeed<'de> for SpillSeed {
    type Value = Option<BodySpill>;

    fn deserialize<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<Self::Value, D::Error> {
        struct SpillVisitor;

        impl<'de> Visitor<'de> for SpillVisitor {
            type Value = Option<BodySpill>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a byte array")
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(None)
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let file = NamedTempFile::new().map_err(de::Error::custom)?;
                let mut writer = BufWriter::new(file);
                let mut len = 0u64;

                while let Some(byte) = seq.next_element::<u8>()? {
                    writer.write_all(&[byte]).map_err(de::Error::custom)?;
                    len += 1;
                }

                let file = writer
                    .into_inner()
                    .map_err(|e| de::Error::custom(e.to_string()))?;
                file.as_file().sync_data().ok();

                Ok(Some(BodySpill { file, len }))
            }
        }

        deserializer.deserialize_any(SpillVisitor)
    }
}
