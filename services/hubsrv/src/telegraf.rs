//! Telegraf configuration synthesis
//!
//! Rewrites the `[[inputs.opcua]]` section of a Telegraf TOML document so it
//! lists exactly the nodes selected for history. Everything else in the
//! document is parsed generically and written back unchanged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use toml::{Table, Value};
use tracing::{debug, info};

use crate::config::{AgentSettings, CpuSettings, OpcUaSection, TelegrafSection};
use crate::error::{HubSrvError, Result};
use crate::node_store::StoredNode;

/// Connection parameters of the opcua input, refreshed on every rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcUaInputSettings {
    pub endpoint: String,
    pub connect_timeout: String,
    pub request_timeout: String,
    pub security_policy: String,
    pub security_mode: String,
}

impl From<&OpcUaSection> for OpcUaInputSettings {
    fn from(section: &OpcUaSection) -> Self {
        Self {
            endpoint: section.endpoint.clone(),
            connect_timeout: section.connect_timeout.clone(),
            request_timeout: section.request_timeout.clone(),
            security_policy: section.security_policy.clone(),
            security_mode: section.security_mode.clone(),
        }
    }
}

/// Entry of `inputs.opcua.nodes`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegrafNode {
    pub name: String,
    /// Telegraf expects the namespace index as a string
    pub namespace: String,
    pub identifier_type: String,
    pub identifier: String,
}

impl From<&StoredNode> for TelegrafNode {
    fn from(node: &StoredNode) -> Self {
        Self {
            name: node.browse_name.clone(),
            namespace: node.namespace.to_string(),
            identifier_type: node.identifier_type.clone(),
            identifier: node.identifier.clone(),
        }
    }
}

#[derive(Serialize)]
struct OpcUaInput<'a> {
    endpoint: &'a str,
    connect_timeout: &'a str,
    request_timeout: &'a str,
    security_policy: &'a str,
    security_mode: &'a str,
    nodes: &'a [TelegrafNode],
}

/// Replace `inputs.opcua` in `doc`; an empty node list removes it
pub fn apply_opcua_input(
    doc: &mut Table,
    input: &OpcUaInputSettings,
    nodes: &[TelegrafNode],
) -> Result<()> {
    if nodes.is_empty() {
        let inputs_now_empty = match doc.get_mut("inputs") {
            Some(Value::Table(inputs)) => {
                inputs.remove("opcua");
                inputs.is_empty()
            },
            _ => false,
        };
        if inputs_now_empty {
            doc.remove("inputs");
        }
        return Ok(());
    }

    let stanza = Value::try_from(OpcUaInput {
        endpoint: &input.endpoint,
        connect_timeout: &input.connect_timeout,
        request_timeout: &input.request_timeout,
        security_policy: &input.security_policy,
        security_mode: &input.security_mode,
        nodes,
    })
    .map_err(|e| HubSrvError::config_synthesis(format!("Cannot encode opcua input: {}", e)))?;

    let inputs = doc
        .entry("inputs")
        .or_insert(Value::Table(Table::new()));
    match inputs {
        Value::Table(inputs) => {
            inputs.insert("opcua".to_string(), Value::Array(vec![stanza]));
            Ok(())
        },
        other => Err(HubSrvError::config_synthesis(format!(
            "'inputs' is a {}, expected a table",
            other.type_str()
        ))),
    }
}

#[derive(Serialize)]
struct InfluxOutput<'a> {
    urls: Vec<&'a str>,
    token: &'a str,
    organization: &'a str,
    bucket: &'a str,
}

#[derive(Serialize)]
struct Outputs<'a> {
    influxdb_v2: Vec<InfluxOutput<'a>>,
}

#[derive(Serialize)]
struct Inputs<'a> {
    cpu: Vec<&'a CpuSettings>,
}

#[derive(Serialize)]
struct BootstrapDocument<'a> {
    global_tags: BTreeMap<String, String>,
    agent: &'a AgentSettings,
    outputs: Outputs<'a>,
    inputs: Inputs<'a>,
}

/// Initial document: agent, InfluxDB v2 output and CPU input, no opcua input
pub fn bootstrap_document(settings: &TelegrafSection) -> Result<String> {
    let doc = BootstrapDocument {
        global_tags: BTreeMap::new(),
        agent: &settings.agent,
        outputs: Outputs {
            influxdb_v2: vec![InfluxOutput {
                urls: vec![settings.influx.url.as_str()],
                token: &settings.influx.token,
                organization: &settings.influx.organization,
                bucket: &settings.influx.bucket,
            }],
        },
        inputs: Inputs {
            cpu: vec![&settings.cpu],
        },
    };
    toml::to_string_pretty(&doc)
        .map_err(|e| HubSrvError::config_synthesis(format!("Cannot encode document: {}", e)))
}

/// Telegraf document on disk
#[derive(Debug, Clone)]
pub struct TelegrafDocument {
    path: PathBuf,
}

impl TelegrafDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the document if it does not exist; returns whether it was created
    pub async fn bootstrap(&self, settings: &TelegrafSection) -> Result<bool> {
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!("Telegraf config present: {}", self.path.display());
            return Ok(false);
        }

        let contents = bootstrap_document(settings)?;
        self.write(&contents).await?;
        info!("Telegraf config created: {}", self.path.display());
        Ok(true)
    }

    pub async fn read_table(&self) -> Result<Table> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            HubSrvError::config_synthesis(format!("Cannot read {}: {}", self.path.display(), e))
        })?;
        raw.parse::<Table>().map_err(|e| {
            HubSrvError::config_synthesis(format!("Cannot parse {}: {}", self.path.display(), e))
        })
    }

    /// Rewrite the opcua input to list `nodes`, ordered by browse name
    ///
    /// Returns the number of nodes written.
    pub async fn synthesize(
        &self,
        input: &OpcUaInputSettings,
        nodes: &[StoredNode],
    ) -> Result<usize> {
        let mut ordered: Vec<&StoredNode> = nodes.iter().collect();
        ordered.sort_by(|a, b| {
            a.browse_name
                .cmp(&b.browse_name)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        let entries: Vec<TelegrafNode> = ordered.into_iter().map(TelegrafNode::from).collect();

        let mut doc = self.read_table().await?;
        apply_opcua_input(&mut doc, input, &entries)?;
        let contents = toml::to_string_pretty(&doc).map_err(|e| {
            HubSrvError::config_synthesis(format!("Cannot encode {}: {}", self.path.display(), e))
        })?;
        self.write(&contents).await?;

        info!(
            "Telegraf config rewritten with {} opcua nodes: {}",
            entries.len(),
            self.path.display()
        );
        Ok(entries.len())
    }

    /// Write to a sibling temp file, then rename over the document
    async fn write(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    HubSrvError::config_synthesis(format!(
                        "Cannot create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, contents).await.map_err(|e| {
            HubSrvError::config_synthesis(format!("Cannot write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            HubSrvError::config_synthesis(format!(
                "Cannot replace {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "telegraf.conf".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    const EXISTING: &str = r#"
[global_tags]
site = "plant-1"

[agent]
interval = "10s"
debug = false

[[outputs.influxdb_v2]]
urls = ["http://influx:8086"]
bucket = "opc"

[[inputs.cpu]]
percpu = true

[[inputs.opcua]]
endpoint = "opc.tcp://old:4840"

[[inputs.opcua]]
endpoint = "opc.tcp://stale:4840"
"#;

    fn input() -> OpcUaInputSettings {
        OpcUaInputSettings::from(&OpcUaSection {
            endpoint: "opc.tcp://plc:4840".to_string(),
            ..OpcUaSection::default()
        })
    }

    fn stored(node_id: &str, name: &str, namespace: i64, identifier: &str) -> StoredNode {
        StoredNode {
            id: 1,
            node_id: node_id.to_string(),
            namespace,
            identifier_type: "s".to_string(),
            identifier: identifier.to_string(),
            parent_id: node_id.to_string(),
            browse_name: name.to_string(),
            node_class: "NodeClassVariable".to_string(),
            data_type: "float64".to_string(),
            writable: false,
            last_updated: NaiveDateTime::default(),
            removed: false,
            node_path: name.to_string(),
            history_enabled: true,
            included_in_config: false,
        }
    }

    fn write_doc(contents: &str) -> (tempfile::TempDir, TelegrafDocument) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telegraf.conf");
        std::fs::write(&path, contents).unwrap();
        (dir, TelegrafDocument::new(path))
    }

    fn opcua_stanzas(doc: &Table) -> Vec<Value> {
        doc.get("inputs")
            .and_then(|i| i.get("opcua"))
            .and_then(|o| o.as_array())
            .cloned()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_synthesize_replaces_opcua_and_keeps_other_sections() {
        let (_dir, doc) = write_doc(EXISTING);
        let nodes = vec![
            stored("ns=2;s=Device.Temp", "Temp", 2, "Device.Temp"),
            stored("ns=3;s=Line.Flow", "Flow", 3, "Line.Flow"),
        ];

        assert_eq!(doc.synthesize(&input(), &nodes).await.unwrap(), 2);

        let table = doc.read_table().await.unwrap();
        assert_eq!(table["global_tags"]["site"].as_str(), Some("plant-1"));
        assert_eq!(table["agent"]["interval"].as_str(), Some("10s"));
        assert_eq!(
            table["outputs"]["influxdb_v2"][0]["bucket"].as_str(),
            Some("opc")
        );
        assert_eq!(table["inputs"]["cpu"][0]["percpu"].as_bool(), Some(true));

        let stanzas = opcua_stanzas(&table);
        assert_eq!(stanzas.len(), 1);
        let stanza = &stanzas[0];
        assert_eq!(stanza["endpoint"].as_str(), Some("opc.tcp://plc:4840"));
        assert_eq!(stanza["connect_timeout"].as_str(), Some("10s"));
        assert_eq!(stanza["request_timeout"].as_str(), Some("5s"));
        assert_eq!(stanza["security_policy"].as_str(), Some("None"));
        assert_eq!(stanza["security_mode"].as_str(), Some("None"));

        let written: Vec<TelegrafNode> = stanza["nodes"].clone().try_into().unwrap();
        assert_eq!(
            written,
            vec![
                TelegrafNode {
                    name: "Flow".to_string(),
                    namespace: "3".to_string(),
                    identifier_type: "s".to_string(),
                    identifier: "Line.Flow".to_string(),
                },
                TelegrafNode {
                    name: "Temp".to_string(),
                    namespace: "2".to_string(),
                    identifier_type: "s".to_string(),
                    identifier: "Device.Temp".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_selection_removes_stanza() {
        let (_dir, doc) = write_doc(EXISTING);
        assert_eq!(doc.synthesize(&input(), &[]).await.unwrap(), 0);

        let table = doc.read_table().await.unwrap();
        assert!(opcua_stanzas(&table).is_empty());
        // cpu input keeps `inputs` alive
        assert!(table["inputs"].get("cpu").is_some());
    }

    #[test]
    fn test_empty_selection_drops_empty_inputs_table() {
        let mut table: Table = r#"
[agent]
interval = "10s"

[[inputs.opcua]]
endpoint = "opc.tcp://old:4840"
"#
        .parse()
        .unwrap();

        apply_opcua_input(&mut table, &input(), &[]).unwrap();
        assert!(table.get("inputs").is_none());
        assert!(table.get("agent").is_some());
    }

    #[test]
    fn test_inputs_must_be_a_table() {
        let mut table: Table = "inputs = 3".parse().unwrap();
        let nodes = vec![TelegrafNode::from(&stored("ns=2;s=A", "A", 2, "A"))];
        assert!(matches!(
            apply_opcua_input(&mut table, &input(), &nodes),
            Err(HubSrvError::ConfigSynthesis(_))
        ));
    }

    #[tokio::test]
    async fn test_unparsable_document_left_untouched() {
        let (_dir, doc) = write_doc("[agent\ninterval = ");
        let err = doc
            .synthesize(&input(), &[stored("ns=2;s=A", "A", 2, "A")])
            .await
            .unwrap_err();
        assert!(matches!(err, HubSrvError::ConfigSynthesis(_)));
        assert_eq!(
            std::fs::read_to_string(doc.path()).unwrap(),
            "[agent\ninterval = "
        );
    }

    #[tokio::test]
    async fn test_missing_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let doc = TelegrafDocument::new(dir.path().join("absent.conf"));
        assert!(matches!(
            doc.synthesize(&input(), &[]).await,
            Err(HubSrvError::ConfigSynthesis(_))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_creates_document_once() {
        let dir = tempfile::tempdir().unwrap();
        let doc = TelegrafDocument::new(dir.path().join("telegraf").join("telegraf.conf"));
        let mut settings = TelegrafSection::default();
        settings.influx.bucket = "history".to_string();

        assert!(doc.bootstrap(&settings).await.unwrap());
        let table = doc.read_table().await.unwrap();
        assert!(table["global_tags"].as_table().unwrap().is_empty());
        assert_eq!(table["agent"]["interval"].as_str(), Some("10s"));
        assert_eq!(table["agent"]["metric_batch_size"].as_integer(), Some(1000));
        assert_eq!(table["agent"]["debug"].as_bool(), Some(false));
        assert_eq!(
            table["outputs"]["influxdb_v2"][0]["urls"][0].as_str(),
            Some("http://localhost:8086")
        );
        assert_eq!(
            table["outputs"]["influxdb_v2"][0]["bucket"].as_str(),
            Some("history")
        );
        assert_eq!(table["inputs"]["cpu"][0]["totalcpu"].as_bool(), Some(true));
        assert!(opcua_stanzas(&table).is_empty());

        // Existing documents are never overwritten
        std::fs::write(doc.path(), "[agent]\ninterval = \"1m\"\n").unwrap();
        assert!(!doc.bootstrap(&settings).await.unwrap());
        let table = doc.read_table().await.unwrap();
        assert_eq!(table["agent"]["interval"].as_str(), Some("1m"));
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let (dir, doc) = write_doc(EXISTING);
        doc.synthesize(&input(), &[stored("ns=2;s=A", "A", 2, "A")])
            .await
            .unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["telegraf.conf"]);
    }
}
