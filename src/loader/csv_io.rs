//! CSV reading and writing for the bulk loader
//!
//! Node files: `id` (optional), `name`, `labels` (`|`-separated) or any column
//! whose header starts with `label`, and `properties` (a JSON object).
//! Relationship files: `source_id`/`source`, `target_id`/`target`,
//! `type`/`relation` and `properties`.

use super::{ImportError, ImportResult, NodeRecord, RelationshipRecord, Row, RowError, RowStream};
use crate::graph::property::properties_from_json;
use crate::graph::{GraphStore, NodeId, PropertyMap};
use ::csv::{ReaderBuilder, StringRecord, Trim, Writer};
use std::io::{Read, Write};
use tracing::debug;

/// Example node file
pub const NODE_TEMPLATE: &str = "id,name,labels,properties
1,Alice,Person|Employee,\"{\"\"age\"\": 30}\"
2,Acme Corp,Company,{}
";

/// Example relationship file
pub const RELATIONSHIP_TEMPLATE: &str = "source_id,target_id,type,properties
1,2,WORKS_AT,\"{\"\"since\"\": 2020}\"
";

struct Columns {
    headers: Vec<String>,
}

impl Columns {
    fn new(record: &StringRecord) -> Self {
        Self {
            headers: record.iter().map(|h| h.trim().to_lowercase()).collect(),
        }
    }

    fn find(&self, names: &[&str]) -> Option<usize> {
        names
            .iter()
            .find_map(|name| self.headers.iter().position(|h| h == name))
    }

    fn require(&self, stream: RowStream, names: &[&'static str]) -> ImportResult<usize> {
        self.find(names).ok_or(ImportError::MissingColumn {
            stream,
            column: names[0],
        })
    }

    fn starting_with(&self, prefix: &str) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.starts_with(prefix))
            .map(|(i, _)| i)
            .collect()
    }
}

fn field(record: &StringRecord, col: Option<usize>) -> &str {
    col.and_then(|c| record.get(c)).unwrap_or("")
}

fn parse_properties(raw: &str) -> Row<PropertyMap> {
    if raw.is_empty() {
        return Ok(PropertyMap::new());
    }
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| RowError::Malformed(format!("properties are not valid JSON: {}", e)))?;
    properties_from_json(&value).map_err(RowError::Malformed)
}

/// Column positions of one input stream, resolved from its header row
trait Layout: Sized {
    type Record;
    const STREAM: RowStream;

    fn from_columns(columns: &Columns) -> ImportResult<Self>;
    fn parse(&self, record: &StringRecord) -> Row<Self::Record>;
}

struct NodeLayout {
    id: Option<usize>,
    name: usize,
    labels: Vec<usize>,
    properties: Option<usize>,
}

impl Layout for NodeLayout {
    type Record = NodeRecord;
    const STREAM: RowStream = RowStream::Nodes;

    fn from_columns(columns: &Columns) -> ImportResult<Self> {
        Ok(Self {
            id: columns.find(&["id"]),
            name: columns.require(Self::STREAM, &["name"])?,
            labels: columns.starting_with("label"),
            properties: columns.find(&["properties"]),
        })
    }

    fn parse(&self, record: &StringRecord) -> Row<NodeRecord> {
        let raw_id = field(record, self.id);
        let id = match raw_id {
            "" => None,
            raw => Some(
                raw.parse::<NodeId>()
                    .map_err(|_| RowError::Malformed(format!("invalid id '{}'", raw)))?,
            ),
        };

        let labels = self
            .labels
            .iter()
            .flat_map(|&c| field(record, Some(c)).split('|'))
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();

        Ok(NodeRecord {
            id,
            name: field(record, Some(self.name)).to_string(),
            labels,
            properties: parse_properties(field(record, self.properties))?,
        })
    }
}

struct RelationshipLayout {
    source: usize,
    target: usize,
    rel_type: Option<usize>,
    properties: Option<usize>,
}

impl Layout for RelationshipLayout {
    type Record = RelationshipRecord;
    const STREAM: RowStream = RowStream::Relationships;

    fn from_columns(columns: &Columns) -> ImportResult<Self> {
        Ok(Self {
            source: columns.require(Self::STREAM, &["source_id", "source"])?,
            target: columns.require(Self::STREAM, &["target_id", "target"])?,
            rel_type: columns.find(&["type", "relation"]),
            properties: columns.find(&["properties"]),
        })
    }

    fn parse(&self, record: &StringRecord) -> Row<RelationshipRecord> {
        let rel_type = field(record, self.rel_type);
        Ok(RelationshipRecord {
            source: field(record, Some(self.source)).to_string(),
            target: field(record, Some(self.target)).to_string(),
            rel_type: (!rel_type.is_empty()).then(|| rel_type.to_string()),
            properties: parse_properties(field(record, self.properties))?,
        })
    }
}

/// Read every record, turning per-record decode problems into row failures.
/// I/O errors and missing headers abort the whole stream.
fn read_rows<L: Layout, R: Read>(input: R) -> ImportResult<Vec<Row<L::Record>>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input);
    let layout = L::from_columns(&Columns::new(reader.headers()?))?;

    let mut rows = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => rows.push(layout.parse(&record)),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => rows.push(Err(RowError::Malformed(e.to_string()))),
        }
    }
    debug!("Parsed {} {} row(s)", rows.len(), L::STREAM);
    Ok(rows)
}

/// Parse a node CSV stream
pub fn parse_node_csv<R: Read>(input: R) -> ImportResult<Vec<Row<NodeRecord>>> {
    read_rows::<NodeLayout, R>(input)
}

/// Parse a relationship CSV stream
pub fn parse_relationship_csv<R: Read>(input: R) -> ImportResult<Vec<Row<RelationshipRecord>>> {
    read_rows::<RelationshipLayout, R>(input)
}

fn properties_json(properties: &PropertyMap) -> String {
    let object: serde_json::Map<String, serde_json::Value> = properties
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    serde_json::Value::Object(object).to_string()
}

/// Write every node in the node file format, ascending by id
pub fn write_node_csv<W: Write>(store: &GraphStore, output: W) -> ImportResult<()> {
    let mut writer = Writer::from_writer(output);
    writer.write_record(["id", "name", "labels", "properties"])?;
    for node in store.all_nodes() {
        let labels: Vec<&str> = node.labels.iter().map(|l| l.as_str()).collect();
        writer.write_record([
            node.id.to_string(),
            node.name.clone(),
            labels.join("|"),
            properties_json(&node.properties),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write every relationship in the relationship file format
pub fn write_relationship_csv<W: Write>(store: &GraphStore, output: W) -> ImportResult<()> {
    let mut writer = Writer::from_writer(output);
    writer.write_record(["source_id", "target_id", "type", "properties"])?;
    for rel in store.all_relationships() {
        writer.write_record([
            rel.source.to_string(),
            rel.target.to_string(),
            rel.rel_type.to_string(),
            properties_json(&rel.properties),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
