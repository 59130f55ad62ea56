//! # Versioned Snapshot Encoder/Decoder
//!
//! A graph is encoded as a sequence of **virtual keys** (spec.md §4.6),
//! each a header plus a sequence of tagged payloads (`NODES`,
//! `DELETED_NODES`, `EDGES`, `DELETED_EDGES`, `GRAPH_SCHEMA`). This crate
//! writes the whole graph as a single virtual key — nothing in spec.md
//! mandates a particular key count, only that the format *supports*
//! streaming multiple — so one key is a faithful, simpler instance of the
//! format (see DESIGN.md).
//!
//! Only encoder/decoder version 14 (the current version) is implemented.
//! Versions 9-13 are acknowledged, not decoded (spec.md §4.6/§6).
//!
//! Hand-rolled `std::io::Write`/`Read` tagged binary framing, in the style
//! of `examples/other_examples/5fc4c3e1_clockworklabs-SpacetimeDB__crates-
//! commitlog-src-payload-txdata.rs.rs`.

use crate::entity::{Edge, EntityId, LabelId, Node};
use crate::graph::GraphData;
use crate::matrix::MatrixSyncPolicy;
use crate::value::{AttributeId, AttributeSet, MapEntries, Point, Value};
use std::io::{self, Read, Write};
use std::sync::Arc;
use thiserror::Error;

pub const CURRENT_VERSION: u8 = 14;
const MIN_SUPPORTED_VERSION: u8 = 9;

const TAG_NODES: u8 = 0;
const TAG_DELETED_NODES: u8 = 1;
const TAG_EDGES: u8 = 2;
const TAG_DELETED_EDGES: u8 = 3;
const TAG_GRAPH_SCHEMA: u8 = 4;
const TAG_END: u8 = 255;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported snapshot version {0} (supported: {MIN_SUPPORTED_VERSION}-{CURRENT_VERSION})")]
    UnsupportedVersion(u8),
    #[error("snapshot versions 9-13 are acknowledged but not decodable by this crate")]
    LegacyVersionNotImplemented(u8),
    #[error("truncated snapshot: expected {expected} more bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("unknown payload tag {0}")]
    UnknownTag(u8),
    #[error("unknown value tag {0}")]
    UnknownValueTag(u8),
    #[error("invalid UTF-8 in snapshot string")]
    InvalidUtf8,
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

fn write_u64(w: &mut impl Write, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn write_u32(w: &mut impl Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32(r: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn write_u16(w: &mut impl Write, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u16(r: &mut impl Read) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn write_bytes(w: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
    write_u32(w, bytes.len() as u32)?;
    w.write_all(bytes)
}

fn read_bytes(r: &mut impl Read) -> SnapshotResult<Vec<u8>> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn write_str(w: &mut impl Write, s: &str) -> io::Result<()> {
    write_bytes(w, s.as_bytes())
}

fn read_str(r: &mut impl Read) -> SnapshotResult<String> {
    String::from_utf8(read_bytes(r)?).map_err(|_| SnapshotError::InvalidUtf8)
}

fn write_value(w: &mut impl Write, value: &Value) -> io::Result<()> {
    match value {
        Value::Null => w.write_all(&[0])?,
        Value::Bool(b) => {
            w.write_all(&[1, u8::from(*b)])?;
        }
        Value::Int64(i) => {
            w.write_all(&[2])?;
            w.write_all(&i.to_le_bytes())?;
        }
        Value::Double(d) => {
            w.write_all(&[3])?;
            w.write_all(&d.to_le_bytes())?;
        }
        Value::String(s) => {
            w.write_all(&[4])?;
            write_str(w, s)?;
        }
        Value::Point(p) => {
            w.write_all(&[5])?;
            w.write_all(&p.latitude.to_le_bytes())?;
            w.write_all(&p.longitude.to_le_bytes())?;
        }
        Value::Array(items) => {
            w.write_all(&[6])?;
            write_u32(w, items.len() as u32)?;
            for item in items {
                write_value(w, item)?;
            }
        }
        Value::Map(entries) => {
            w.write_all(&[7])?;
            write_u32(w, entries.len() as u32)?;
            for (k, v) in entries {
                write_str(w, k)?;
                write_value(w, v)?;
            }
        }
        Value::Vector(vec) => {
            w.write_all(&[8])?;
            write_u32(w, vec.len() as u32)?;
            for f in vec.iter() {
                w.write_all(&f.to_le_bytes())?;
            }
        }
    }
    Ok(())
}

fn read_value(r: &mut impl Read) -> SnapshotResult<Value> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag)?;
    Ok(match tag[0] {
        0 => Value::Null,
        1 => {
            let mut b = [0u8; 1];
            r.read_exact(&mut b)?;
            Value::Bool(b[0] != 0)
        }
        2 => {
            let mut b = [0u8; 8];
            r.read_exact(&mut b)?;
            Value::Int64(i64::from_le_bytes(b))
        }
        3 => {
            let mut b = [0u8; 8];
            r.read_exact(&mut b)?;
            Value::Double(f64::from_le_bytes(b))
        }
        4 => Value::String(Arc::from(read_str(r)?.as_str())),
        5 => {
            let mut lat = [0u8; 8];
            let mut lon = [0u8; 8];
            r.read_exact(&mut lat)?;
            r.read_exact(&mut lon)?;
            Value::Point(Point::new(f64::from_le_bytes(lat), f64::from_le_bytes(lon)))
        }
        6 => {
            let n = read_u32(r)? as usize;
            let mut items = Vec::with_capacity(n);
            for _ in 0..n {
                items.push(read_value(r)?);
            }
            Value::Array(items)
        }
        7 => {
            let n = read_u32(r)? as usize;
            let mut entries = MapEntries::new();
            for _ in 0..n {
                let k = read_str(r)?;
                let v = read_value(r)?;
                entries.insert(Arc::from(k.as_str()), v);
            }
            Value::Map(entries)
        }
        8 => {
            let n = read_u32(r)? as usize;
            let mut vec = Vec::with_capacity(n);
            for _ in 0..n {
                let mut b = [0u8; 4];
                r.read_exact(&mut b)?;
                vec.push(f32::from_le_bytes(b));
            }
            Value::Vector(Arc::from(vec))
        }
        other => return Err(SnapshotError::UnknownValueTag(other)),
    })
}

fn write_attributes(w: &mut impl Write, attrs: &AttributeSet) -> io::Result<()> {
    write_u32(w, attrs.len() as u32)?;
    for (id, value) in attrs.iter() {
        write_u16(w, *id)?;
        write_value(w, value)?;
    }
    Ok(())
}

fn read_attributes(r: &mut impl Read) -> SnapshotResult<AttributeSet> {
    let n = read_u32(r)? as usize;
    let mut pairs = Vec::with_capacity(n);
    for _ in 0..n {
        let id: AttributeId = read_u16(r)?;
        let value = read_value(r)?;
        pairs.push((id, value));
    }
    Ok(AttributeSet::from_pairs(pairs))
}

/// Encode a full graph snapshot as one virtual key, version 14.
pub fn encode_graph(w: &mut impl Write, graph_name: &str, data: &GraphData) -> SnapshotResult<()> {
    w.write_all(&[CURRENT_VERSION])?;
    write_str(w, graph_name)?;

    let relations: Vec<LabelId> = data.relation_labels().collect();

    write_u64(w, data.node_store().len() as u64)?;
    write_u64(w, data.edge_store().len() as u64)?;
    write_u64(w, data.node_store().deleted_ids().len() as u64)?;
    write_u64(w, data.edge_store().deleted_ids().len() as u64)?;
    write_u32(w, data.label_count() as u32)?;
    write_u32(w, relations.len() as u32)?;
    for &relation in &relations {
        w.write_all(&[u8::from(data.relation_is_multi(relation))])?;
    }

    w.write_all(&[TAG_GRAPH_SCHEMA])?;
    write_u32(w, relations.len() as u32)?;
    for &relation in &relations {
        write_u16(w, relation)?;
    }

    w.write_all(&[TAG_NODES])?;
    write_u64(w, data.node_store().len() as u64)?;
    for (id, node) in data.node_store().iter() {
        write_u64(w, id)?;
        write_u32(w, node.labels.len() as u32)?;
        for &label in &node.labels {
            write_u16(w, label)?;
        }
        write_attributes(w, &node.attributes)?;
    }

    w.write_all(&[TAG_DELETED_NODES])?;
    write_u64(w, data.node_store().deleted_ids().len() as u64)?;
    for &id in data.node_store().deleted_ids() {
        write_u64(w, id)?;
    }

    w.write_all(&[TAG_EDGES])?;
    write_u64(w, data.edge_store().len() as u64)?;
    for (id, edge) in data.edge_store().iter() {
        write_u64(w, id)?;
        write_u64(w, edge.src)?;
        write_u64(w, edge.dest)?;
        write_u16(w, edge.relation)?;
        write_attributes(w, &edge.attributes)?;
    }

    w.write_all(&[TAG_DELETED_EDGES])?;
    write_u64(w, data.edge_store().deleted_ids().len() as u64)?;
    for &id in data.edge_store().deleted_ids() {
        write_u64(w, id)?;
    }

    w.write_all(&[TAG_END])?;
    Ok(())
}

/// Decoded graph contents, handed to the caller to install into a fresh
/// [`GraphData`] (the decoder pre-sizes stores/matrices per spec.md §4.6's
/// "first virtual key" behavior, then switches policy to `RESIZE` during
/// decode and restores `FLUSH_RESIZE` at the end).
pub struct DecodedGraph {
    pub graph_name: String,
    pub data: GraphData,
}

pub fn decode_graph(r: &mut impl Read) -> SnapshotResult<DecodedGraph> {
    let mut version = [0u8; 1];
    r.read_exact(&mut version)?;
    let version = version[0];
    if version < MIN_SUPPORTED_VERSION || version > CURRENT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    if version != CURRENT_VERSION {
        return Err(SnapshotError::LegacyVersionNotImplemented(version));
    }

    let graph_name = read_str(r)?;
    let node_count = read_u64(r)?;
    let edge_count = read_u64(r)?;
    let deleted_node_count = read_u64(r)?;
    let deleted_edge_count = read_u64(r)?;
    let _label_matrix_count = read_u32(r)?;
    let relation_matrix_count = read_u32(r)?;
    let mut relation_is_multi = Vec::with_capacity(relation_matrix_count as usize);
    for _ in 0..relation_matrix_count {
        let mut b = [0u8; 1];
        r.read_exact(&mut b)?;
        relation_is_multi.push(b[0] != 0);
    }

    // Pre-size: the node/edge stores and matrices grow lazily as entities
    // are restored at their exact ids via `insert_at`, starting from a
    // `RESIZE` policy so mid-decode `ensure_capacity` calls never flush.
    let mut data = GraphData::with_capacity_hint(
        (node_count + deleted_node_count) as usize,
        (edge_count + deleted_edge_count) as usize,
    );
    data.set_sync_policy(MatrixSyncPolicy::Resize);

    loop {
        let mut tag = [0u8; 1];
        r.read_exact(&mut tag)?;
        match tag[0] {
            TAG_GRAPH_SCHEMA => {
                let n = read_u32(r)?;
                for _ in 0..n {
                    let _relation: LabelId = read_u16(r)?;
                }
            }
            TAG_NODES => {
                let n = read_u64(r)?;
                for _ in 0..n {
                    let id: EntityId = read_u64(r)?;
                    let label_count = read_u32(r)?;
                    let mut labels = Vec::with_capacity(label_count as usize);
                    for _ in 0..label_count {
                        labels.push(read_u16(r)?);
                    }
                    let attrs = read_attributes(r)?;
                    data.restore_node(id, Node::new(id, labels, attrs));
                }
            }
            TAG_DELETED_NODES => {
                let n = read_u64(r)?;
                for _ in 0..n {
                    let id = read_u64(r)?;
                    data.restore_deleted_node(id);
                }
            }
            TAG_EDGES => {
                let n = read_u64(r)?;
                for _ in 0..n {
                    let id: EntityId = read_u64(r)?;
                    let src = read_u64(r)?;
                    let dest = read_u64(r)?;
                    let relation = read_u16(r)?;
                    let attrs = read_attributes(r)?;
                    data.restore_edge(id, Edge::new(id, src, dest, relation, attrs));
                }
            }
            TAG_DELETED_EDGES => {
                let n = read_u64(r)?;
                for _ in 0..n {
                    let id = read_u64(r)?;
                    data.restore_deleted_edge(id);
                }
            }
            TAG_END => break,
            other => return Err(SnapshotError::UnknownTag(other)),
        }
    }

    data.set_sync_policy(MatrixSyncPolicy::FlushResize);
    data.apply_all_pending(true);

    Ok(DecodedGraph { graph_name, data })
}
