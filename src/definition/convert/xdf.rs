//! TunerPro XDF definitions.
//!
//! An XDF describes a single binary layout without any identification
//! bytes, so the converted rom is matched on file size (from the header
//! `REGION`). Base offsets become the rom's RAM offset:
//!
//! ```text
//! <BASEOFFSET offset="o" subtract="0"/>   file = address + o   ramoffset = -o
//! <BASEOFFSET offset="o" subtract="1"/>   file = address - o   ramoffset =  o
//! ```

use super::ConversionLayer;
use crate::config::ParserConfig;
use crate::definition::tree::parse_xml;
use crate::definition::{DefinitionCandidate, Dialect, Node, NormalizedTree};
use crate::error::{Result, RomError};
use crate::model::attrs::{format_hex, parse_number};
use tracing::debug;

const FLAG_SIGNED: i64 = 0x01;
const FLAG_LSB_FIRST: i64 = 0x02;
const FLAG_FLOAT: i64 = 0x10000;

/// Converts `XDFFORMAT` documents into the native `<roms>` shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct XdfConversionLayer;

impl ConversionLayer for XdfConversionLayer {
    fn name(&self) -> &str {
        "xdf"
    }

    fn dialect(&self) -> Dialect {
        Dialect::TunerProXdf
    }

    fn convert(
        &self,
        candidate: &DefinitionCandidate,
        content: &[u8],
        parser: &ParserConfig,
    ) -> Result<NormalizedTree> {
        let id = candidate.identity();
        let text = std::str::from_utf8(content)
            .map_err(|e| RomError::unsupported(&id, format!("not UTF-8 text: {}", e)))?;

        let xdf = parse_xml(text, parser).map_err(|e| match e {
            roxmltree::Error::NodesLimitReached => RomError::ResourceExhausted {
                resource: "definition nodes".to_string(),
                used: parser.nodes_limit as u64,
                limit: parser.nodes_limit as u64,
            },
            other => RomError::unsupported(&id, other.to_string()),
        })?;

        if xdf.name != "XDFFORMAT" {
            return Err(RomError::unsupported(
                &id,
                format!("root element is <{}>, expected <XDFFORMAT>", xdf.name),
            ));
        }

        let root = convert_document(&xdf, &candidate.stem())
            .map_err(|reason| RomError::unsupported(&id, reason))?;
        debug!(candidate = %id, "Converted XDF definition");

        Ok(NormalizedTree {
            root,
            dialect: Dialect::TunerProXdf,
            source: id,
        })
    }
}

fn number(node: &Node, key: &str, default: i64) -> std::result::Result<i64, String> {
    match node.attr(key) {
        Some(raw) => {
            parse_number(raw).ok_or_else(|| format!("invalid {} '{}' on <{}>", key, raw, node.name))
        }
        None => Ok(default),
    }
}

fn convert_document(xdf: &Node, fallback_title: &str) -> std::result::Result<Node, String> {
    let header = xdf.child("XDFHEADER");
    let title = header
        .and_then(|h| h.child_text("deftitle"))
        .unwrap_or(fallback_title);

    let mut romid = Node::new("romid").with_child(Node::new("xmlid").with_text(title));

    if let Some(region) = header.and_then(|h| h.child("REGION")) {
        if region.attr("size").is_some() {
            let size = number(region, "size", 0)?;
            romid.push(Node::new("filesize").with_text(size.to_string()));
        }
    }

    if let Some(base) = header.and_then(|h| h.child("BASEOFFSET")) {
        let offset = number(base, "offset", 0)?;
        let ram_offset = if number(base, "subtract", 0)? != 0 {
            offset
        } else {
            -offset
        };
        romid.push(Node::new("ramoffset").with_text(format_hex(ram_offset)));
    }

    let mut rom = Node::new("rom").with_child(romid);
    for table in xdf.children_named("XDFTABLE") {
        if let Some(converted) = convert_table(table)? {
            rom.push(converted);
        }
    }
    for constant in xdf.children_named("XDFCONSTANT") {
        if let Some(converted) = convert_constant(constant)? {
            rom.push(converted);
        }
    }

    Ok(Node::new("roms").with_child(rom))
}

/// Copy address, element type and byte order from `EMBEDDEDDATA`.
/// `None` when the data has no address (label-only axes).
fn with_storage(table: Node, data: &Node) -> std::result::Result<Option<Node>, String> {
    if data.attr("mmedaddress").is_none() {
        return Ok(None);
    }
    let address = number(data, "mmedaddress", 0)?;
    let bits = number(data, "mmedelementsizebits", 8)?;
    let flags = number(data, "mmedtypeflags", 0)?;

    let storage_type = if flags & FLAG_FLOAT != 0 {
        if bits != 32 {
            return Err(format!("float element of {} bits is not supported", bits));
        }
        "float".to_string()
    } else {
        if !matches!(bits, 8 | 16 | 32) {
            return Err(format!("element size of {} bits is not supported", bits));
        }
        let sign = if flags & FLAG_SIGNED != 0 { "int" } else { "uint" };
        format!("{}{}", sign, bits)
    };
    let endian = if flags & FLAG_LSB_FIRST != 0 { "little" } else { "big" };

    Ok(Some(
        table
            .with_attr("storageaddress", format_hex(address))
            .with_attr("storagetype", storage_type)
            .with_attr("endian", endian),
    ))
}

fn title_of(node: &Node) -> String {
    node.child_text("title")
        .map(str::to_string)
        .or_else(|| node.attr("uniqueid").map(|id| format!("Table {}", id)))
        .unwrap_or_else(|| "Untitled".to_string())
}

fn convert_table(table: &Node) -> std::result::Result<Option<Node>, String> {
    let axis = |id: &str| {
        table
            .children_named("XDFAXIS")
            .find(|a| a.attr("id") == Some(id))
    };

    let Some(data) = axis("z").and_then(|z| z.child("EMBEDDEDDATA")) else {
        debug!(table = %title_of(table), "XDF table without z data skipped");
        return Ok(None);
    };

    let rows = number(data, "mmedrowcount", 1)?.max(1);
    let cols = number(data, "mmedcolcount", 1)?.max(1);
    let kind = match (rows > 1, cols > 1) {
        (true, true) => "3D",
        (false, false) => "1D",
        _ => "2D",
    };

    let node = Node::new("table")
        .with_attr("type", kind)
        .with_attr("name", title_of(table))
        .with_attr("sizex", cols.to_string())
        .with_attr("sizey", rows.to_string());
    let Some(mut node) = with_storage(node, data)? else {
        return Ok(None);
    };

    for (id, axis_type, default_count) in [("x", "X Axis", cols), ("y", "Y Axis", rows)] {
        let Some(axis_node) = axis(id) else { continue };
        let Some(axis_data) = axis_node.child("EMBEDDEDDATA") else {
            continue;
        };
        let count = match axis_node.child_text("indexcount") {
            Some(raw) => parse_number(raw).ok_or_else(|| format!("invalid indexcount '{}'", raw))?,
            None => default_count,
        };
        let axis_table = Node::new("table")
            .with_attr("type", axis_type)
            .with_attr("sizex", count.to_string());
        if let Some(axis_table) = with_storage(axis_table, axis_data)? {
            node.push(axis_table);
        }
    }

    Ok(Some(node))
}

fn convert_constant(constant: &Node) -> std::result::Result<Option<Node>, String> {
    let Some(data) = constant.child("EMBEDDEDDATA") else {
        return Ok(None);
    };
    let node = Node::new("table")
        .with_attr("type", "1D")
        .with_attr("name", title_of(constant));
    with_storage(node, data)
}
