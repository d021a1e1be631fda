//! Builds a [`Rom`] from a normalized definition tree and an image.
//!
//! 1. find the first `<rom>` whose own `<romid>` matches the image
//! 2. follow its `base` chain, merging romid and tables root-most first
//! 3. flatten table-level `base` references
//! 4. drop the tree, then bind each table to an image offset

use super::attrs::{parse_hex, parse_number, parse_state_bytes};
use super::inherit::{flatten_table, walk_chain, ChainError, TableDef, TableSet};
use super::{Rom, RomId, StorageType, SwitchState, Table, TableKind};
use crate::codec::{CodecError, Endianness};
use crate::config::InheritanceConfig;
use crate::definition::{Dialect, Node, NormalizedTree};
use crate::error::{Result, RomError};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Per-candidate build result. Errors are returned separately and are
/// fatal to the whole search.
#[derive(Debug)]
pub enum BuildOutcome {
    Matched(Rom),
    /// The definition does not describe this image.
    NoMatch,
}

/// Everything needed to materialize tables once the tree is gone.
struct Resolved {
    id: RomId,
    match_id: RomId,
    tables: Vec<TableDef>,
}

#[derive(Debug, Clone)]
pub struct ModelBuilder {
    max_depth: usize,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new(&InheritanceConfig::default())
    }
}

impl ModelBuilder {
    pub fn new(config: &InheritanceConfig) -> Self {
        Self {
            max_depth: config.max_depth,
        }
    }

    /// Build a rom model, consuming the tree.
    pub fn build(&self, tree: NormalizedTree, image: &[u8]) -> Result<BuildOutcome> {
        let candidate = tree.source.clone();
        let dialect = tree.dialect.clone();

        let resolved = self.resolve(&tree, image)?;
        drop(tree);

        let Some(resolved) = resolved else {
            return Ok(BuildOutcome::NoMatch);
        };
        let rom = materialize(resolved, candidate, dialect, image)?;
        info!(
            xmlid = %rom.id.xmlid,
            candidate = %rom.candidate,
            tables = rom.tables.len(),
            "Rom definition matched"
        );
        Ok(BuildOutcome::Matched(rom))
    }

    fn resolve(&self, tree: &NormalizedTree, image: &[u8]) -> Result<Option<Resolved>> {
        let candidate = tree.source.as_str();
        if tree.root.name != "roms" {
            return Err(RomError::malformed(
                candidate,
                format!("root element is <{}>, expected <roms>", tree.root.name),
            ));
        }

        let roms: Vec<&Node> = tree.root.children_named("rom").collect();
        let mut by_xmlid: HashMap<String, &Node> = HashMap::new();
        for rom in &roms {
            by_xmlid.entry(xmlid_of(rom)).or_insert(*rom);
        }

        let Some((matched, match_id)) = find_match(candidate, &roms, image)? else {
            debug!(candidate, roms = roms.len(), "No rom matches image");
            return Ok(None);
        };

        let chain = match walk_chain(
            matched,
            xmlid_of,
            |rom| rom.attr("base").map(str::trim).filter(|b| !b.is_empty()).map(str::to_string),
            |xmlid| by_xmlid.get(xmlid).copied(),
            self.max_depth,
        ) {
            Ok(chain) => chain,
            Err(ChainError::MissingBase { from, base }) => {
                warn!(candidate, rom = %from, base = %base, "Base rom not found in definition");
                return Ok(None);
            }
            Err(err) => return Err(chain_error(candidate, err)),
        };

        let mut id = RomId::default();
        let mut set = TableSet::default();
        for rom in chain.iter().rev() {
            if let Some(romid) = rom.child("romid") {
                id.apply(romid)
                    .map_err(|msg| RomError::malformed(candidate, msg))?;
            }
            for node in rom.children_named("table") {
                let table = TableDef::from_node(node);
                if table.name.is_empty() {
                    return Err(RomError::malformed(
                        candidate,
                        format!("table without a name in rom {}", xmlid_of(rom)),
                    ));
                }
                set.merge(table);
            }
        }
        debug!(
            candidate,
            xmlid = %id.xmlid,
            depth = chain.len(),
            tables = set.len(),
            "Rom inheritance resolved"
        );

        let mut tables = Vec::with_capacity(set.len());
        for table in set.iter() {
            let flat = flatten_table(table, &set, self.max_depth).map_err(|err| match err {
                ChainError::MissingBase { from, base } => RomError::malformed(
                    candidate,
                    format!("table '{}' is based on unknown table '{}'", from, base),
                ),
                other => chain_error(candidate, other),
            })?;
            tables.push(flat);
        }

        Ok(Some(Resolved {
            id,
            match_id,
            tables,
        }))
    }
}

fn xmlid_of(rom: &Node) -> String {
    rom.child("romid")
        .and_then(|id| id.child_text("xmlid"))
        .unwrap_or_default()
        .to_string()
}

/// First rom whose own `<romid>` matches, with that romid parsed.
fn find_match<'a>(
    candidate: &str,
    roms: &[&'a Node],
    image: &[u8],
) -> Result<Option<(&'a Node, RomId)>> {
    for rom in roms {
        let Some(romid) = rom.child("romid") else {
            continue;
        };
        let id = RomId::from_node(romid).map_err(|msg| RomError::malformed(candidate, msg))?;
        if id.matches(image) {
            return Ok(Some((*rom, id)));
        }
    }
    Ok(None)
}

fn chain_error(candidate: &str, err: ChainError) -> RomError {
    match err {
        ChainError::Cycle(chain) => RomError::CyclicInheritance {
            candidate: candidate.to_string(),
            chain,
        },
        ChainError::TooDeep { limit } => RomError::ResourceExhausted {
            resource: "inheritance depth".to_string(),
            used: limit as u64 + 1,
            limit: limit as u64,
        },
        ChainError::MissingBase { from, base } => RomError::malformed(
            candidate,
            format!("'{}' is based on unknown '{}'", from, base),
        ),
    }
}

fn materialize(resolved: Resolved, candidate: String, dialect: Dialect, image: &[u8]) -> Result<Rom> {
    let ram_offset = resolved.id.ram_offset;
    let mut tables = Vec::with_capacity(resolved.tables.len());
    for def in &resolved.tables {
        if let Some(table) = bind_table(def, ram_offset, image.len(), &candidate)? {
            tables.push(table);
        }
    }

    Ok(Rom {
        id: resolved.id,
        match_id: resolved.match_id,
        candidate,
        dialect,
        tables,
        image_len: image.len(),
        image_sha256: hex::encode(Sha256::digest(image)),
    })
}

fn bind_table(def: &TableDef, ram_offset: i64, image_len: usize, candidate: &str) -> Result<Option<Table>> {
    let label = if def.name.is_empty() {
        def.attr("type").unwrap_or("axis").to_string()
    } else {
        def.name.clone()
    };
    let invalid = |key: &str, raw: &str| {
        RomError::malformed(candidate, format!("table '{}': invalid {} '{}'", label, key, raw))
    };

    let Some(raw_address) = def.attr("storageaddress") else {
        debug!(table = %label, "Table without storage address skipped");
        return Ok(None);
    };
    let storage_address = parse_hex(raw_address).ok_or_else(|| invalid("storageaddress", raw_address))?;

    let kind = TableKind::from_attr(def.attr("type"));
    let storage_type = match def.attr("storagetype") {
        Some(raw) => StorageType::from_attr(raw).ok_or_else(|| invalid("storagetype", raw))?,
        None => StorageType::UInt8,
    };
    let endian = match def.attr("endian") {
        Some(raw) => Endianness::from_attr(raw).ok_or_else(|| invalid("endian", raw))?,
        None => Endianness::Big,
    };
    let dimension = |key: &str| -> Result<usize> {
        match def.attr(key) {
            Some(raw) => parse_number(raw)
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| invalid(key, raw)),
            None => Ok(1),
        }
    };
    let size_x = dimension("sizex")?;
    let size_y = dimension("sizey")?;

    let states = def
        .states
        .iter()
        .map(|(name, data)| {
            parse_state_bytes(data)
                .map(|data| SwitchState {
                    name: name.clone(),
                    data,
                })
                .ok_or_else(|| invalid("state data", data.as_str()))
        })
        .collect::<Result<Vec<_>>>()?;

    let data_size = match def.attr("datasize") {
        Some(raw) => parse_number(raw)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| invalid("datasize", raw))?,
        None if kind == TableKind::Switch => states.first().map_or(0, |s| s.data.len()),
        None => size_x
            .checked_mul(size_y)
            .and_then(|cells| cells.checked_mul(storage_type.width()))
            .ok_or_else(|| invalid("dimensions", format!("{}x{}", size_x, size_y).as_str()))?,
    };

    // populate reads every cell, so the cells must fit as well as datasize
    let extent = if kind == TableKind::Switch {
        data_size
    } else {
        let cells = size_x
            .checked_mul(size_y)
            .and_then(|cells| cells.checked_mul(storage_type.width()))
            .ok_or_else(|| invalid("dimensions", format!("{}x{}", size_x, size_y).as_str()))?;
        cells.max(data_size)
    };

    let offset = storage_address.checked_sub(ram_offset).unwrap_or(i64::MAX);
    let in_bounds = usize::try_from(offset)
        .ok()
        .and_then(|start| start.checked_add(extent))
        .is_some_and(|end| end <= image_len);
    if !in_bounds {
        warn!(table = %label, offset, extent, image_len, "Table lies outside the image");
        return Err(CodecError::OutOfRange {
            offset,
            width: extent,
            len: image_len,
        }
        .into());
    }

    let mut axes = Vec::with_capacity(def.axes.len());
    for axis in &def.axes {
        if let Some(table) = bind_table(axis, ram_offset, image_len, candidate)? {
            axes.push(table);
        }
    }

    Ok(Some(Table {
        name: label,
        kind,
        category: def.attr("category").map(str::to_string),
        storage_address,
        ram_offset,
        storage_type,
        endian,
        size_x,
        size_y,
        data_size,
        states,
        axes,
        values: Vec::new(),
    }))
}
