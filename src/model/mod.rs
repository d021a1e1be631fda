//! The resolved rom model: identification plus materialized tables.

pub mod attrs;
pub mod builder;
pub(crate) mod inherit;

pub use builder::{BuildOutcome, ModelBuilder};

use crate::checksum::{self, ChecksumOutcome};
use crate::codec::{self, CodecError, Endianness};
use crate::definition::{Dialect, Node};
use crate::error::{Result, RomError};
use attrs::{parse_file_size, parse_hex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Name of the switch table holding the checksum records.
pub const CHECKSUM_TABLE_NAME: &str = "Checksum Fix";

/// Identification block (`<romid>`) of a rom definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomId {
    pub xmlid: String,
    pub internal_id_address: Option<i64>,
    /// ASCII, or hex bytes when prefixed with `0x`.
    pub internal_id_string: Option<String>,
    pub file_size: Option<u64>,
    pub ram_offset: i64,
    pub ecu_id: Option<String>,
    pub make: Option<String>,
    pub market: Option<String>,
    pub model: Option<String>,
    pub submodel: Option<String>,
    pub transmission: Option<String>,
    pub year: Option<String>,
    pub flash_method: Option<String>,
    pub mem_model: Option<String>,
    pub checksum_module: Option<String>,
    pub obsolete: bool,
}

impl RomId {
    /// Parse a `<romid>` element on its own.
    pub fn from_node(node: &Node) -> std::result::Result<Self, String> {
        let mut id = RomId::default();
        id.apply(node)?;
        Ok(id)
    }

    /// Overlay the fields `node` declares onto `self`.
    pub fn apply(&mut self, node: &Node) -> std::result::Result<(), String> {
        let text = |name: &str| node.child_text(name).map(str::to_string);

        if let Some(xmlid) = text("xmlid") {
            self.xmlid = xmlid;
        }
        if let Some(raw) = node.child_text("internalidaddress") {
            self.internal_id_address =
                Some(parse_hex(raw).ok_or_else(|| format!("invalid internalidaddress '{}'", raw))?);
        }
        if let Some(id) = text("internalidstring") {
            self.internal_id_string = Some(id);
        }
        if let Some(raw) = node.child_text("filesize") {
            self.file_size =
                Some(parse_file_size(raw).ok_or_else(|| format!("invalid filesize '{}'", raw))?);
        }
        if let Some(raw) = node.child_text("ramoffset") {
            self.ram_offset = parse_hex(raw).ok_or_else(|| format!("invalid ramoffset '{}'", raw))?;
        }
        if let Some(raw) = node.child_text("obsolete") {
            self.obsolete = raw == "1" || raw.eq_ignore_ascii_case("true");
        }

        let fields: [(&str, &mut Option<String>); 10] = [
            ("ecuid", &mut self.ecu_id),
            ("make", &mut self.make),
            ("market", &mut self.market),
            ("model", &mut self.model),
            ("submodel", &mut self.submodel),
            ("transmission", &mut self.transmission),
            ("year", &mut self.year),
            ("flashmethod", &mut self.flash_method),
            ("memmodel", &mut self.mem_model),
            ("checksummodule", &mut self.checksum_module),
        ];
        for (name, slot) in fields {
            if let Some(value) = text(name) {
                *slot = Some(value);
            }
        }
        Ok(())
    }

    fn expected_id_bytes(&self) -> Option<Vec<u8>> {
        let id = self.internal_id_string.as_deref()?;
        match id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) {
            Some(hex_digits) => hex::decode(hex_digits).ok(),
            None => Some(id.as_bytes().to_vec()),
        }
    }

    /// Whether this identification describes `image`.
    ///
    /// With an internal id string the bytes at the internal id address must
    /// equal it exactly. Without one, a declared file size must equal the
    /// image length. Anything else never matches.
    pub fn matches(&self, image: &[u8]) -> bool {
        let has_id = self
            .internal_id_string
            .as_deref()
            .is_some_and(|s| !s.is_empty());

        if has_id {
            let (Some(address), Some(expected)) =
                (self.internal_id_address, self.expected_id_bytes())
            else {
                return false;
            };
            let Ok(start) = usize::try_from(address) else {
                return false;
            };
            start
                .checked_add(expected.len())
                .and_then(|end| image.get(start..end))
                .is_some_and(|found| found == expected.as_slice())
        } else {
            self.file_size
                .is_some_and(|size| size == image.len() as u64)
        }
    }
}

/// Table type as declared by the `type` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    OneD,
    TwoD,
    ThreeD,
    XAxis,
    YAxis,
    Switch,
    Other(String),
}

impl TableKind {
    pub fn from_attr(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("1D") => TableKind::OneD,
            Some("2D") => TableKind::TwoD,
            Some("3D") => TableKind::ThreeD,
            Some("X Axis") => TableKind::XAxis,
            Some("Y Axis") | Some("Static Y Axis") => TableKind::YAxis,
            Some("Switch") => TableKind::Switch,
            Some(other) => TableKind::Other(other.to_string()),
        }
    }
}

/// Cell encoding of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    UInt8,
    UInt16,
    UInt32,
    Int8,
    Int16,
    Int32,
    Float,
}

impl StorageType {
    pub fn from_attr(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "uint8" => Some(StorageType::UInt8),
            "uint16" => Some(StorageType::UInt16),
            "uint32" => Some(StorageType::UInt32),
            "int8" => Some(StorageType::Int8),
            "int16" => Some(StorageType::Int16),
            "int32" => Some(StorageType::Int32),
            "float" => Some(StorageType::Float),
            _ => None,
        }
    }

    pub fn width(&self) -> usize {
        match self {
            StorageType::UInt8 | StorageType::Int8 => 1,
            StorageType::UInt16 | StorageType::Int16 => 2,
            StorageType::UInt32 | StorageType::Int32 | StorageType::Float => 4,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            StorageType::Int8 | StorageType::Int16 | StorageType::Int32
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchState {
    pub name: String,
    pub data: Vec<u8>,
}

/// A table bound to a location in the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub kind: TableKind,
    pub category: Option<String>,
    /// Address as written in the definition (RAM-relative).
    pub storage_address: i64,
    pub ram_offset: i64,
    pub storage_type: StorageType,
    pub endian: Endianness,
    pub size_x: usize,
    pub size_y: usize,
    /// Bytes covered in the image.
    pub data_size: usize,
    pub states: Vec<SwitchState>,
    pub axes: Vec<Table>,
    /// Decoded cells, filled by [`Rom::populate`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<f64>,
}

impl Table {
    /// Offset of the table in the image.
    pub fn file_offset(&self) -> usize {
        self.storage_address.wrapping_sub(self.ram_offset) as usize
    }

    /// Number of cells; saturates instead of overflowing.
    pub fn cell_count(&self) -> usize {
        self.size_x.saturating_mul(self.size_y)
    }

    pub fn is_checksum(&self) -> bool {
        self.kind == TableKind::Switch && self.name.eq_ignore_ascii_case(CHECKSUM_TABLE_NAME)
    }

    /// Decode every cell (and every axis) from the image.
    pub fn populate(&mut self, image: &[u8]) -> std::result::Result<(), CodecError> {
        if self.kind != TableKind::Switch {
            let base = self.file_offset();
            let width = self.storage_type.width();
            self.values = (0..self.cell_count())
                .map(|i| {
                    let at = i
                        .checked_mul(width)
                        .and_then(|step| base.checked_add(step))
                        .unwrap_or(usize::MAX);
                    match self.storage_type {
                        StorageType::Float => {
                            codec::read_f32(image, self.endian, at).map(f64::from)
                        }
                        st => codec::read_int(image, self.endian, at, width, st.is_signed())
                            .map(|v| v as f64),
                    }
                })
                .collect::<std::result::Result<_, _>>()?;
        }
        for axis in &mut self.axes {
            axis.populate(image)?;
        }
        Ok(())
    }

    /// The switch state whose data is currently present in the image.
    pub fn current_state(&self, image: &[u8]) -> Option<&SwitchState> {
        let start = self.file_offset();
        self.states.iter().find(|state| {
            start
                .checked_add(state.data.len())
                .and_then(|end| image.get(start..end))
                .is_some_and(|found| found == state.data.as_slice())
        })
    }
}

/// A resolved rom model bound to the image it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rom {
    /// Identification merged along the base chain.
    pub id: RomId,
    /// The matched rom's own `<romid>`, which recognises its image.
    #[serde(default)]
    pub match_id: RomId,
    /// Identity of the definition candidate that matched.
    pub candidate: String,
    pub dialect: Dialect,
    pub tables: Vec<Table>,
    pub image_len: usize,
    /// SHA-256 of the image at build time, hex encoded.
    pub image_sha256: String,
}

impl Rom {
    /// Table by exact name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// The `Checksum Fix` switch table, if declared.
    pub fn checksum_table(&self) -> Option<&Table> {
        self.tables.iter().find(|t| t.is_checksum())
    }

    /// Reject images this rom was not built for.
    ///
    /// Checks length and identification only, so an image whose checksum
    /// fields were rewritten is still accepted.
    pub fn ensure_bound(&self, image: &[u8]) -> Result<()> {
        if image.len() != self.image_len {
            return Err(RomError::ImageMismatch {
                xmlid: self.id.xmlid.clone(),
                reason: format!("length {} differs from {}", image.len(), self.image_len),
            });
        }
        if !self.match_id.matches(image) {
            return Err(RomError::ImageMismatch {
                xmlid: self.id.xmlid.clone(),
                reason: "identification bytes differ".to_string(),
            });
        }
        Ok(())
    }

    /// Decode all table values from the image.
    pub fn populate(&mut self, image: &[u8]) -> Result<()> {
        self.ensure_bound(image)?;
        for table in &mut self.tables {
            table.populate(image)?;
        }
        debug!(xmlid = %self.id.xmlid, tables = self.tables.len(), "Populated tables");
        Ok(())
    }

    /// Validate the checksum table, if this rom has one.
    pub fn validate_checksum(&self, image: &[u8]) -> Result<Option<ChecksumOutcome>> {
        let Some(table) = self.checksum_table() else {
            return Ok(None);
        };
        self.ensure_bound(image)?;
        let outcome = checksum::validate(
            image,
            table.storage_address,
            table.data_size,
            table.ram_offset,
        )?;
        info!(xmlid = %self.id.xmlid, ?outcome, "Checksum validated");
        Ok(Some(outcome))
    }

    /// Rewrite the checksum records in place. Returns false when the rom
    /// has no checksum table.
    pub fn update_checksum(&self, image: &mut [u8]) -> Result<bool> {
        let Some(table) = self.checksum_table() else {
            return Ok(false);
        };
        self.ensure_bound(image)?;
        checksum::calculate(
            image,
            table.storage_address,
            table.data_size,
            table.ram_offset,
        )?;
        info!(xmlid = %self.id.xmlid, "Checksums updated");
        Ok(true)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| RomError::Config(e.to_string()))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RomError::Config(e.to_string()))
    }
}
