// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Conversion between in-memory property values and primitive wire values.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use uuid::Uuid;

use crate::error::PersistError;
use crate::model::{CustomValue, EnumKind, Image, NodeId, PropertyType, Value};

/// Primitive value as handed to a persister.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "kebab-case")]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    String(SmolStr),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Reference(Uuid),
}

impl WireValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Self::Reference(v) => write!(f, "ref:{v}"),
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        STANDARD.decode(raw).map_err(serde::de::Error::custom)
    }
}

/// Wire data-type tag of a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DataType {
    Boolean,
    Integer,
    String,
    Enum(EnumKind),
    Reference,
    Image,
    Custom(SmolStr),
}

impl DataType {
    pub fn of(ty: PropertyType) -> Self {
        match ty {
            PropertyType::Bool => Self::Boolean,
            PropertyType::Int => Self::Integer,
            PropertyType::Text => Self::String,
            PropertyType::Enum(kind) => Self::Enum(kind),
            PropertyType::Ref => Self::Reference,
            PropertyType::Image => Self::Image,
            PropertyType::Custom(name) => Self::Custom(SmolStr::new_static(name)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("boolean"),
            Self::Integer => f.write_str("integer"),
            Self::String => f.write_str("string"),
            Self::Enum(kind) => write!(f, "enum:{}", kind.as_str()),
            Self::Reference => f.write_str("reference"),
            Self::Image => f.write_str("image"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDataTypeError {
    raw: String,
}

impl fmt::Display for ParseDataTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown data type '{}'", self.raw)
    }
}

impl std::error::Error for ParseDataTypeError {}

impl FromStr for DataType {
    type Err = ParseDataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s {
            "boolean" => Self::Boolean,
            "integer" => Self::Integer,
            "string" => Self::String,
            "reference" => Self::Reference,
            "image" => Self::Image,
            "enum:nullability" => Self::Enum(EnumKind::Nullability),
            "enum:key-rule" => Self::Enum(EnumKind::KeyRule),
            _ => match s.strip_prefix("custom:") {
                Some(name) if !name.is_empty() => Self::Custom(SmolStr::new(name)),
                _ => return Err(ParseDataTypeError { raw: s.to_owned() }),
            },
        };
        Ok(parsed)
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for DataType {
    type Error = ParseDataTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Wire form of one structured (custom) value type.
pub trait CustomCodec {
    fn encode(&self, value: &CustomValue) -> Result<WireValue, PersistError>;
    fn decode(&self, type_name: &str, wire: &WireValue) -> Result<CustomValue, PersistError>;
}

/// Encodes the fields of a custom value as a JSON object inside a wire string.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl CustomCodec for JsonCodec {
    fn encode(&self, value: &CustomValue) -> Result<WireValue, PersistError> {
        let json = serde_json::to_string(value.fields()).map_err(|err| PersistError::Decode {
            data_type: SmolStr::new(value.type_name()),
            reason: err.to_string(),
        })?;
        Ok(WireValue::String(SmolStr::new(json)))
    }

    fn decode(&self, type_name: &str, wire: &WireValue) -> Result<CustomValue, PersistError> {
        let WireValue::String(raw) = wire else {
            return Err(decode_error(type_name, format!("expected a string, got {wire}")));
        };
        let fields: BTreeMap<SmolStr, SmolStr> =
            serde_json::from_str(raw).map_err(|err| decode_error(type_name, err.to_string()))?;
        Ok(CustomValue::from_fields(type_name, fields))
    }
}

/// Length prefix of encoded images.
const IMAGE_PREFIX: usize = 4;

/// The "super-converter": primitives pass through, references become identities, images
/// become a length-prefixed PAM container, enums their names, and custom values go through
/// a registered codec. Anything else is refused.
#[derive(Clone, Default)]
pub struct TypeConverter {
    codecs: HashMap<SmolStr, Rc<dyn CustomCodec>>,
}

impl fmt::Debug for TypeConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.codecs.keys().map(SmolStr::as_str).collect();
        names.sort_unstable();
        f.debug_struct("TypeConverter").field("codecs", &names).finish()
    }
}

impl TypeConverter {
    /// A converter without custom codecs.
    pub fn new() -> Self {
        Self::default()
    }

    /// A converter that knows every custom type the built-in node kinds declare.
    pub fn with_default_codecs() -> Self {
        Self::new().with_codec("data-source", JsonCodec)
    }

    pub fn with_codec(mut self, type_name: &str, codec: impl CustomCodec + 'static) -> Self {
        self.register_codec(type_name, codec);
        self
    }

    pub fn register_codec(&mut self, type_name: &str, codec: impl CustomCodec + 'static) {
        self.codecs.insert(SmolStr::new(type_name), Rc::new(codec));
    }

    pub fn supports(&self, ty: PropertyType) -> bool {
        match ty {
            PropertyType::Custom(name) => self.codecs.contains_key(name),
            _ => true,
        }
    }

    /// Wire tag of a declared type, refusing custom types without a codec.
    pub fn data_type(&self, ty: PropertyType) -> Result<DataType, PersistError> {
        if !self.supports(ty) {
            if let PropertyType::Custom(name) = ty {
                return Err(PersistError::unsupported(name));
            }
        }
        Ok(DataType::of(ty))
    }

    pub fn to_wire(&self, value: &Value) -> Result<WireValue, PersistError> {
        let wire = match value {
            Value::Null => WireValue::Null,
            Value::Bool(v) => WireValue::Bool(*v),
            Value::Int(v) => WireValue::Int(*v),
            Value::Text(v) => WireValue::String(v.clone()),
            Value::Enum(v) => WireValue::String(SmolStr::new_static(v.as_str())),
            Value::Ref(id) => WireValue::Reference(*id.as_uuid()),
            Value::Image(image) => WireValue::Bytes(encode_image(image)?),
            Value::Custom(custom) => {
                let Some(codec) = self.codecs.get(custom.type_name()) else {
                    return Err(PersistError::unsupported(custom.type_name()));
                };
                codec.encode(custom)?
            }
        };
        Ok(wire)
    }

    /// Decodes `wire` as a value of `data_type`. References must resolve to an object the
    /// caller knows about.
    pub fn from_wire(
        &self,
        data_type: &DataType,
        wire: &WireValue,
        resolve: impl Fn(NodeId) -> bool,
    ) -> Result<Value, PersistError> {
        if wire.is_null() {
            return Ok(Value::Null);
        }
        let mismatch = || decode_error(&data_type.to_string(), format!("unexpected {wire}"));
        let value = match (data_type, wire) {
            (DataType::Boolean, WireValue::Bool(v)) => Value::Bool(*v),
            (DataType::Integer, WireValue::Int(v)) => Value::Int(*v),
            (DataType::String, WireValue::String(v)) => Value::Text(v.clone()),
            (DataType::Enum(kind), WireValue::String(v)) => kind
                .parse_variant(v)
                .map(Value::Enum)
                .map_err(|err| decode_error(&data_type.to_string(), err.to_string()))?,
            (DataType::Reference, WireValue::Reference(uuid)) => {
                let id = NodeId::from_uuid(*uuid);
                if !resolve(id) {
                    return Err(PersistError::UnknownObject(id));
                }
                Value::Ref(id)
            }
            (DataType::Image, WireValue::Bytes(bytes)) => Value::Image(decode_image(bytes)?),
            (DataType::Custom(name), _) => {
                let Some(codec) = self.codecs.get(name) else {
                    return Err(PersistError::unsupported(name.clone()));
                };
                Value::Custom(codec.decode(name, wire)?)
            }
            _ => return Err(mismatch()),
        };
        Ok(value)
    }
}

fn encode_image(image: &Image) -> Result<Vec<u8>, PersistError> {
    let body = image.encode_pam();
    let len = u32::try_from(body.len())
        .map_err(|_| decode_error("image", format!("{} bytes do not fit the prefix", body.len())))?;
    let mut out = Vec::with_capacity(IMAGE_PREFIX + body.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

fn decode_image(bytes: &[u8]) -> Result<Image, PersistError> {
    if bytes.len() < IMAGE_PREFIX {
        return Err(decode_error("image", "missing length prefix"));
    }
    let (prefix, body) = bytes.split_at(IMAGE_PREFIX);
    let declared = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if declared != body.len() {
        return Err(decode_error(
            "image",
            format!("length prefix says {declared} bytes, found {}", body.len()),
        ));
    }
    Image::decode_pam(body).map_err(|err| decode_error("image", err.to_string()))
}

fn decode_error(data_type: &str, reason: impl Into<String>) -> PersistError {
    PersistError::Decode {
        data_type: SmolStr::new(data_type),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{DataType, TypeConverter, WireValue};
    use crate::error::PersistError;
    use crate::model::{
        CustomValue, EnumKind, EnumValue, Image, KeyRule, NodeId, Nullability, PropertyType,
        Value,
    };

    fn round_trip(converter: &TypeConverter, ty: PropertyType, value: Value) -> Value {
        let wire = converter.to_wire(&value).expect("encode");
        converter
            .from_wire(&DataType::of(ty), &wire, |_| true)
            .expect("decode")
    }

    #[rstest]
    #[case(PropertyType::Bool, Value::Bool(true))]
    #[case(PropertyType::Int, Value::Int(-12))]
    #[case(PropertyType::Text, Value::from("orders"))]
    #[case(
        PropertyType::Enum(EnumKind::Nullability),
        EnumValue::Nullability(Nullability::Nullable).into()
    )]
    #[case(
        PropertyType::Enum(EnumKind::KeyRule),
        EnumValue::KeyRule(KeyRule::SetNull).into()
    )]
    #[case(PropertyType::Text, Value::Null)]
    fn scalars_survive_conversion(#[case] ty: PropertyType, #[case] value: Value) {
        let converter = TypeConverter::new();
        assert_eq!(round_trip(&converter, ty, value.clone()), value);
    }

    #[test]
    fn references_become_identities_and_must_resolve() {
        let converter = TypeConverter::new();
        let id = NodeId::new();
        let wire = converter.to_wire(&Value::Ref(id)).expect("encode");
        assert_eq!(wire, WireValue::Reference(*id.as_uuid()));

        let err = converter
            .from_wire(&DataType::Reference, &wire, |_| false)
            .expect_err("unresolved");
        assert!(matches!(err, PersistError::UnknownObject(found) if found == id));
    }

    #[test]
    fn image_round_trip_preserves_pixels() {
        let converter = TypeConverter::new();
        let image = Image::new(2, 1, vec![255, 0, 0, 255, 0, 0, 255, 128]).expect("image");
        let WireValue::Bytes(bytes) = converter.to_wire(&Value::Image(image.clone())).expect("encode")
        else {
            panic!("image should encode to bytes");
        };
        let declared = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(declared, bytes.len() - 4);

        let Value::Image(decoded) = round_trip(&converter, PropertyType::Image, Value::Image(image.clone()))
        else {
            panic!("image should decode to an image");
        };
        assert_eq!(decoded.rgba(), image.rgba());
        assert_eq!((decoded.width(), decoded.height()), (2, 1));
    }

    #[test]
    fn truncated_image_is_a_decode_error() {
        let converter = TypeConverter::new();
        let err = converter
            .from_wire(&DataType::Image, &WireValue::Bytes(vec![0, 0, 0, 9, 1]), |_| true)
            .expect_err("truncated");
        assert!(matches!(err, PersistError::Decode { .. }));
    }

    #[test]
    fn custom_values_need_a_codec() {
        let value = Value::Custom(CustomValue::new("data-source").with_field("url", "jdbc:x"));
        let err = TypeConverter::new().to_wire(&value).expect_err("no codec");
        assert!(matches!(err, PersistError::UnsupportedType { ref type_name } if type_name == "data-source"));

        let converter = TypeConverter::with_default_codecs();
        assert_eq!(
            round_trip(&converter, PropertyType::Custom("data-source"), value.clone()),
            value
        );
    }

    #[rstest]
    #[case(DataType::Boolean)]
    #[case(DataType::Enum(EnumKind::KeyRule))]
    #[case(DataType::Custom("data-source".into()))]
    fn data_type_tags_parse_back(#[case] data_type: DataType) {
        let tag = data_type.to_string();
        assert_eq!(tag.parse::<DataType>().expect("parse"), data_type);
    }

    #[test]
    fn wire_values_serialize_bytes_as_base64() {
        let json = serde_json::to_string(&WireValue::Bytes(vec![1, 2, 3])).expect("json");
        assert_eq!(json, r#"{"t":"bytes","v":"AQID"}"#);
        let back: WireValue = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, WireValue::Bytes(vec![1, 2, 3]));
    }
}
