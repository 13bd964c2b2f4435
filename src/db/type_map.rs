//! Mapping from PostgreSQL type OIDs to portable column types.

use super::PortableType;

/// Native type OIDs with a portable counterpart.
const TYPE_TABLE: &[(u32, PortableType)] = &[
    (20, PortableType::Integer),    // int8
    (21, PortableType::Integer),    // int2
    (23, PortableType::Integer),    // int4
    (700, PortableType::Float),     // float4
    (701, PortableType::Float),     // float8
    (1700, PortableType::Float),    // numeric
    (16, PortableType::Boolean),    // bool
    (1082, PortableType::Date),     // date
    (1114, PortableType::Datetime), // timestamp
    (1184, PortableType::Datetime), // timestamptz
    (1008, PortableType::String),   // regproc[]
    (1009, PortableType::String),   // text[]
    (1014, PortableType::String),   // bpchar[]
    (1015, PortableType::String),   // varchar[]
    (2951, PortableType::String),   // uuid[]
];

/// Maps a native type OID to its portable type. Unlisted OIDs map to
/// [`PortableType::Unknown`].
pub fn portable_type(type_id: u32) -> PortableType {
    TYPE_TABLE
        .iter()
        .find(|(oid, _)| *oid == type_id)
        .map(|(_, ty)| *ty)
        .unwrap_or(PortableType::Unknown)
}
