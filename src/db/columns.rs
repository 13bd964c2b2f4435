//! Result column normalization.
//!
//! Servers happily return several columns with the same name
//! (`SELECT a.id, b.id ...`). Rows are keyed by column name, so each column
//! gets a unique name before any row is built.

use super::type_map::portable_type;
use super::{ColumnDescriptor, RawColumn};
use std::collections::HashSet;

/// Builds unique column descriptors for a result set.
///
/// Repeated names get a numeric suffix from one counter shared by the whole
/// result set, so `[a, a, b, a]` becomes `[a, a1, b, a2]`.
pub fn normalize_columns(raw: &[RawColumn]) -> Vec<ColumnDescriptor> {
    let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut duplicates_counter: u32 = 1;

    raw.iter()
        .map(|column| {
            let mut name = column.name.clone();
            while seen.contains(&name) {
                name = format!("{}{}", column.name, duplicates_counter);
                duplicates_counter += 1;
            }
            seen.insert(name.clone());

            ColumnDescriptor {
                friendly_name: name.clone(),
                name,
                column_type: portable_type(column.type_id),
            }
        })
        .collect()
}
