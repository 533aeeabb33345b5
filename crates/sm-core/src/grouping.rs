//! Grouping Engine
//!
//! Partitions records into clusters that are merged together. Two modes:
//!
//! - **Continuity** (default): records of the same material whose z-ranges
//!   touch end-to-end and whose footprints match are chained into one
//!   vertical group. Records that do not chain fall back to layer grouping.
//! - **Flat**: records are grouped by `(layer_name, z_bottom, z_top)`.
//!
//! Groups are returned sorted by key so output order is reproducible.

use std::collections::BTreeMap;

use glam::DVec2;

use crate::constants::CONTINUOUS_LAYER_SUFFIX;
use crate::record::SolidRecord;

/// Metadata shared by all members of a group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMetadata {
    /// Layer name of the output record
    pub layer_name: String,
    /// Material tag
    pub material: String,
    /// Color inherited from the first member
    pub color: String,
    /// Lowest member bottom
    pub z_bottom: f64,
    /// Highest member top
    pub z_top: f64,
    /// Whether the group is a continuity chain
    pub merged: bool,
}

/// A cluster of records merged into one output record
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    key: String,
    members: Vec<SolidRecord>,
    metadata: GroupMetadata,
}

impl Group {
    fn new(key: String, members: Vec<SolidRecord>, metadata: GroupMetadata) -> Self {
        Self {
            key,
            members,
            metadata,
        }
    }

    /// Build a continuity chain group from its members (in discovery order)
    fn chain(key: String, material: &str, members: Vec<SolidRecord>) -> Self {
        let z_bottom = members
            .iter()
            .map(|r| r.z_bottom)
            .fold(f64::INFINITY, f64::min);
        let z_top = members
            .iter()
            .map(|r| r.z_top)
            .fold(f64::NEG_INFINITY, f64::max);
        let color = members.first().map(|r| r.color.clone()).unwrap_or_default();

        let metadata = GroupMetadata {
            layer_name: format!("{}{}", material, CONTINUOUS_LAYER_SUFFIX),
            material: material.to_string(),
            color,
            z_bottom,
            z_top,
            merged: true,
        };
        Self::new(key, members, metadata)
    }

    /// Build a layer group seeded with its first record
    fn layer(key: String, first: SolidRecord) -> Self {
        let metadata = GroupMetadata {
            layer_name: first.layer_name.clone(),
            material: first.material.clone(),
            color: first.color.clone(),
            z_bottom: first.z_bottom,
            z_top: first.z_top,
            merged: false,
        };
        Self::new(key, vec![first], metadata)
    }

    /// Group key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Members in discovery order
    pub fn members(&self) -> &[SolidRecord] {
        &self.members
    }

    /// Group metadata
    pub fn metadata(&self) -> &GroupMetadata {
        &self.metadata
    }

    /// Whether the group holds a single record (merging is skipped)
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    /// Consume the group, returning its members
    pub fn into_members(self) -> Vec<SolidRecord> {
        self.members
    }
}

/// Compare two footprints vertex by vertex
///
/// Polygons match when they have the same vertex count and every pair of
/// vertices at the same index differs by at most `precision` on each axis.
/// The comparison is order-sensitive: the same outline starting at another
/// vertex, or wound the other way, does not match.
pub fn polygons_match(a: &[DVec2], b: &[DVec2], precision: f64) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(p, q)| (p.x - q.x).abs() <= precision && (p.y - q.y).abs() <= precision)
}

/// Group records according to the selected mode, sorted by key
pub fn group_records(
    records: Vec<SolidRecord>,
    precision: f64,
    use_material_grouping: bool,
) -> Vec<Group> {
    let groups = if use_material_grouping {
        group_by_continuity(records, precision)
    } else {
        let mut groups = BTreeMap::new();
        for record in records {
            insert_by_layer(&mut groups, record);
        }
        groups
    };

    groups.into_values().collect()
}

fn layer_key(record: &SolidRecord) -> String {
    format!("{}_{}_{}", record.layer_name, record.z_bottom, record.z_top)
}

fn insert_by_layer(groups: &mut BTreeMap<String, Group>, record: SolidRecord) {
    let key = layer_key(&record);
    match groups.get_mut(&key) {
        Some(group) => group.members.push(record),
        None => {
            groups.insert(key.clone(), Group::layer(key, record));
        }
    }
}

/// Split records by material, keeping first-appearance order
fn partition_by_material(records: Vec<SolidRecord>) -> Vec<(String, Vec<SolidRecord>)> {
    let mut partitions: Vec<(String, Vec<SolidRecord>)> = Vec::new();
    for record in records {
        match partitions.iter_mut().find(|(m, _)| *m == record.material) {
            Some((_, members)) => members.push(record),
            None => partitions.push((record.material.clone(), vec![record])),
        }
    }
    partitions
}

/// Greedy chaining over records sorted by bottom elevation
///
/// Returns chains as index lists into `records`. A record joins the current
/// chain when its bottom touches the top of any record already in the chain
/// and its footprint matches that record's footprint.
fn find_chains(records: &[SolidRecord], precision: f64) -> Vec<Vec<usize>> {
    let footprints: Vec<Vec<DVec2>> = records.iter().map(|r| r.footprint().points).collect();
    let mut visited = vec![false; records.len()];
    let mut chains = Vec::new();

    for i in 0..records.len() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let mut chain = vec![i];

        for j in (i + 1)..records.len() {
            if visited[j] {
                continue;
            }
            let touches = chain.iter().any(|&k| {
                (records[j].z_bottom - records[k].z_top).abs() < precision
                    && polygons_match(&footprints[j], &footprints[k], precision)
            });
            if touches {
                chain.push(j);
                visited[j] = true;
            }
        }

        chains.push(chain);
    }

    chains
}

fn group_by_continuity(records: Vec<SolidRecord>, precision: f64) -> BTreeMap<String, Group> {
    let mut groups = BTreeMap::new();
    let mut chain_count = 0usize;

    for (material, mut members) in partition_by_material(records) {
        members.sort_by(|a, b| a.z_bottom.total_cmp(&b.z_bottom));
        let chains = find_chains(&members, precision);

        let mut slots: Vec<Option<SolidRecord>> = members.into_iter().map(Some).collect();
        for chain in chains {
            let chained: Vec<SolidRecord> =
                chain.iter().filter_map(|&i| slots[i].take()).collect();

            if chained.len() > 1 {
                let key = format!("material_{}_group_{}", material, chain_count);
                chain_count += 1;
                tracing::debug!("Chained {} '{}' solids into {}", chained.len(), material, key);
                groups.insert(key.clone(), Group::chain(key, &material, chained));
            } else {
                for record in chained {
                    insert_by_layer(&mut groups, record);
                }
            }
        }
    }

    groups
}
