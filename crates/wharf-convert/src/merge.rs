//! Projected volume merging
//!
//! A container may mount only one volume per path, so mounts that target
//! the same directory are combined into a single projected volume.
//!
//! The pass runs in three steps:
//! 1. Mounts sharing an exact target are turned into a directory of items,
//!    provided every one of them is projectable and names a distinct key.
//! 2. Every remaining projectable mount is anchored: a keyed mount at the
//!    parent directory of its target, a whole mount at its own target.
//!    Anchors with several contributors become one projected volume.
//! 3. Mount points nested inside another one are folded into the outer
//!    projection when the outer point aggregates a directory and the inner
//!    one only contributes keyed items. Any other nesting is a conflict.
//!
//! Only config map and secret volumes are projectable.

use indexmap::IndexMap;
use k8s_openapi::api::core::v1::{
    ConfigMapProjection, KeyToPath, ProjectedVolumeSource, SecretProjection, Volume, VolumeMount,
    VolumeProjection,
};

use crate::error::{ConvertError, ConvertErrorKind, Result};
use crate::volume::MountPlan;

/// Projection template for a projectable volume
#[derive(Debug, Clone)]
struct Source {
    projection: VolumeProjection,
    mode: Option<i32>,
}

impl Source {
    fn of(plan: &MountPlan) -> Option<Self> {
        let volume = plan.volume.as_ref()?;
        if let Some(config_map) = &volume.config_map {
            return Some(Self {
                projection: VolumeProjection {
                    config_map: Some(ConfigMapProjection {
                        name: config_map.name.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                mode: config_map.default_mode,
            });
        }
        let secret = volume.secret.as_ref()?;
        let name = secret.secret_name.clone()?;
        Some(Self {
            projection: VolumeProjection {
                secret: Some(SecretProjection {
                    name: name.into(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            mode: secret.default_mode,
        })
    }

    /// Like [`Source::of`], but a sub path spanning directories cannot name a key
    fn keyed(plan: &MountPlan) -> Option<Self> {
        match plan.mount.sub_path.as_deref() {
            Some(sub_path) if sub_path.contains('/') => None,
            _ => Self::of(plan),
        }
    }

    fn item(&self, key: &str, path: &str) -> KeyToPath {
        KeyToPath {
            key: key.to_string(),
            path: path.to_string(),
            mode: self.mode,
        }
    }

    fn with_items(&self, items: Option<Vec<KeyToPath>>) -> VolumeProjection {
        let mut projection = self.projection.clone();
        if let Some(config_map) = projection.config_map.as_mut() {
            config_map.items = items;
        } else if let Some(secret) = projection.secret.as_mut() {
            secret.items = items;
        }
        projection
    }
}

/// A contribution to a projection; `items` is `None` for a whole volume
#[derive(Debug, Clone)]
struct Member {
    entry: usize,
    items: Option<Vec<KeyToPath>>,
}

#[derive(Debug, Clone)]
enum UnitKind {
    /// Kept exactly as converted
    Plain(usize),
    Projection {
        members: Vec<Member>,
        composite: bool,
    },
}

/// A final mount point
#[derive(Debug, Clone)]
struct Unit {
    path: String,
    /// Directory the member item paths are relative to
    dir: String,
    first: usize,
    kind: UnitKind,
}

impl Unit {
    fn plain(entry: usize, path: &str) -> Self {
        Self {
            path: path.to_string(),
            dir: path.to_string(),
            first: entry,
            kind: UnitKind::Plain(entry),
        }
    }

    fn aggregates(&self) -> bool {
        match &self.kind {
            UnitKind::Plain(_) => false,
            UnitKind::Projection { members, composite } => {
                *composite || members.iter().any(|m| m.items.is_none())
            }
        }
    }

    fn is_keyed(&self) -> bool {
        match &self.kind {
            UnitKind::Plain(_) => false,
            UnitKind::Projection { members, .. } => members.iter().all(|m| m.items.is_some()),
        }
    }
}

fn conflict(
    plans: &[MountPlan],
    entry: usize,
    path: &str,
    reason: impl Into<String>,
) -> ConvertError {
    ConvertError::new(ConvertErrorKind::VolumeMountConflict {
        path: path.to_string(),
        reason: reason.into(),
    })
    .within(plans[entry].origin)
}

fn parent_dir(path: &str) -> Option<&str> {
    match path.rsplit_once('/') {
        Some(("", _)) | None => None,
        Some((parent, _)) => Some(parent),
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_nested(inner: &str, outer: &str) -> bool {
    if outer == "/" {
        return inner != "/";
    }
    inner
        .strip_prefix(outer)
        .is_some_and(|rest| rest.starts_with('/'))
}

fn relative<'a>(dir: &'a str, outer: &str) -> &'a str {
    dir.strip_prefix(outer)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(dir)
}

fn depth(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

/// Merge the mounts of one container
///
/// `plans` must be in declaration order, volumes before files. Returns the
/// container's volumes and mounts, both ordered by the first declaration
/// contributing to them.
pub fn collapse_mounts(
    container: &str,
    plans: Vec<MountPlan>,
) -> Result<(Vec<Volume>, Vec<VolumeMount>)> {
    let sources: Vec<Option<Source>> = plans.iter().map(Source::keyed).collect();

    let mut by_target: IndexMap<&str, Vec<usize>> = IndexMap::new();
    for (entry, plan) in plans.iter().enumerate() {
        by_target.entry(plan.mount.mount_path.as_str()).or_default().push(entry);
    }

    let mut units = Vec::new();
    let mut anchors: IndexMap<String, (Vec<Member>, bool)> = IndexMap::new();

    for (target, group) in &by_target {
        if let [entry] = group.as_slice() {
            let entry = *entry;
            let sub_path = plans[entry].mount.sub_path.as_deref();
            match (&sources[entry], sub_path) {
                (None, _) => units.push(Unit::plain(entry, target)),
                (Some(_), None) => {
                    let slot = anchors.entry(target.to_string()).or_default();
                    slot.0.push(Member { entry, items: None });
                }
                (Some(source), Some(key)) => match parent_dir(target) {
                    Some(parent) => {
                        let slot = anchors.entry(parent.to_string()).or_default();
                        slot.0.push(Member {
                            entry,
                            items: Some(vec![source.item(key, base_name(target))]),
                        });
                    }
                    None => units.push(Unit::plain(entry, target)),
                },
            }
            continue;
        }

        let mut seen: Vec<Option<&str>> = Vec::with_capacity(group.len());
        for &entry in group {
            let Some(source) = &sources[entry] else {
                return Err(conflict(
                    &plans,
                    entry,
                    target,
                    "a volume that cannot be projected shares this mount path",
                ));
            };
            let sub_path = plans[entry].mount.sub_path.as_deref();
            if seen.contains(&sub_path) {
                let reason = match sub_path {
                    Some(key) => format!("sub path '{}' is mounted more than once", key),
                    None => "the whole volume is mounted more than once".to_string(),
                };
                return Err(conflict(&plans, entry, target, reason));
            }
            seen.push(sub_path);

            let slot = anchors.entry(target.to_string()).or_default();
            slot.0.push(Member {
                entry,
                items: sub_path.map(|key| vec![source.item(key, key)]),
            });
            slot.1 = true;
        }
    }

    for (anchor, (mut members, composite)) in anchors {
        members.sort_by_key(|m| m.entry);
        for (index, member) in members.iter().enumerate() {
            let volume = &plans[member.entry].mount.name;
            let overlaps = members[..index].iter().any(|other| {
                plans[other.entry].mount.name == *volume
                    && (other.items.is_none() || member.items.is_none())
            });
            if overlaps {
                return Err(conflict(
                    &plans,
                    member.entry,
                    &anchor,
                    format!("volume '{}' is mounted both whole and by key", volume),
                ));
            }
        }

        let composite = composite || members.len() > 1;
        let first = members[0].entry;
        let path = if !composite && members[0].items.is_some() {
            plans[first].mount.mount_path.clone()
        } else {
            anchor.clone()
        };
        units.push(Unit {
            path,
            dir: anchor,
            first,
            kind: UnitKind::Projection { members, composite },
        });
    }

    units.sort_by(|a, b| {
        depth(&a.path)
            .cmp(&depth(&b.path))
            .then(a.first.cmp(&b.first))
    });

    let mut kept: Vec<Unit> = Vec::with_capacity(units.len());
    for unit in units {
        let outer = kept
            .iter()
            .enumerate()
            .filter(|(_, k)| k.path == unit.path || is_nested(&unit.path, &k.path))
            .max_by_key(|(_, k)| k.path.len())
            .map(|(index, _)| index);

        let Some(outer) = outer else {
            kept.push(unit);
            continue;
        };
        let outer = &mut kept[outer];

        if outer.path == unit.path {
            return Err(conflict(&plans, unit.first, &unit.path, "mounted more than once"));
        }
        if !(outer.aggregates() && unit.is_keyed()) {
            return Err(conflict(
                &plans,
                unit.first,
                &unit.path,
                format!("nested under the mount at '{}'", outer.path),
            ));
        }

        let prefix = relative(&unit.dir, &outer.path).to_string();
        tracing::trace!(
            container,
            inner = %unit.path,
            outer = %outer.path,
            "folding nested mount into projection"
        );

        let (
            UnitKind::Projection { members: inner, .. },
            UnitKind::Projection { members, composite },
        ) = (unit.kind, &mut outer.kind)
        else {
            continue;
        };
        for mut member in inner {
            if let Some(items) = member.items.as_mut() {
                for item in items.iter_mut() {
                    if !prefix.is_empty() {
                        item.path = format!("{}/{}", prefix, item.path);
                    }
                }
            }
            members.push(member);
        }
        members.sort_by_key(|m| m.entry);
        *composite = true;
        outer.first = outer.first.min(unit.first);
    }

    kept.sort_by_key(|unit| unit.first);

    let mut volumes: Vec<Volume> = Vec::new();
    let mut mounts = Vec::with_capacity(kept.len());
    let mut projected = 0;

    for unit in kept {
        match unit.kind {
            UnitKind::Plain(entry) => {
                let plan = &plans[entry];
                mounts.push(plan.mount.clone());
                if let Some(volume) = &plan.volume {
                    push_volume(&mut volumes, volume.clone());
                }
            }
            UnitKind::Projection { members, composite: false } => {
                let plan = &plans[members[0].entry];
                mounts.push(plan.mount.clone());
                if let Some(volume) = &plan.volume {
                    push_volume(&mut volumes, volume.clone());
                }
            }
            UnitKind::Projection { members, composite: true } => {
                let name = format!("{}-projected-{}", container, projected);
                projected += 1;

                let projections = members
                    .into_iter()
                    .filter_map(|member| {
                        sources[member.entry]
                            .as_ref()
                            .map(|source| source.with_items(member.items))
                    })
                    .collect::<Vec<_>>();

                tracing::debug!(
                    container,
                    volume = %name,
                    path = %unit.path,
                    sources = projections.len(),
                    "merged mounts into projected volume"
                );

                push_volume(
                    &mut volumes,
                    Volume {
                        name: name.clone(),
                        projected: Some(ProjectedVolumeSource {
                            sources: Some(projections),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                );
                mounts.push(VolumeMount {
                    name,
                    mount_path: unit.path,
                    read_only: Some(true),
                    ..Default::default()
                });
            }
        }
    }

    Ok((volumes, mounts))
}

/// Append a volume unless one with the same name is already present
pub(crate) fn push_volume(volumes: &mut Vec<Volume>, volume: Volume) {
    if !volumes.iter().any(|v| v.name == volume.name) {
        volumes.push(volume);
    }
}
