//! Regular property stores: the working (possibly locally-modified)
//! proplist and the last-received pristine proplist, one JSON map per
//! versioned node (`props`, `prop-base`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::paths;

pub type PropMap = BTreeMap<String, String>;

fn read_map(path: &Path) -> Result<PropMap> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_default()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PropMap::default()),
        Err(e) => Err(e.into()),
    }
}

fn write_map(path: &Path, map: &PropMap) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(map)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(tmp, path)?;
    Ok(())
}

pub fn read_working(dir: &Path, name: &str) -> Result<PropMap> {
    read_map(&paths::props_dir(dir).join(format!("{name}.json")))
}

pub fn write_working(dir: &Path, name: &str, map: &PropMap) -> Result<()> {
    write_map(&paths::props_dir(dir).join(format!("{name}.json")), map)
}

pub fn read_base(dir: &Path, name: &str) -> Result<PropMap> {
    read_map(&paths::prop_base_dir(dir).join(format!("{name}.json")))
}

pub fn write_base(dir: &Path, name: &str, map: &PropMap) -> Result<()> {
    write_map(&paths::prop_base_dir(dir).join(format!("{name}.json")), map)
}

/// A single property's resolved change: `None` in `value` means the
/// property was deleted.
pub struct PropDelta {
    pub name: String,
    pub value: Option<String>,
}

/// Diffs a full incoming proplist against the current pristine
/// proplist, yielding only the properties that actually changed.
pub fn diff_full_list(incoming: &PropMap, base: &PropMap) -> Vec<PropDelta> {
    let mut out = Vec::new();
    for (name, value) in incoming {
        if base.get(name) != Some(value) {
            out.push(PropDelta {
                name: name.clone(),
                value: Some(value.clone()),
            });
        }
    }
    for name in base.keys() {
        if !incoming.contains_key(name) {
            out.push(PropDelta {
                name: name.clone(),
                value: None,
            });
        }
    }
    out
}

pub fn apply_delta(map: &mut PropMap, delta: &PropDelta) {
    match &delta.value {
        Some(v) => {
            map.insert(delta.name.clone(), v.clone());
        }
        None => {
            map.remove(&delta.name);
        }
    }
}
