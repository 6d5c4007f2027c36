//! Storage device identity for path pairs
//!
//! Pairs whose source and destination live on the same pair of devices
//! contend for the same disks, so the scheduler runs them one after another.

use crate::types::{MirrorError, PathPair};
use std::fs;
use std::path::Path;

/// Identity of one filesystem/volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u64);

/// Identity of the (source device, destination device) pair behind a `PathPair`.
///
/// Equality is structural over the two device ids; the literal paths play no part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey {
    pub source: DeviceId,
    pub destination: DeviceId,
}

impl DeviceKey {
    /// Resolve both sides of a pair
    pub fn resolve(resolver: &dyn DeviceResolver, pair: &PathPair) -> Result<Self, MirrorError> {
        Ok(Self {
            source: resolver.device_of(pair.source())?,
            destination: resolver.device_of(pair.destination())?,
        })
    }
}

/// Maps a path to the device it is stored on
pub trait DeviceResolver: Send + Sync {
    fn device_of(&self, path: &Path) -> Result<DeviceId, MirrorError>;
}

/// Resolver backed by filesystem metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDeviceResolver;

impl DeviceResolver for FsDeviceResolver {
    fn device_of(&self, path: &Path) -> Result<DeviceId, MirrorError> {
        let metadata = fs::metadata(path).map_err(|source| MirrorError::UnresolvableDevice {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(device_id(path, &metadata))
    }
}

#[cfg(unix)]
fn device_id(_path: &Path, metadata: &fs::Metadata) -> DeviceId {
    use std::os::unix::fs::MetadataExt;
    DeviceId(metadata.dev())
}

// Without st_dev, the volume prefix ("C:\", "\\server\share") stands in for the device.
#[cfg(not(unix))]
fn device_id(path: &Path, _metadata: &fs::Metadata) -> DeviceId {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::path::Component;

    let mut hasher = DefaultHasher::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => prefix.as_os_str().hash(&mut hasher),
            Component::RootDir => {
                component.as_os_str().hash(&mut hasher);
                break;
            }
            _ => break,
        }
    }
    DeviceId(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_same_filesystem_gives_equal_keys() {
        let root = TempDir::new().expect("create tempdir");
        for name in ["a", "b", "c", "d"] {
            fs::create_dir(root.path().join(name)).expect("create dir");
        }

        let first = PathPair::new(root.path().join("a"), root.path().join("b")).expect("pair");
        let second = PathPair::new(root.path().join("c"), root.path().join("d")).expect("pair");

        let key1 = DeviceKey::resolve(&FsDeviceResolver, &first).expect("resolve");
        let key2 = DeviceKey::resolve(&FsDeviceResolver, &second).expect("resolve");
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_missing_path_is_unresolvable() {
        let root = TempDir::new().expect("create tempdir");
        let err = FsDeviceResolver
            .device_of(&root.path().join("vanished"))
            .expect_err("missing path");
        assert!(err.is_device_error());
    }

    #[test]
    fn test_key_equality_ignores_paths() {
        let a = DeviceKey {
            source: DeviceId(1),
            destination: DeviceId(2),
        };
        let b = DeviceKey {
            source: DeviceId(1),
            destination: DeviceId(2),
        };
        let swapped = DeviceKey {
            source: DeviceId(2),
            destination: DeviceId(1),
        };
        assert_eq!(a, b);
        assert_ne!(a, swapped);
    }
}
