//! Disk space detection module
//!
//! Reports free space on the filesystem holding the current working
//! directory, since that is where model weights would be downloaded.

use std::env;
use std::path::{Path, PathBuf};
use sysinfo::Disks;
use tracing::debug;

use super::ram::bytes_to_gb;

/// Detect available disk space in GB on the current working directory's
/// filesystem. Returns `None` when no disk can be matched; callers
/// default to 0 rather than failing the snapshot.
pub fn detect_available_space_gb() -> Option<f64> {
    let cwd = env::current_dir().ok()?;
    let disks = Disks::new_with_refreshed_list();
    let mounts = disks
        .list()
        .iter()
        .map(|d| (d.mount_point().to_path_buf(), d.available_space()));

    match pick_mount_available(&cwd, mounts) {
        Some(bytes) => Some(bytes_to_gb(bytes)),
        None => {
            debug!(cwd = %cwd.display(), "no disk matched the working directory");
            None
        }
    }
}

/// Pick the free-space figure of the mount whose mount point is the
/// longest prefix of `path`, so /home wins over / when both are
/// mounted.
fn pick_mount_available(
    path: &Path,
    mounts: impl IntoIterator<Item = (PathBuf, u64)>,
) -> Option<u64> {
    let mut best: Option<(usize, u64)> = None;
    for (mount, available) in mounts {
        if path.starts_with(&mount) {
            let depth = mount.components().count();
            if best.map_or(true, |(d, _)| depth > d) {
                best = Some((depth, available));
            }
        }
    }
    best.map(|(_, available)| available)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deepest_matching_mount_wins() {
        let mounts = vec![
            (PathBuf::from("/"), 100),
            (PathBuf::from("/home"), 250),
            (PathBuf::from("/var"), 400),
        ];
        let picked = pick_mount_available(Path::new("/home/user/models"), mounts);
        assert_eq!(picked, Some(250));
    }

    #[test]
    fn matching_follows_path_components_not_bytes() {
        // /hom is not a prefix of /home/user in component terms.
        let mounts = vec![(PathBuf::from("/hom"), 999), (PathBuf::from("/"), 100)];
        let picked = pick_mount_available(Path::new("/home/user"), mounts);
        assert_eq!(picked, Some(100));
    }

    #[test]
    fn unrelated_mounts_match_nothing() {
        let mounts = vec![(PathBuf::from("/mnt/data"), 512)];
        assert_eq!(pick_mount_available(Path::new("/home/user"), mounts), None);
    }
}
