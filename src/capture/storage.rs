//! Free-space probe for the recording directory

use super::traits::StorageProbe;
use std::path::Path;

/// Reads free space from the filesystem holding the directory
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStorageProbe;

impl FsStorageProbe {
    pub fn new() -> Self {
        Self
    }
}

impl StorageProbe for FsStorageProbe {
    #[cfg(unix)]
    fn available_bytes(&self, dir: &Path) -> std::io::Result<Option<u64>> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(dir.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        // SAFETY: c_path is NUL-terminated and stat is a valid out-pointer
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }

        #[allow(clippy::unnecessary_cast)]
        let available = stat.f_bavail as u64 * stat.f_frsize as u64;
        Ok(Some(available))
    }

    #[cfg(not(unix))]
    fn available_bytes(&self, _dir: &Path) -> std::io::Result<Option<u64>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_temp_dir_reports_free_space() {
        let dir = tempfile::TempDir::new().unwrap();
        let available = FsStorageProbe::new().available_bytes(dir.path()).unwrap();
        assert!(available.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_dir_is_error() {
        let probe = FsStorageProbe::new();
        assert!(probe
            .available_bytes(Path::new("/definitely/not/a/real/dir"))
            .is_err());
    }
}
