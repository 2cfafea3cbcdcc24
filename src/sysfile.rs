//! File-system system calls.

use crate::{
    error::Result,
    fs::{InodeRef, Vfs},
    proc::Cred,
};

/// Remove the empty directory named by `path`, relative to `cwd` unless
/// absolute.
pub fn sys_rmdir(vfs: &mut Vfs, cwd: InodeRef, path: &str, cred: &Cred) -> Result<()> {
    let (dir, name) = vfs.dname(path, cwd)?;
    let result = vfs.rmdir(dir, name, cred);
    let put = vfs.iput(dir);
    result.and(put)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::Error,
        fs::minix::tests::{fixture, DEV},
    };

    #[test]
    fn rmdir_by_path() {
        let mut vfs = fixture(32, 128);
        let root = vfs.root().unwrap();
        let a = vfs.mkdir(root, "a", 0o755, &Cred::ROOT).unwrap();
        let b = vfs.mkdir(a, "b", 0o755, &Cred::ROOT).unwrap();
        vfs.iput(b).unwrap();
        vfs.iput(a).unwrap();

        assert_eq!(sys_rmdir(&mut vfs, root, "a", &Cred::ROOT), Err(Error::Busy));
        sys_rmdir(&mut vfs, root, "/a/b/", &Cred::ROOT).unwrap();
        assert_eq!(vfs.namei("/a/b", root), Err(Error::NotFound));
        let a = vfs.namei("a", root).unwrap();
        assert_eq!(vfs.inode(a).nlinks, 2);
        vfs.iput(a).unwrap();
        assert_eq!(vfs.inode(root).nlinks, 3);

        vfs.iput(root).unwrap();
        vfs.unmount(DEV).unwrap();
    }

    #[test]
    fn rmdir_reports_bad_paths() {
        let mut vfs = fixture(32, 128);
        let root = vfs.root().unwrap();
        let user = Cred {
            uid: 7,
            gid: 7,
            euid: 7,
            egid: 7,
        };
        let d = vfs.mkdir(root, "d", 0o755, &Cred::ROOT).unwrap();
        vfs.iput(d).unwrap();

        assert_eq!(sys_rmdir(&mut vfs, root, "/missing/x", &Cred::ROOT), Err(Error::NotFound));
        assert_eq!(sys_rmdir(&mut vfs, root, "/nothing", &Cred::ROOT), Err(Error::NotFound));
        assert_eq!(sys_rmdir(&mut vfs, root, "/", &Cred::ROOT), Err(Error::InvalidArgument));
        assert_eq!(sys_rmdir(&mut vfs, root, "d", &user), Err(Error::PermissionDenied));
        assert_eq!(sys_rmdir(&mut vfs, root, ".", &Cred::ROOT), Err(Error::Busy));

        vfs.iput(root).unwrap();
        vfs.unmount(DEV).unwrap();
    }
}
