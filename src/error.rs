//! Kernel error kinds.

use core::fmt;

/// Failure reported by a block device driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceError {
    /// No driver is attached for the device number.
    NoDevice,
    /// Block number past the end of the device.
    OutOfRange,
    /// The hardware rejected the transfer.
    Failed,
}
impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NoDevice => write!(f, "no such device"),
            DeviceError::OutOfRange => write!(f, "block out of range"),
            DeviceError::Failed => write!(f, "transfer failed"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Entry, inode, superblock or process is absent.
    NotFound,
    /// The operation would break a structural invariant.
    Busy,
    /// Ownership or mode check failed.
    PermissionDenied,
    /// No free inode, block, buffer or table slot.
    OutOfSpace,
    /// Malformed request or out-of-range argument.
    InvalidArgument,
    /// Directory entry already present.
    Exists,
    /// On-disk structure does not describe a valid file system.
    Corrupted,
    /// No process matches the given pid.
    NoSuchProcess,
    /// Device collaborator error, passed through verbatim.
    Io(DeviceError),
}
impl Error {
    /// Positive errno value for this error.
    pub const fn errno(self) -> i32 {
        match self {
            Error::PermissionDenied => 1,
            Error::NotFound => 2,
            Error::NoSuchProcess => 3,
            Error::Io(_) | Error::Corrupted => 5,
            Error::Busy => 16,
            Error::Exists => 17,
            Error::InvalidArgument => 22,
            Error::OutOfSpace => 28,
        }
    }
}
impl From<DeviceError> for Error {
    fn from(err: DeviceError) -> Error {
        Error::Io(err)
    }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound => write!(f, "not found"),
            Error::Busy => write!(f, "resource busy"),
            Error::PermissionDenied => write!(f, "permission denied"),
            Error::OutOfSpace => write!(f, "no space left"),
            Error::InvalidArgument => write!(f, "invalid argument"),
            Error::Exists => write!(f, "already exists"),
            Error::Corrupted => write!(f, "corrupted file system"),
            Error::NoSuchProcess => write!(f, "no such process"),
            Error::Io(err) => write!(f, "i/o error: {}", err),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Convert a syscall result into the value handed back to user space:
/// the result itself, or a negated errno.
pub fn syscall_return<T: Into<i64>>(result: Result<T>) -> i64 {
    match result {
        Ok(value) => value.into(),
        Err(err) => -(err.errno() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_values_follow_unix_numbering() {
        assert_eq!(Error::NotFound.errno(), 2);
        assert_eq!(Error::Busy.errno(), 16);
        assert_eq!(Error::Io(DeviceError::Failed).errno(), 5);
        assert_eq!(Error::from(DeviceError::NoDevice), Error::Io(DeviceError::NoDevice));
    }

    #[test]
    fn syscall_return_negates_errors() {
        assert_eq!(syscall_return::<u32>(Ok(7)), 7);
        assert_eq!(syscall_return::<u32>(Err(Error::InvalidArgument)), -22);
    }
}
