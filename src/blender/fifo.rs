use super::BlenderError;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::Path;

// Create the named pipe unless something already sits at `path`.
pub fn make_fifo(path: &Path) -> Result<(), BlenderError> {
    match std::fs::metadata(path) {
        Ok(meta) => {
            if !meta.file_type().is_fifo() {
                tracing::warn!(path = %path.display(), "existing path is not a FIFO");
            }
            return Ok(());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => return Err(fifo_error(path, source)),
    }
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| fifo_error(path, std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) };
    if rc != 0 {
        return Err(fifo_error(path, std::io::Error::last_os_error()));
    }
    tracing::info!(path = %path.display(), "created FIFO");
    Ok(())
}

// Open both ends without blocking on the peer. The read end is opened
// non-blocking first, which lets the write end open at once; the read end
// is then switched back to blocking for the child that inherits it.
pub fn open_pair(path: &Path) -> Result<(File, File), BlenderError> {
    let reader = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .map_err(|e| fifo_error(path, e))?;
    let writer = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| fifo_error(path, e))?;
    let fd = reader.as_raw_fd();
    let rc = unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            flags
        } else {
            libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK)
        }
    };
    if rc < 0 {
        return Err(fifo_error(path, std::io::Error::last_os_error()));
    }
    Ok((reader, writer))
}

fn fifo_error(path: &Path, source: std::io::Error) -> BlenderError {
    BlenderError::Fifo {
        path: path.to_path_buf(),
        source,
    }
}
