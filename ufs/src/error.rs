use thiserror::Error;

#[derive(Error, Debug)]
pub enum UfsError {
    #[error("not an ufs filesystem")]
    BadFilesystem,
    #[error("disk read failed")]
    Io(#[from] std::io::Error),
    #[error("ufs does not support triple indirect blocks")]
    NotImplemented,
    #[error("bad filename: {0}")]
    BadFilename(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("not a directory: {0}")]
    BadFileType(String),
    #[error("too deep nesting of symlinks")]
    SymlinkLoop,
    /// On-disk data that the driver can positively identify as broken, such
    /// as a directory entry that does not advance or runs past its directory.
    #[error("corrupt metadata in inode {ino}: {detail}")]
    Corrupt { ino: u32, detail: String },
}

pub type Result<T> = std::result::Result<T, UfsError>;
