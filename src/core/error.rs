use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("UInt29 out of range: {0:#x} (must be below 0x40000000)")]
    UInt29OutOfRange(u32),

    #[error("Length does not fit a UInt29 field: {0}")]
    LengthOverflow(usize),

    #[error("No block in progress")]
    NoBlockInProgress,

    #[error("Block already in progress (started at offset {0})")]
    BlockInProgress(usize),

    #[error("Block payload too large: {0} bytes")]
    BlockTooLarge(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;
