use std::fmt;
use std::str::FromStr;

/// What a decoder does with a frame whose checksum does not match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChecksumPolicy {
    /// Drop the frame with `DecodeError::ChecksumMismatch`.
    #[default]
    Reject,
    /// Decode anyway, log a warning and flag the record.
    Warn,
}

/// Controls decoder behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderConfig {
    pub checksum_policy: ChecksumPolicy,
}

impl FromStr for ChecksumPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "warn" => Ok(Self::Warn),
            other => Err(format!("unknown checksum policy '{other}' (expected reject|warn)")),
        }
    }
}

impl fmt::Display for ChecksumPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => f.write_str("reject"),
            Self::Warn => f.write_str("warn"),
        }
    }
}
