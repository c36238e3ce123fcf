use serde::{Deserialize, Serialize};

/// What a sampling loop does when a burst read fails, and whether a failed
/// configuration step aborts start-up.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorPolicy {
    /// Log and emit a reading decoded from whatever the buffer holds: the
    /// previous cycle's bytes, or zeros before the first successful read.
    #[default]
    Continue,
    /// Log and stop the failing loop. A configuration failure aborts start-up.
    FailFast,
    /// Retry the burst up to `attempts` more times, then emit the reading
    /// marked invalid.
    RetryThenMarkInvalid { attempts: u8 },
}

impl ErrorPolicy {
    /// Extra burst attempts after a failed read.
    pub const fn retries(self) -> u8 {
        match self {
            Self::RetryThenMarkInvalid { attempts } => attempts,
            Self::Continue | Self::FailFast => 0,
        }
    }

    pub const fn aborts_on_config_failure(self) -> bool {
        matches!(self, Self::FailFast)
    }
}
