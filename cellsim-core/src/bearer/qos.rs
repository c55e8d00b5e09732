use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

/// The nine standardized QoS class identifiers (QCI).
///
/// Parsed either from the snake case name or from the numeric QCI:
///
/// ```
/// # use cellsim_core::bearer::QosClass;
/// let qos: QosClass = "ngbr_video_tcp_default".parse().unwrap();
/// assert_eq!(qos, QosClass::NgbrVideoTcpDefault);
/// assert_eq!(qos, "9".parse().unwrap());
/// assert_eq!(qos.qci(), 9);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum QosClass {
    GbrConvVoice,
    GbrConvVideo,
    GbrGaming,
    GbrNonConvVideo,
    NgbrIms,
    NgbrVideoTcpOperator,
    NgbrVoiceVideoGaming,
    NgbrVideoTcpPremium,
    #[default]
    NgbrVideoTcpDefault,
}

impl QosClass {
    pub const ALL: [Self; 9] = [
        Self::GbrConvVoice,
        Self::GbrConvVideo,
        Self::GbrGaming,
        Self::GbrNonConvVideo,
        Self::NgbrIms,
        Self::NgbrVideoTcpOperator,
        Self::NgbrVoiceVideoGaming,
        Self::NgbrVideoTcpPremium,
        Self::NgbrVideoTcpDefault,
    ];

    pub const fn qci(&self) -> u8 {
        match self {
            Self::GbrConvVoice => 1,
            Self::GbrConvVideo => 2,
            Self::GbrGaming => 3,
            Self::GbrNonConvVideo => 4,
            Self::NgbrIms => 5,
            Self::NgbrVideoTcpOperator => 6,
            Self::NgbrVoiceVideoGaming => 7,
            Self::NgbrVideoTcpPremium => 8,
            Self::NgbrVideoTcpDefault => 9,
        }
    }

    pub const fn from_qci(qci: u8) -> Option<Self> {
        match qci {
            1..=9 => Some(Self::ALL[qci as usize - 1]),
            _ => None,
        }
    }

    /// Guaranteed bit rate class.
    pub const fn is_gbr(&self) -> bool {
        self.qci() <= 4
    }

    /// Scheduling priority, `1` is the highest.
    pub const fn priority(&self) -> u8 {
        match self {
            Self::NgbrIms => 1,
            Self::GbrConvVoice => 2,
            Self::GbrGaming => 3,
            Self::GbrConvVideo => 4,
            Self::GbrNonConvVideo => 5,
            Self::NgbrVideoTcpOperator => 6,
            Self::NgbrVoiceVideoGaming => 7,
            Self::NgbrVideoTcpPremium => 8,
            Self::NgbrVideoTcpDefault => 9,
        }
    }

    pub const fn packet_delay_budget(&self) -> Duration {
        Duration::from_millis(match self {
            Self::GbrGaming => 50,
            Self::GbrConvVoice | Self::NgbrIms | Self::NgbrVoiceVideoGaming => 100,
            Self::GbrConvVideo => 150,
            Self::GbrNonConvVideo
            | Self::NgbrVideoTcpOperator
            | Self::NgbrVideoTcpPremium
            | Self::NgbrVideoTcpDefault => 300,
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::GbrConvVoice => "gbr_conv_voice",
            Self::GbrConvVideo => "gbr_conv_video",
            Self::GbrGaming => "gbr_gaming",
            Self::GbrNonConvVideo => "gbr_non_conv_video",
            Self::NgbrIms => "ngbr_ims",
            Self::NgbrVideoTcpOperator => "ngbr_video_tcp_operator",
            Self::NgbrVoiceVideoGaming => "ngbr_voice_video_gaming",
            Self::NgbrVideoTcpPremium => "ngbr_video_tcp_premium",
            Self::NgbrVideoTcpDefault => "ngbr_video_tcp_default",
        }
    }
}

impl fmt::Display for QosClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QosClass {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(qci) = s.parse::<u8>() {
            return Self::from_qci(qci).ok_or_else(|| anyhow!("QCI {qci} is not in 1..=9"));
        }

        Self::ALL
            .into_iter()
            .find(|qos| qos.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow!("Unknown QoS class `{s}'"))
    }
}
