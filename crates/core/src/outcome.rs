//! Consume outcomes as reported to clients.

use serde::{Deserialize, Serialize};

use crate::entitlement::Decision;

/// Why a consume call did not grant access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NotAuthenticated,
    NoPass,
    PassExpired,
    PassExhausted,
    /// Transient store failure; the whole call is safe to retry.
    StoreUnavailable,
    /// The unlock is durable but the credit was not deducted. Not an access
    /// failure: the listing is viewable and a retry resolves to already-viewed.
    ChargeLostAfterUnlock,
}

impl FailureReason {
    /// The failure matching a blocking entitlement decision.
    ///
    /// Returns `None` for decisions that allow viewing.
    #[must_use]
    pub const fn from_decision(decision: Decision) -> Option<Self> {
        match decision {
            Decision::NoPass => Some(Self::NoPass),
            Decision::Expired => Some(Self::PassExpired),
            Decision::Exhausted => Some(Self::PassExhausted),
            Decision::AlreadyViewed | Decision::Grant => None,
        }
    }

    /// Whether the user should be sent to the purchase flow.
    #[must_use]
    pub const fn needs_purchase(self) -> bool {
        matches!(self, Self::NoPass | Self::PassExpired | Self::PassExhausted)
    }

    /// User-facing message.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotAuthenticated => "로그인이 필요합니다.",
            Self::NoPass => "열람권이 없습니다.",
            Self::PassExpired => "열람권이 만료되었습니다.",
            Self::PassExhausted => "열람권이 모두 소진되었습니다.",
            Self::StoreUnavailable => "열람 기록 저장 중 오류가 발생했습니다.",
            Self::ChargeLostAfterUnlock => {
                "열람권 차감 중 오류가 발생했습니다. 열람 기록은 저장되었습니다."
            }
        }
    }
}

/// Wire shape of a consume result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeReport {
    /// Whether the listing may now be viewed.
    pub success: bool,
    /// The listing had already been unlocked; nothing was charged.
    pub already_viewed: bool,
    /// Balance after a charge, when this call charged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConsumeReport {
    /// A credit was spent on this call.
    #[must_use]
    pub const fn charged(remaining_count: i32) -> Self {
        Self {
            success: true,
            already_viewed: false,
            remaining_count: Some(remaining_count),
            failure_reason: None,
            message: None,
        }
    }

    /// The listing was already unlocked.
    #[must_use]
    pub const fn already_viewed() -> Self {
        Self {
            success: true,
            already_viewed: true,
            remaining_count: None,
            failure_reason: None,
            message: None,
        }
    }

    /// The call failed for `reason`.
    ///
    /// [`FailureReason::ChargeLostAfterUnlock`] still reports `success`
    /// because the unlock is durable.
    #[must_use]
    pub fn failed(reason: FailureReason) -> Self {
        Self {
            success: matches!(reason, FailureReason::ChargeLostAfterUnlock),
            already_viewed: false,
            remaining_count: None,
            failure_reason: Some(reason),
            message: Some(reason.message().to_owned()),
        }
    }
}
