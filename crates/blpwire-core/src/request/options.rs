//! Enumerated request options and their wire spellings.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $option:literal {
            $($variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let normalized = value.trim().to_ascii_uppercase();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str() == normalized)
                    .ok_or_else(|| ValidationError::InvalidOption {
                        option: $option,
                        value: value.to_owned(),
                    })
            }
        }
    };
}

wire_enum! {
    /// Sampling frequency of a historical series.
    Periodicity, "periodicity" {
        Daily => "DAILY",
        Weekly => "WEEKLY",
        Monthly => "MONTHLY",
        Quarterly => "QUARTERLY",
        SemiAnnually => "SEMI_ANNUALLY",
        Yearly => "YEARLY",
    }
}

impl Default for Periodicity {
    fn default() -> Self {
        Self::Daily
    }
}

wire_enum! {
    /// Calendar the periodicity is aligned to.
    PeriodicityAdjustment, "periodicity adjustment" {
        Actual => "ACTUAL",
        Calendar => "CALENDAR",
        Fiscal => "FISCAL",
    }
}

wire_enum! {
    OverrideOption, "override option" {
        Close => "OVERRIDE_OPTION_CLOSE",
        Gpa => "OVERRIDE_OPTION_GPA",
    }
}

wire_enum! {
    PricingOption, "pricing option" {
        Price => "PRICING_OPTION_PRICE",
        Yield => "PRICING_OPTION_YIELD",
    }
}

wire_enum! {
    NonTradingDayFillOption, "non-trading day fill option" {
        NonTradingWeekdays => "NON_TRADING_WEEKDAYS",
        AllCalendarDays => "ALL_CALENDAR_DAYS",
        ActiveDaysOnly => "ACTIVE_DAYS_ONLY",
    }
}

wire_enum! {
    NonTradingDayFillMethod, "non-trading day fill method" {
        PreviousValue => "PREVIOUS_VALUE",
        NilValue => "NIL_VALUE",
    }
}

wire_enum! {
    /// Event stream an intraday bar or tick request samples.
    MarketEvent, "event type" {
        Trade => "TRADE",
        Bid => "BID",
        Ask => "ASK",
        BidBest => "BID_BEST",
        AskBest => "ASK_BEST",
        MidPrice => "MID_PRICE",
        AtTrade => "AT_TRADE",
        BestBid => "BEST_BID",
        BestAsk => "BEST_ASK",
    }
}

impl Default for MarketEvent {
    fn default() -> Self {
        Self::Trade
    }
}

wire_enum! {
    ScreenType, "screen type" {
        Global => "GLOBAL",
        Private => "PRIVATE",
    }
}

impl Default for ScreenType {
    fn default() -> Self {
        Self::Global
    }
}
