//! GTFS coded columns.
//!
//! Feeds frequently leave coded columns blank, so an empty string parses to
//! `None` rather than failing. Codes outside the defined set are malformed.

use crate::error::{FeedError, Result};

/// The set of codes a column accepts, used when validating raw rows.
#[derive(Debug)]
pub struct CodeSet {
    pub name: &'static str,
    pub codes: &'static [&'static str],
}

impl CodeSet {
    /// Empty input is unset; anything else must be one of `codes`.
    pub fn validate<'a>(&self, text: &'a str) -> Result<Option<&'a str>> {
        if text.is_empty() {
            return Ok(None);
        }
        if self.codes.contains(&text) {
            Ok(Some(text))
        } else {
            Err(FeedError::malformed(
                self.name,
                text,
                format!("expected one of {:?}", self.codes),
            ))
        }
    }
}

macro_rules! gtfs_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const CODE_SET: CodeSet = CodeSet {
                name: stringify!($name),
                codes: &[$($code),+],
            };

            pub fn from_code(text: &str) -> Result<Option<Self>> {
                match text {
                    "" => Ok(None),
                    $($code => Ok(Some($name::$variant)),)+
                    other => Err(FeedError::malformed(
                        stringify!($name),
                        other,
                        format!("expected one of {:?}", Self::CODE_SET.codes),
                    )),
                }
            }

            pub fn code(&self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }
        }
    };
}

gtfs_enum!(ServiceDayAvailability {
    NotAvailable = "0",
    Available = "1",
});

gtfs_enum!(ExceptionType {
    Added = "1",
    Removed = "2",
});

gtfs_enum!(ServiceScheduleTypicality {
    NotDefined = "0",
    MinorModifications = "1",
    ExtraService = "2",
    ReducedToWeekendService = "3",
    MajorPlannedDisruption = "4",
    MajorAtypicalReductions = "5",
});

gtfs_enum!(
    /// Shared by `routes.route_type`, `trips.trip_route_type` and `stops.vehicle_type`.
    RouteType {
        Tram = "0",
        Metro = "1",
        Rail = "2",
        Bus = "3",
        Ferry = "4",
        CableTram = "5",
        AerialLift = "6",
        Funicular = "7",
        Trolleybus = "11",
        Monorail = "12",
    }
);

gtfs_enum!(RoutePatternTypicality {
    NotDefined = "0",
    Typical = "1",
    Deviation = "2",
    HighlyAtypical = "3",
    Diversion = "4",
});

gtfs_enum!(LocationType {
    Stop = "0",
    Station = "1",
    EntranceExit = "2",
    GenericNode = "3",
    BoardingArea = "4",
});

gtfs_enum!(WheelchairBoarding {
    NoInformation = "0",
    Accessible = "1",
    NotAccessible = "2",
});

gtfs_enum!(TransferType {
    Recommended = "0",
    Timed = "1",
    RequiresMinimumTime = "2",
    NotPossible = "3",
    InSeat = "4",
    MustReboard = "5",
});

gtfs_enum!(WheelchairAccessibility {
    NoInformation = "0",
    Accessible = "1",
    NotAccessible = "2",
});

gtfs_enum!(BikesAllowed {
    NoInformation = "0",
    Allowed = "1",
    NotAllowed = "2",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_code_is_unset() {
        assert_eq!(RouteType::from_code("").unwrap(), None);
        assert_eq!(RouteType::CODE_SET.validate("").unwrap(), None);
    }

    #[test]
    fn test_codes_round_trip() {
        assert_eq!(RouteType::from_code("11").unwrap(), Some(RouteType::Trolleybus));
        assert_eq!(RouteType::Trolleybus.code(), "11");
        assert_eq!(
            RoutePatternTypicality::from_code("1").unwrap(),
            Some(RoutePatternTypicality::Typical)
        );
        assert_eq!(ExceptionType::Removed.code(), "2");
    }

    #[test]
    fn test_unknown_code_is_malformed() {
        assert!(matches!(RouteType::from_code("8"), Err(FeedError::MalformedValue { .. })));
        assert!(ExceptionType::CODE_SET.validate("0").is_err());
        assert_eq!(ExceptionType::CODE_SET.validate("1").unwrap(), Some("1"));
    }
}
