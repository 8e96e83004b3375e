//! Environment cost model: base route costs from flow rates and conditions.
//!
//! Each route contributes a term
//! `rain + month + weekday + event + FLOW_WEIGHT * flow_rate`. Sending traffic
//! down route r leaves the other two corridors to absorb the remaining demand,
//! so its base cost is the sum of the other two terms plus [`FIXED_OVERHEAD`].
//!
//! In [`CostMode::General`] every condition modifier is zero and only flow rates
//! contribute.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::calibration::RouteCosts;
use crate::constants::NUM_ROUTES;
use crate::types::Route;

/// Weight of a route's flow rate in its term.
pub const FLOW_WEIGHT: f64 = 20.0;

/// Constant cost added to every route choice.
pub const FIXED_OVERHEAD: f64 = 3.0;

/// Rain modifier per route (North, East, West).
const RAIN: [f64; NUM_ROUTES] = [0.5, 2.0, 0.7];

/// Event modifier per route: (event active, no event).
const EVENT: [(f64, f64); NUM_ROUTES] = [(0.2, 15.0), (0.5, 0.7), (0.3, 0.26)];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CostMode {
    /// Flow rates only.
    #[default]
    General,
    /// Flow rates plus weather, event, weekday and month modifiers.
    Specific,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    #[default]
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    /// Weekday modifier per route (North, East, West).
    fn modifiers(self) -> [f64; NUM_ROUTES] {
        match self {
            Weekday::Monday => [0.1, 0.4, 0.12],
            Weekday::Tuesday => [0.3, 0.5, 0.9],
            Weekday::Wednesday => [0.4, 0.1, 0.5],
            Weekday::Thursday => [0.4, 0.6, 0.3],
            Weekday::Friday => [0.9, 0.9, 0.6],
            Weekday::Saturday => [0.04, 0.3, 0.03],
            Weekday::Sunday => [0.4, 0.1, 0.2],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Month {
    January,
    February,
    March,
    April,
    #[default]
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    /// Seasonal modifier, identical for every route.
    fn modifier(self) -> f64 {
        match self {
            Month::January => 0.3,
            Month::February => 0.5,
            Month::March => 0.8,
            Month::April => 0.7,
            Month::May => 1.4,
            Month::June => 0.9,
            Month::July => 0.6,
            Month::August => 0.4,
            Month::September => 1.0,
            Month::October => 1.3,
            Month::November => 1.2,
            Month::December => 1.1,
        }
    }
}

/// Conditions under which route costs are derived.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub mode: CostMode,
    pub rain: bool,
    /// Whether an event is active on each route (North, East, West).
    pub events: [bool; NUM_ROUTES],
    pub weekday: Weekday,
    pub month: Month,
    /// Observed flow rate per route (North, East, West).
    pub flow_rates: [f64; NUM_ROUTES],
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            mode: CostMode::General,
            rain: true,
            events: [true; NUM_ROUTES],
            weekday: Weekday::Friday,
            month: Month::May,
            flow_rates: [3.0, 1.27, 1.04],
        }
    }
}

impl EnvConfig {
    /// Contribution of `route` to the cost of choosing any other route.
    pub fn route_term(&self, route: Route) -> f64 {
        let r = route.index();
        let flow = FLOW_WEIGHT * self.flow_rates[r];
        if self.mode == CostMode::General {
            return flow;
        }
        let rain = if self.rain { RAIN[r] } else { 0.0 };
        let (active, idle) = EVENT[r];
        let event = if self.events[r] { active } else { idle };
        rain + self.month.modifier() + self.weekday.modifiers()[r] + event + flow
    }

    /// Base cost of choosing each route.
    pub fn route_costs(&self) -> RouteCosts {
        RouteCosts(Route::ALL.map(|r| {
            Route::ALL
                .into_iter()
                .filter(|&other| other != r)
                .map(|other| self.route_term(other))
                .sum::<f64>()
                + FIXED_OVERHEAD
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_mode_uses_flow_rates_only() {
        let cfg = EnvConfig::default();
        let costs = cfg.route_costs();
        // North: 20 * (1.27 + 1.04) + 3
        assert!((costs.get(Route::North) - 49.2).abs() < 1e-9);
        // East: 20 * (3.0 + 1.04) + 3
        assert!((costs.get(Route::East) - 83.8).abs() < 1e-9);
        // West: 20 * (3.0 + 1.27) + 3
        assert!((costs.get(Route::West) - 88.4).abs() < 1e-9);
    }

    #[test]
    fn test_specific_mode_adds_modifiers() {
        let general = EnvConfig::default();
        let specific = EnvConfig {
            mode: CostMode::Specific,
            ..EnvConfig::default()
        };
        for r in Route::ALL {
            assert!(specific.route_term(r) > general.route_term(r), "{r}");
        }
        // North term on a rainy Friday in May with an event:
        // 0.5 + 1.4 + 0.9 + 0.2 + 60
        assert!((specific.route_term(Route::North) - 63.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_event_on_north_is_expensive() {
        let with_event = EnvConfig {
            mode: CostMode::Specific,
            ..EnvConfig::default()
        };
        let without = EnvConfig {
            events: [false, true, true],
            ..with_event.clone()
        };
        let delta = without.route_term(Route::North) - with_event.route_term(Route::North);
        assert!((delta - 14.8).abs() < 1e-9);
        // Choosing North does not pay its own term.
        assert_eq!(
            without.route_costs().get(Route::North),
            with_event.route_costs().get(Route::North)
        );
    }

    #[test]
    fn test_costs_non_negative_across_calendar() {
        for weekday in Weekday::ALL {
            for month in Month::ALL {
                let cfg = EnvConfig {
                    mode: CostMode::Specific,
                    weekday,
                    month,
                    ..EnvConfig::default()
                };
                assert!(cfg.route_costs().0.iter().all(|&c| c >= 0.0));
            }
        }
    }
}
