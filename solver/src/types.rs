//! State-action model: routes, congestion symbols, states and actions.
//!
//! The state space is closed and fixed at compile time. [`State`] wraps the
//! 3-bit index described in [`crate::constants`]; iteration over
//! [`State::ALL`] is always in index order, which keeps sweeps and exported
//! maps deterministic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::SymbolError;

/// One of the three candidate corridors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Route {
    North,
    East,
    West,
}

impl Route {
    /// All routes in tie-break priority order.
    pub const ALL: [Route; NUM_ROUTES] = [Route::North, Route::East, Route::West];

    #[inline(always)]
    pub fn index(self) -> usize {
        match self {
            Route::North => ROUTE_NORTH,
            Route::East => ROUTE_EAST,
            Route::West => ROUTE_WEST,
        }
    }

    pub fn from_index(index: usize) -> Option<Route> {
        Route::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        ROUTE_NAMES[self.index()]
    }

    pub fn symbol(self) -> &'static str {
        ROUTE_SYMBOLS[self.index()]
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Route {
    type Err = SymbolError;

    /// Accepts `N`/`E`/`W` or the full route name, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "n" | "north" => Ok(Route::North),
            "e" | "east" => Ok(Route::East),
            "w" | "west" => Ok(Route::West),
            _ => Err(SymbolError::new("route", s)),
        }
    }
}

/// Congestion level of a single route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Congestion {
    Low,
    High,
}

impl Congestion {
    pub fn is_high(self) -> bool {
        self == Congestion::High
    }

    pub fn letter(self) -> char {
        match self {
            Congestion::Low => 'L',
            Congestion::High => 'H',
        }
    }
}

impl FromStr for Congestion {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "h" => Ok(Congestion::High),
            "low" | "l" => Ok(Congestion::Low),
            _ => Err(SymbolError::new("congestion", s)),
        }
    }
}

/// Congestion snapshot across North, East and West.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct State(u8);

impl State {
    /// The absorbing all-Low state.
    pub const GOAL: State = State(GOAL_INDEX as u8);

    /// Every state in enumeration order.
    pub const ALL: [State; NUM_STATES] = [
        State(0),
        State(1),
        State(2),
        State(3),
        State(4),
        State(5),
        State(6),
        State(7),
    ];

    pub fn from_index(index: usize) -> Option<State> {
        State::ALL.get(index).copied()
    }

    /// Build a state from per-route congestion in North, East, West order.
    pub fn from_congestion(levels: [Congestion; NUM_ROUTES]) -> State {
        let mut index = 0usize;
        for (route, level) in levels.iter().enumerate() {
            if level.is_high() {
                index |= 1 << route_bit(route);
            }
        }
        State(index as u8)
    }

    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    pub fn is_goal(self) -> bool {
        self.index() == GOAL_INDEX
    }

    pub fn congestion(self, route: Route) -> Congestion {
        if is_route_congested(self.index(), route.index()) {
            Congestion::High
        } else {
            Congestion::Low
        }
    }

    /// Number of congested routes.
    pub fn high_count(self) -> u32 {
        congested_count(self.index())
    }

    /// Actions available in this state: the terminal marker for the goal,
    /// all three routes otherwise.
    pub fn actions(self) -> &'static [Action] {
        const ROUTE_ACTIONS: [Action; NUM_ROUTES] = [
            Action::Route(Route::North),
            Action::Route(Route::East),
            Action::Route(Route::West),
        ];
        const GOAL_ACTIONS: [Action; 1] = [Action::Goal];
        if self.is_goal() {
            &GOAL_ACTIONS
        } else {
            &ROUTE_ACTIONS
        }
    }

    /// Three-letter code, e.g. `HHL`.
    pub fn code(self) -> String {
        Route::ALL
            .iter()
            .map(|&r| self.congestion(r).letter())
            .collect()
    }

    pub fn meaning(self) -> &'static str {
        STATE_MEANINGS[self.index()]
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl FromStr for State {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let letters: Vec<char> = s.trim().chars().collect();
        if letters.len() != NUM_ROUTES {
            return Err(SymbolError::new("state", s));
        }
        let mut levels = [Congestion::Low; NUM_ROUTES];
        for (level, letter) in levels.iter_mut().zip(letters) {
            *level = letter.to_string().parse().map_err(|_| SymbolError::new("state", s))?;
        }
        Ok(State::from_congestion(levels))
    }
}

impl From<State> for String {
    fn from(state: State) -> String {
        state.code()
    }
}

impl TryFrom<String> for State {
    type Error = SymbolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A routing decision, or the terminal marker assigned to the goal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Action {
    Route(Route),
    Goal,
}

impl Action {
    pub fn route(self) -> Option<Route> {
        match self {
            Action::Route(r) => Some(r),
            Action::Goal => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Action::Route(r) => r.symbol(),
            Action::Goal => GOAL_SYMBOL,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Action {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == GOAL_SYMBOL {
            return Ok(Action::Goal);
        }
        s.parse().map(Action::Route).map_err(|_| SymbolError::new("action", s))
    }
}

impl From<Action> for String {
    fn from(action: Action) -> String {
        action.symbol().to_string()
    }
}

impl TryFrom<String> for Action {
    type Error = SymbolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_codes_round_trip() {
        for s in State::ALL {
            let parsed: State = s.code().parse().unwrap();
            assert_eq!(parsed, s);
        }
        assert_eq!(State::GOAL.code(), "LLL");
        assert_eq!(State::from_index(7).unwrap().code(), "HHH");
        assert_eq!(State::from_index(6).unwrap().code(), "HHL");
        assert_eq!(State::from_index(1).unwrap().code(), "LLH");
    }

    #[test]
    fn test_only_goal_is_goal() {
        let goals: Vec<State> = State::ALL.into_iter().filter(|s| s.is_goal()).collect();
        assert_eq!(goals, vec![State::GOAL]);
        assert_eq!(State::GOAL.high_count(), 0);
    }

    #[test]
    fn test_action_sets() {
        assert_eq!(State::GOAL.actions(), &[Action::Goal]);
        for s in State::ALL.into_iter().filter(|s| !s.is_goal()) {
            let routes: Vec<Route> = s.actions().iter().filter_map(|a| a.route()).collect();
            assert_eq!(routes, Route::ALL.to_vec(), "state {s}");
        }
    }

    #[test]
    fn test_congestion_lookup() {
        let s: State = "HLH".parse().unwrap();
        assert_eq!(s.congestion(Route::North), Congestion::High);
        assert_eq!(s.congestion(Route::East), Congestion::Low);
        assert_eq!(s.congestion(Route::West), Congestion::High);
        assert_eq!(s.high_count(), 2);
        assert_eq!(s.meaning(), "East Clear, North & West Congested");
    }

    #[test]
    fn test_symbol_parsing() {
        assert_eq!("high".parse::<Congestion>().unwrap(), Congestion::High);
        assert_eq!(" L ".parse::<Congestion>().unwrap(), Congestion::Low);
        assert!("medium".parse::<Congestion>().is_err());
        assert_eq!("west".parse::<Route>().unwrap(), Route::West);
        assert_eq!("N".parse::<Action>().unwrap(), Action::Route(Route::North));
        assert_eq!("Goal".parse::<Action>().unwrap(), Action::Goal);
        assert!("HX".parse::<State>().is_err());
    }

    #[test]
    fn test_serde_uses_codes() {
        let json = serde_json::to_string(&(State::GOAL, Action::Route(Route::East))).unwrap();
        assert_eq!(json, r#"["LLL","E"]"#);
        let back: (State, Action) = serde_json::from_str(r#"["HHH","Goal"]"#).unwrap();
        assert_eq!(back, (State::ALL[7], Action::Goal));
    }
}
