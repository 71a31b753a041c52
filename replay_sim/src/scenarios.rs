//! Playback verification scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// PB-001: Start and let the whole script play out
    Playthrough,

    /// PB-002: Pause mid-wait, idle, resume
    PauseResume,

    /// PB-003: Change speed in the middle of every wait
    SpeedShift,

    /// PB-004: Walk the script with step_forward only
    StepThrough,

    /// PB-005: Reset while a timer is pending, then force the stale timer
    ResetMidflight,

    /// PB-006: Seeded random command sequences
    CommandStorm,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Playthrough,
            ScenarioId::PauseResume,
            ScenarioId::SpeedShift,
            ScenarioId::StepThrough,
            ScenarioId::ResetMidflight,
            ScenarioId::CommandStorm,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Playthrough => "playthrough",
            ScenarioId::PauseResume => "pause_resume",
            ScenarioId::SpeedShift => "speed_shift",
            ScenarioId::StepThrough => "step_through",
            ScenarioId::ResetMidflight => "reset_midflight",
            ScenarioId::CommandStorm => "command_storm",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Playthrough => "Every event fires once, in order, at its offset",
            ScenarioId::PauseResume => "Pausing keeps the unelapsed wait; idle time is not counted",
            ScenarioId::SpeedShift => "Speed changes rescale the remaining wait, never restart it",
            ScenarioId::StepThrough => "Stepping advances by one, arms no timer, stays paused",
            ScenarioId::ResetMidflight => "Reset cancels the timer; a forced stale expiry is silent",
            ScenarioId::CommandStorm => "Random commands never break ordering or the one-timer rule",
        }
    }

    /// Returns true if the scenario depends on the seed.
    pub fn is_seeded(&self) -> bool {
        matches!(self, ScenarioId::CommandStorm)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "playthrough" | "pb-001" => Ok(ScenarioId::Playthrough),
            "pause_resume" | "pauseresume" | "pb-002" => Ok(ScenarioId::PauseResume),
            "speed_shift" | "speedshift" | "pb-003" => Ok(ScenarioId::SpeedShift),
            "step_through" | "stepthrough" | "pb-004" => Ok(ScenarioId::StepThrough),
            "reset_midflight" | "resetmidflight" | "pb-005" => Ok(ScenarioId::ResetMidflight),
            "command_storm" | "commandstorm" | "pb-006" => Ok(ScenarioId::CommandStorm),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("PB-003".parse::<ScenarioId>(), Ok(ScenarioId::SpeedShift));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
