//! Scenarios for the marker engine.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Stable traffic on a four-lane road, several hypotheses per object
    Highway,

    /// Objects appear and vanish every few frames
    Churn,
}

impl ScenarioId {
    /// Returns all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![ScenarioId::Highway, ScenarioId::Churn]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Highway => "highway",
            ScenarioId::Churn => "churn",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Highway => "Vehicles and pedestrians tracked for the whole run, ids must never change",
            ScenarioId::Churn => "10% of objects vanish per frame and are replaced, handles get recycled",
        }
    }

    /// Per-frame probability that an object leaves the scene.
    pub fn despawn_rate(&self) -> f64 {
        match self {
            ScenarioId::Highway => 0.0,
            ScenarioId::Churn => 0.1,
        }
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
            "highway" => Ok(ScenarioId::Highway),
            "churn" => Ok(ScenarioId::Churn),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("CHURN".parse::<ScenarioId>(), Ok(ScenarioId::Churn));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
