use crate::error::WagerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    Rock,
    Paper,
    Scissors,
}

impl Choice {
    pub const ALL: [Choice; 3] = [Choice::Rock, Choice::Paper, Choice::Scissors];

    /// Rock beats scissors, scissors beats paper, paper beats rock.
    pub fn beats(self, other: Choice) -> bool {
        matches!(
            (self, other),
            (Choice::Rock, Choice::Scissors)
                | (Choice::Scissors, Choice::Paper)
                | (Choice::Paper, Choice::Rock)
        )
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::Rock => write!(f, "rock"),
            Choice::Paper => write!(f, "paper"),
            Choice::Scissors => write!(f, "scissors"),
        }
    }
}

impl FromStr for Choice {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rock" | "r" => Ok(Choice::Rock),
            "paper" | "p" => Ok(Choice::Paper),
            "scissors" | "s" => Ok(Choice::Scissors),
            other => Err(WagerError::invalid_input(format!(
                "Unknown choice '{}', expected rock, paper or scissors",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Tie,
    FirstWins,
    SecondWins,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Tie => write!(f, "tie"),
            Outcome::FirstWins => write!(f, "first-wins"),
            Outcome::SecondWins => write!(f, "second-wins"),
        }
    }
}

pub fn resolve(first: Choice, second: Choice) -> Outcome {
    if first == second {
        Outcome::Tie
    } else if first.beats(second) {
        Outcome::FirstWins
    } else {
        Outcome::SecondWins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Choice::*;

    #[test]
    fn test_all_combinations_match_beats_table() {
        let table = [
            (Rock, Rock, Outcome::Tie),
            (Rock, Paper, Outcome::SecondWins),
            (Rock, Scissors, Outcome::FirstWins),
            (Paper, Rock, Outcome::FirstWins),
            (Paper, Paper, Outcome::Tie),
            (Paper, Scissors, Outcome::SecondWins),
            (Scissors, Rock, Outcome::SecondWins),
            (Scissors, Paper, Outcome::FirstWins),
            (Scissors, Scissors, Outcome::Tie),
        ];

        for (first, second, expected) in table {
            assert_eq!(resolve(first, second), expected, "{} vs {}", first, second);
        }
    }

    #[test]
    fn test_tie_iff_equal() {
        for first in Choice::ALL {
            for second in Choice::ALL {
                assert_eq!(resolve(first, second) == Outcome::Tie, first == second);
            }
        }
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!("Rock".parse::<Choice>().unwrap(), Rock);
        assert_eq!(" s ".parse::<Choice>().unwrap(), Scissors);
        assert!("lizard".parse::<Choice>().is_err());
    }
}
